//! streamview: a low-latency live stream viewer.
//!
//! The crate pulls a live RTSP stream, re-displays it with minimal
//! end-to-end latency, and recovers from transient network or source
//! failures on its own. Optionally, each frame is passed through an
//! external detection model and confident detections are overlaid.
//!
//! # Architecture
//!
//! Data flows one way through owned frames:
//!
//! ```text
//! source (connector) -> session (acquisition + reconnection) ->
//! annotate (overlay) -> presentation (window / snapshots)
//! ```
//!
//! Design invariants:
//!
//! 1. **Freshest frame wins**: every acquisition iteration flushes stale
//!    transport buffering (up to [`session::FLUSH_READS`] reads) and
//!    surfaces only the last decoded frame.
//! 2. **One connection per session**: the session exclusively owns the live
//!    connection and replaces it only between iterations.
//! 3. **Failure is counted, not fatal**: read failures feed the
//!    [`session::STALL_THRESHOLD`] counter and the reconnection state
//!    machine; nothing in the core terminates the process.
//! 4. **Annotation is an overlay**: with no model loaded the pipeline is an
//!    exact no-op, and a failing model passes frames through untouched.
//! 5. **The probe is independent**: the one-shot connectivity check never
//!    shares state with the live session.
//!
//! # Module structure
//!
//! - `source`: stream identity, connector/connection traits, RTSP and
//!   synthetic backends
//! - `session`: frame acquisition loop, connection state machine, retry
//!   policy
//! - `detect`: detector backend seam and implementations
//! - `annotate`: detection overlay pipeline
//! - `present`: command alphabet and snapshot writing
//! - `probe`: one-shot status query for external collaborators
//! - `config`: layered file/env configuration

pub mod annotate;
pub mod config;
pub mod detect;
pub mod frame;
pub mod present;
pub mod probe;
pub mod session;
pub mod source;

pub use annotate::{Annotator, CONFIDENCE_THRESHOLD};
pub use config::ViewerConfig;
pub use detect::{BoundingBox, Detection, DetectorBackend, StubBackend};
pub use frame::Frame;
pub use present::{Command, SnapshotWriter};
pub use probe::ProbeReport;
pub use session::{
    ConnectionState, RetryPolicy, SessionOptions, StreamSession, FLUSH_READS, IDLE_RETRY_DELAY,
    STALL_THRESHOLD,
};
pub use source::{
    ConnectError, ReadError, RtspConnector, StreamConnection, StreamConnector, StreamSource,
    Transport,
};
