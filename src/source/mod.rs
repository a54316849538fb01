//! Stream sources and the transport connector seam.
//!
//! This module defines the pull interface the acquisition loop drives:
//!
//! - `StreamSource`: immutable identity of a stream (URL, preferred
//!   transport, frame-rate hint), supplied once per connection attempt.
//! - `StreamConnector::open` → `StreamConnection::read_frame`: open a
//!   connection, pull decoded frames from it. Closing is dropping the
//!   connection.
//!
//! The connector layer MUST NOT retry; reconnection belongs to the session
//! state machine. It MUST request the lowest-latency transport variant the
//! source allows (RTSP over TCP when preferred, receive queue depth 1 with
//! drop-oldest semantics). Stale-frame flushing in the acquisition loop,
//! not transport buffering, is the latency-control mechanism.

pub mod rtsp;

use thiserror::Error;

use crate::frame::Frame;

pub use rtsp::RtspConnector;

/// Preferred streaming transport.
///
/// TCP avoids the out-of-order artifacts UDP delivery can produce and is the
/// default; UDP is kept for sources that only speak it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

/// Identity of a stream source. Immutable after construction.
#[derive(Clone, Debug)]
pub struct StreamSource {
    pub url: String,
    pub transport: Transport,
    /// Frames-per-second hint used to derive bounded read timeouts; not a
    /// display throttle.
    pub target_fps: u32,
}

impl StreamSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            transport: Transport::Tcp,
            target_fps: 30,
        }
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_target_fps(mut self, target_fps: u32) -> Self {
        self.target_fps = target_fps;
        self
    }
}

/// Session establishment failed. Retried by the state machine, never fatal
/// by itself.
#[derive(Debug, Error)]
#[error("cannot open stream: {reason}")]
pub struct ConnectError {
    pub reason: String,
}

impl ConnectError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A single read from an open connection failed.
///
/// Every variant is counted by the acquisition loop and feeds the
/// reconnection threshold; none crashes the loop. `EndOfStream` is treated
/// identically to a failure because the source is expected to be perpetual.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no frame arrived within the read timeout")]
    Stalled,
    #[error("source closed the stream")]
    EndOfStream,
}

/// An open transport handle yielding decoded frames.
///
/// Exclusive owner is the acquisition loop; dropping the connection closes
/// it. Implementations must bound `read_frame` (a read timeout, not an
/// indefinite block) so shutdown and reconnection stay responsive.
pub trait StreamConnection {
    fn read_frame(&mut self) -> Result<Frame, ReadError>;
}

/// Opens connections to a `StreamSource`.
///
/// A trait seam so the session and the probe can be driven by scripted
/// connectors in tests.
pub trait StreamConnector {
    fn open(&self, source: &StreamSource) -> Result<Box<dyn StreamConnection>, ConnectError>;
}
