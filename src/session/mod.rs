//! Stream session: frame acquisition loop plus reconnection state machine.
//!
//! A `StreamSession` owns the single live connection for a logical session,
//! the consecutive failure counter, the frame sequence, and the connection
//! state. One call to `poll_frame` is one acquisition iteration:
//!
//! - live states run a flush cycle (up to `flush_reads` reads, surfacing
//!   only the last successfully decoded frame) so perceived latency stays
//!   bounded no matter how far the transport buffered ahead;
//! - `Reconnecting` sleeps the policy backoff and attempts one reopen.
//!
//! The connection handle is only replaced between iterations, never inside
//! one, and state transitions are the single place session side effects
//! (logging) happen.

mod state;
mod retry;

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::frame::Frame;
use crate::source::{ConnectError, StreamConnection, StreamConnector, StreamSource};

pub use retry::{Backoff, RetryPolicy, DEFAULT_RECONNECT_DELAY};
pub use state::ConnectionState;

/// Reads per flush cycle. Staleness is bounded by one cycle.
pub const FLUSH_READS: usize = 3;

/// Consecutive failed reads before the session drops the connection and
/// enters `Reconnecting`.
pub const STALL_THRESHOLD: u32 = 30;

/// Suggested caller-side delay after an iteration that produced no frame,
/// to avoid busy-spinning a dead source.
pub const IDLE_RETRY_DELAY: Duration = Duration::from_millis(33);

/// Tunables for a session. Defaults preserve the behavior of the original
/// viewer.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    pub flush_reads: usize,
    pub stall_threshold: u32,
    pub retry: RetryPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            flush_reads: FLUSH_READS,
            stall_threshold: STALL_THRESHOLD,
            retry: RetryPolicy::default(),
        }
    }
}

/// A live viewing session over one stream source.
pub struct StreamSession<C: StreamConnector> {
    connector: C,
    source: StreamSource,
    options: SessionOptions,
    conn: Option<Box<dyn StreamConnection>>,
    state: ConnectionState,
    consecutive_failures: u32,
    reconnect_attempts: u32,
    frames_delivered: u64,
    reconnects: u64,
}

impl<C: StreamConnector> StreamSession<C> {
    pub fn new(connector: C, source: StreamSource, options: SessionOptions) -> Self {
        Self {
            connector,
            source,
            options,
            conn: None,
            state: ConnectionState::Connecting,
            consecutive_failures: 0,
            reconnect_attempts: 0,
            frames_delivered: 0,
            reconnects: 0,
        }
    }

    /// Open the initial connection.
    ///
    /// Failure here is terminal for the session (`Failed`); the caller
    /// decides whether to build a new session and try again.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        match self.connector.open(&self.source) {
            Ok(conn) => {
                self.conn = Some(conn);
                // Streaming is only entered on the first successful read.
                self.transition(ConnectionState::Connecting);
                Ok(())
            }
            Err(err) => {
                self.transition(ConnectionState::Failed);
                Err(err)
            }
        }
    }

    /// One acquisition iteration. Returns the freshest frame available, or
    /// `None` when this iteration produced nothing (degraded, mid-reconnect,
    /// or failed).
    pub fn poll_frame(&mut self) -> Option<Frame> {
        match self.state {
            ConnectionState::Failed => None,
            ConnectionState::Reconnecting => {
                self.try_reconnect();
                None
            }
            _ => self.acquire(),
        }
    }

    /// Flush cycle: up to `flush_reads` reads, keep only the last decoded
    /// frame, stop at the first failure.
    fn acquire(&mut self) -> Option<Frame> {
        let Some(conn) = self.conn.as_mut() else {
            // A live state without a connection means the caller skipped
            // `connect`; treat it as an immediate stall.
            self.transition(ConnectionState::Reconnecting);
            return None;
        };

        let mut latest: Option<Frame> = None;
        for _ in 0..self.options.flush_reads.max(1) {
            match conn.read_frame() {
                Ok(frame) => {
                    self.consecutive_failures = 0;
                    if latest.is_some() {
                        debug!("flushed a stale frame");
                    }
                    latest = Some(frame);
                }
                Err(err) => {
                    self.consecutive_failures += 1;
                    debug!(
                        "read failed ({} consecutive): {}",
                        self.consecutive_failures, err
                    );
                    break;
                }
            }
        }

        match latest {
            Some(mut frame) => {
                self.frames_delivered += 1;
                frame.seq = self.frames_delivered;
                self.transition(ConnectionState::Streaming);
                Some(frame)
            }
            None => {
                if self.consecutive_failures >= self.options.stall_threshold {
                    warn!(
                        "no frames after {} consecutive read failures, reconnecting to {}",
                        self.consecutive_failures, self.source.url
                    );
                    self.conn = None;
                    self.reconnect_attempts = 0;
                    self.transition(ConnectionState::Reconnecting);
                } else {
                    self.transition(ConnectionState::Degraded);
                }
                None
            }
        }
    }

    /// One reconnect attempt: backoff sleep, then reopen.
    fn try_reconnect(&mut self) {
        let delay = self.options.retry.delay_for(self.reconnect_attempts);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.reconnect_attempts += 1;

        match self.connector.open(&self.source) {
            Ok(conn) => {
                info!(
                    "reconnected to {} after {} attempt(s)",
                    self.source.url, self.reconnect_attempts
                );
                self.conn = Some(conn);
                self.consecutive_failures = 0;
                self.reconnects += 1;
                self.transition(ConnectionState::Streaming);
            }
            Err(err) => {
                warn!(
                    "reconnect attempt {} to {} failed: {}",
                    self.reconnect_attempts, self.source.url, err
                );
                if self.options.retry.exhausted(self.reconnect_attempts) {
                    self.conn = None;
                    self.transition(ConnectionState::Failed);
                }
            }
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        match next {
            ConnectionState::Failed => {
                warn!("session state {} -> {}", self.state, next);
            }
            _ => info!("session state {} -> {}", self.state, next),
        }
        self.state = next;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn source(&self) -> &StreamSource {
        &self.source
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Frames handed to the caller over the session lifetime; also the
    /// sequence number of the most recent frame.
    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered
    }

    /// Completed reconnect cycles (`Reconnecting` back to `Streaming`).
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::source::ReadError;

    /// One scripted read outcome.
    #[derive(Clone, Copy)]
    enum Step {
        Frame,
        Fail,
        Eos,
    }

    /// Connection that replays a shared script. Each delivered frame is
    /// filled with its read index so tests can tell frames apart.
    struct ScriptedConnection {
        script: Arc<Mutex<VecDeque<Step>>>,
        reads: Arc<Mutex<u8>>,
    }

    impl StreamConnection for ScriptedConnection {
        fn read_frame(&mut self) -> Result<Frame, ReadError> {
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Step::Fail);
            match step {
                Step::Frame => {
                    let mut reads = self.reads.lock().unwrap();
                    *reads = reads.wrapping_add(1);
                    let frame =
                        Frame::new(vec![*reads; 4 * 4 * 3], 4, 4).expect("scripted frame");
                    Ok(frame)
                }
                Step::Fail => Err(ReadError::Transport("scripted failure".into())),
                Step::Eos => Err(ReadError::EndOfStream),
            }
        }
    }

    /// Connector whose `open` outcomes and read script are both scripted.
    struct ScriptedConnector {
        opens: Arc<Mutex<VecDeque<bool>>>,
        script: Arc<Mutex<VecDeque<Step>>>,
        reads: Arc<Mutex<u8>>,
    }

    impl ScriptedConnector {
        fn new(opens: Vec<bool>, script: Vec<Step>) -> Self {
            Self {
                opens: Arc::new(Mutex::new(opens.into())),
                script: Arc::new(Mutex::new(script.into())),
                reads: Arc::new(Mutex::new(0)),
            }
        }

        fn push_steps(&self, steps: impl IntoIterator<Item = Step>) {
            self.script.lock().unwrap().extend(steps);
        }
    }

    impl StreamConnector for &ScriptedConnector {
        fn open(&self, _source: &StreamSource) -> Result<Box<dyn StreamConnection>, ConnectError> {
            let ok = self.opens.lock().unwrap().pop_front().unwrap_or(true);
            if ok {
                Ok(Box::new(ScriptedConnection {
                    script: Arc::clone(&self.script),
                    reads: Arc::clone(&self.reads),
                }))
            } else {
                Err(ConnectError::new("scripted open failure"))
            }
        }
    }

    fn test_options(threshold: u32) -> SessionOptions {
        SessionOptions {
            flush_reads: 3,
            stall_threshold: threshold,
            retry: RetryPolicy::flat(Duration::ZERO),
        }
    }

    fn session_over(
        connector: &ScriptedConnector,
        threshold: u32,
    ) -> StreamSession<&ScriptedConnector> {
        let mut session = StreamSession::new(
            connector,
            StreamSource::new("stub://scripted"),
            test_options(threshold),
        );
        session.connect().expect("initial open");
        session
    }

    #[test]
    fn first_successful_read_enters_streaming() {
        let connector = ScriptedConnector::new(vec![true], vec![Step::Frame; 3]);
        let mut session = session_over(&connector, 30);
        assert_eq!(session.state(), ConnectionState::Connecting);

        let frame = session.poll_frame().expect("frame");
        assert_eq!(frame.seq, 1);
        assert_eq!(session.state(), ConnectionState::Streaming);
    }

    #[test]
    fn initial_open_failure_is_terminal() {
        let connector = ScriptedConnector::new(vec![false], vec![]);
        let mut session = StreamSession::new(
            &connector,
            StreamSource::new("stub://scripted"),
            test_options(30),
        );
        assert!(session.connect().is_err());
        assert_eq!(session.state(), ConnectionState::Failed);
        assert!(session.poll_frame().is_none());
    }

    #[test]
    fn flush_surfaces_the_last_read_frame() {
        let connector = ScriptedConnector::new(vec![true], vec![Step::Frame; 3]);
        let mut session = session_over(&connector, 30);

        // Three reads happen in one poll; the surfaced frame is the third.
        let frame = session.poll_frame().expect("frame");
        assert_eq!(frame.pixels[0], 3);
        assert_eq!(session.frames_delivered(), 1);
    }

    #[test]
    fn flush_stops_at_first_failure_but_keeps_earlier_frame() {
        let connector =
            ScriptedConnector::new(vec![true], vec![Step::Frame, Step::Fail, Step::Frame]);
        let mut session = session_over(&connector, 30);

        // Batch is [ok, fail]: the good frame is surfaced, the trailing
        // failure is recorded, the third scripted step is left unread.
        let frame = session.poll_frame().expect("frame");
        assert_eq!(frame.pixels[0], 1);
        assert_eq!(session.consecutive_failures(), 1);
        assert_eq!(connector.script.lock().unwrap().len(), 1);
    }

    #[test]
    fn failures_below_threshold_stay_degraded() {
        let connector = ScriptedConnector::new(vec![true], vec![Step::Frame]);
        let mut session = session_over(&connector, 5);
        session.poll_frame().expect("frame");

        for expected in 1..5 {
            connector.push_steps([Step::Fail]);
            assert!(session.poll_frame().is_none());
            assert_eq!(session.consecutive_failures(), expected);
            assert_eq!(session.state(), ConnectionState::Degraded);
        }
    }

    #[test]
    fn threshold_crossing_enters_reconnecting() {
        let connector = ScriptedConnector::new(vec![true], vec![Step::Frame]);
        let mut session = session_over(&connector, 3);
        session.poll_frame().expect("frame");

        connector.push_steps([Step::Fail, Step::Fail, Step::Fail]);
        assert!(session.poll_frame().is_none());
        assert!(session.poll_frame().is_none());
        assert_eq!(session.state(), ConnectionState::Degraded);
        assert!(session.poll_frame().is_none());
        assert_eq!(session.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn reopen_resets_the_failure_counter() {
        let connector = ScriptedConnector::new(vec![true, true], vec![Step::Frame]);
        let mut session = session_over(&connector, 2);
        session.poll_frame().expect("frame");

        connector.push_steps([Step::Fail, Step::Fail]);
        assert!(session.poll_frame().is_none());
        assert!(session.poll_frame().is_none());
        assert_eq!(session.state(), ConnectionState::Reconnecting);

        // Reconnect poll: reopen succeeds, counter is clean.
        assert!(session.poll_frame().is_none());
        assert_eq!(session.state(), ConnectionState::Streaming);
        assert_eq!(session.consecutive_failures(), 0);
        assert_eq!(session.reconnects(), 1);
    }

    #[test]
    fn end_of_stream_counts_like_any_failure() {
        let connector = ScriptedConnector::new(vec![true], vec![Step::Frame]);
        let mut session = session_over(&connector, 2);
        session.poll_frame().expect("frame");

        connector.push_steps([Step::Eos, Step::Eos]);
        assert!(session.poll_frame().is_none());
        assert!(session.poll_frame().is_none());
        assert_eq!(session.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn exhausted_attempt_limit_fails_the_session() {
        let connector = ScriptedConnector::new(vec![true, false, false], vec![Step::Frame]);
        let mut session = StreamSession::new(
            &connector,
            StreamSource::new("stub://scripted"),
            SessionOptions {
                flush_reads: 3,
                stall_threshold: 1,
                retry: RetryPolicy::flat(Duration::ZERO).with_max_attempts(2),
            },
        );
        session.connect().expect("initial open");
        session.poll_frame().expect("frame");

        connector.push_steps([Step::Fail]);
        assert!(session.poll_frame().is_none());
        assert_eq!(session.state(), ConnectionState::Reconnecting);

        assert!(session.poll_frame().is_none());
        assert_eq!(session.state(), ConnectionState::Reconnecting);
        assert!(session.poll_frame().is_none());
        assert_eq!(session.state(), ConnectionState::Failed);

        // Terminal: further polls do nothing.
        assert!(session.poll_frame().is_none());
    }
}
