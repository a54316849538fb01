use std::fmt;

/// Connection state of a session. Exactly one per active session.
///
/// Transitions happen only inside the session (between acquisition
/// iterations) and are the only place session-level side effects such as
/// logging occur.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection opened (or opening); no frame delivered yet.
    Connecting,
    /// Frames are flowing.
    Streaming,
    /// Reads are failing but the stall threshold has not been crossed.
    Degraded,
    /// Connection dropped; the retry policy governs reopen attempts.
    Reconnecting,
    /// Terminal: the initial open failed or the attempt limit was exhausted.
    Failed,
}

impl ConnectionState {
    /// True while the session holds a connection it still reads from.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Streaming | ConnectionState::Degraded
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_states() {
        assert!(ConnectionState::Connecting.is_live());
        assert!(ConnectionState::Streaming.is_live());
        assert!(ConnectionState::Degraded.is_live());
        assert!(!ConnectionState::Reconnecting.is_live());
        assert!(!ConnectionState::Failed.is_live());
    }
}
