//! Status query boundary.
//!
//! External collaborators (the HTTP layer, operators) ask one question: is
//! the source currently reachable and yielding frames? `check` answers it
//! with a fresh `open` plus a single read, on demand. It deliberately does
//! NOT share the long-running session's connection; the probe and the
//! session are independent observers of the same source.

use log::debug;
use serde::Serialize;

use crate::source::{StreamConnector, StreamSource};

/// Result of a one-shot connectivity check.
#[derive(Clone, Debug, Serialize)]
pub struct ProbeReport {
    pub url: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ProbeReport {
    fn reachable(url: &str) -> Self {
        Self {
            url: url.to_string(),
            reachable: true,
            reason: None,
        }
    }

    fn unreachable(url: &str, reason: String) -> Self {
        Self {
            url: url.to_string(),
            reachable: false,
            reason: Some(reason),
        }
    }
}

/// Open the source and pull one frame. Never panics; failure is data.
pub fn check(connector: &impl StreamConnector, source: &StreamSource) -> ProbeReport {
    let mut conn = match connector.open(source) {
        Ok(conn) => conn,
        Err(err) => {
            debug!("probe open failed for {}: {}", source.url, err);
            return ProbeReport::unreachable(&source.url, err.to_string());
        }
    };

    match conn.read_frame() {
        Ok(frame) => {
            debug!(
                "probe read a {}x{} frame from {}",
                frame.width, frame.height, source.url
            );
            ProbeReport::reachable(&source.url)
        }
        Err(err) => ProbeReport::unreachable(&source.url, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RtspConnector;

    #[test]
    fn probe_reports_reachable_synthetic_source() {
        let report = check(&RtspConnector::new(), &StreamSource::new("stub://up"));
        assert!(report.reachable);
        assert!(report.reason.is_none());
    }

    #[test]
    fn probe_reports_open_failure_with_reason() {
        let report = check(
            &RtspConnector::new(),
            &StreamSource::new("stub://down?fail_open=1"),
        );
        assert!(!report.reachable);
        assert!(report.reason.expect("reason").contains("refuse"));
    }

    #[test]
    fn probe_reports_read_failure_with_reason() {
        // Opens fine but is scripted to end immediately: open succeeds, the
        // single probe read does not.
        let report = check(
            &RtspConnector::new(),
            &StreamSource::new("stub://empty?eos_after=0"),
        );
        assert!(!report.reachable);
        assert!(report.reason.expect("reason").contains("closed"));
    }

    #[test]
    fn probe_report_serializes_to_json() {
        let report = check(&RtspConnector::new(), &StreamSource::new("stub://up"));
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(json.contains("\"reachable\":true"));
    }
}
