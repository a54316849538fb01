//! Layered viewer configuration.
//!
//! Compiled defaults, overridden by an optional JSON file named by
//! `STREAMVIEW_CONFIG`, overridden by environment variables. Command-line
//! flags (parsed in the binaries) win over everything.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::{Backoff, RetryPolicy, SessionOptions, FLUSH_READS, STALL_THRESHOLD};
use crate::source::{StreamSource, Transport};

const DEFAULT_STREAM_URL: &str = "rtsp://127.0.0.1:8554/live/stream1";
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_SNAPSHOT_DIR: &str = ".";
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = crate::annotate::CONFIDENCE_THRESHOLD;
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 2;

/// Cap applied to the exponential schedule when one is configured.
const EXPONENTIAL_BACKOFF_CAP: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize, Default)]
struct ViewerConfigFile {
    source: Option<SourceConfigFile>,
    annotation: Option<AnnotationConfigFile>,
    session: Option<SessionConfigFile>,
    snapshot_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    transport: Option<String>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotationConfigFile {
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    flush_reads: Option<usize>,
    stall_threshold: Option<u32>,
    reconnect_delay_secs: Option<u64>,
    max_reconnects: Option<u32>,
    backoff: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub source: SourceSettings,
    pub annotation: AnnotationSettings,
    pub session: SessionSettings,
    pub snapshot_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub transport: Transport,
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct AnnotationSettings {
    /// Absence silently disables annotation; it never fails startup.
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub flush_reads: usize,
    pub stall_threshold: u32,
    pub reconnect_delay: Duration,
    /// `None` retries forever (the default, preserving availability).
    pub max_reconnects: Option<u32>,
    pub exponential_backoff: bool,
}

impl ViewerConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("STREAMVIEW_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ViewerConfigFile) -> Result<Self> {
        let source = SourceSettings {
            url: file
                .source
                .as_ref()
                .and_then(|source| source.url.clone())
                .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
            transport: match file.source.as_ref().and_then(|source| source.transport.as_deref()) {
                Some(raw) => parse_transport(raw)?,
                None => Transport::Tcp,
            },
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
        };
        let annotation = AnnotationSettings {
            model_path: file
                .annotation
                .as_ref()
                .and_then(|annotation| annotation.model_path.clone()),
            labels_path: file
                .annotation
                .as_ref()
                .and_then(|annotation| annotation.labels_path.clone()),
            input_width: file
                .annotation
                .as_ref()
                .and_then(|annotation| annotation.input_width)
                .unwrap_or(DEFAULT_MODEL_INPUT),
            input_height: file
                .annotation
                .as_ref()
                .and_then(|annotation| annotation.input_height)
                .unwrap_or(DEFAULT_MODEL_INPUT),
            confidence_threshold: file
                .annotation
                .as_ref()
                .and_then(|annotation| annotation.confidence_threshold)
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
        };
        let session = SessionSettings {
            flush_reads: file
                .session
                .as_ref()
                .and_then(|session| session.flush_reads)
                .unwrap_or(FLUSH_READS),
            stall_threshold: file
                .session
                .as_ref()
                .and_then(|session| session.stall_threshold)
                .unwrap_or(STALL_THRESHOLD),
            reconnect_delay: Duration::from_secs(
                file.session
                    .as_ref()
                    .and_then(|session| session.reconnect_delay_secs)
                    .unwrap_or(DEFAULT_RECONNECT_DELAY_SECS),
            ),
            max_reconnects: file.session.as_ref().and_then(|session| session.max_reconnects),
            exponential_backoff: match file
                .session
                .as_ref()
                .and_then(|session| session.backoff.as_deref())
            {
                Some("exponential") => true,
                Some("flat") | None => false,
                Some(other) => {
                    return Err(anyhow!(
                        "unknown backoff schedule {:?} (expected \"flat\" or \"exponential\")",
                        other
                    ))
                }
            },
        };
        Ok(Self {
            source,
            annotation,
            session,
            snapshot_dir: file
                .snapshot_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("STREAMVIEW_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(transport) = std::env::var("STREAMVIEW_TRANSPORT") {
            if !transport.trim().is_empty() {
                self.source.transport = parse_transport(&transport)?;
            }
        }
        if let Ok(model) = std::env::var("STREAMVIEW_MODEL") {
            if !model.trim().is_empty() {
                self.annotation.model_path = Some(PathBuf::from(model));
            }
        }
        if let Ok(labels) = std::env::var("STREAMVIEW_LABELS") {
            if !labels.trim().is_empty() {
                self.annotation.labels_path = Some(PathBuf::from(labels));
            }
        }
        if let Ok(dir) = std::env::var("STREAMVIEW_SNAPSHOT_DIR") {
            if !dir.trim().is_empty() {
                self.snapshot_dir = PathBuf::from(dir);
            }
        }
        if let Ok(delay) = std::env::var("STREAMVIEW_RECONNECT_DELAY_SECS") {
            let seconds: u64 = delay.parse().map_err(|_| {
                anyhow!("STREAMVIEW_RECONNECT_DELAY_SECS must be an integer number of seconds")
            })?;
            self.session.reconnect_delay = Duration::from_secs(seconds);
        }
        if let Ok(max) = std::env::var("STREAMVIEW_MAX_RECONNECTS") {
            let attempts: u32 = max
                .parse()
                .map_err(|_| anyhow!("STREAMVIEW_MAX_RECONNECTS must be an integer"))?;
            self.session.max_reconnects = Some(attempts);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("stream URL must not be empty"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("target_fps must be greater than zero"));
        }
        if self.session.flush_reads == 0 {
            return Err(anyhow!("flush_reads must be at least 1"));
        }
        if self.session.stall_threshold == 0 {
            return Err(anyhow!("stall_threshold must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.annotation.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be within [0, 1]"));
        }
        Ok(())
    }

    /// The stream identity this config describes.
    pub fn stream_source(&self) -> StreamSource {
        StreamSource::new(self.source.url.clone())
            .with_transport(self.source.transport)
            .with_target_fps(self.source.target_fps)
    }

    /// Session tunables derived from this config.
    pub fn session_options(&self) -> SessionOptions {
        let backoff = if self.session.exponential_backoff {
            Backoff::Exponential {
                base: self.session.reconnect_delay,
                cap: EXPONENTIAL_BACKOFF_CAP,
            }
        } else {
            Backoff::Flat(self.session.reconnect_delay)
        };
        SessionOptions {
            flush_reads: self.session.flush_reads,
            stall_threshold: self.session.stall_threshold,
            retry: RetryPolicy {
                backoff,
                max_attempts: self.session.max_reconnects,
            },
        }
    }
}

fn parse_transport(raw: &str) -> Result<Transport> {
    match raw.to_ascii_lowercase().as_str() {
        "tcp" => Ok(Transport::Tcp),
        "udp" => Ok(Transport::Udp),
        other => Err(anyhow!(
            "unknown transport {:?} (expected \"tcp\" or \"udp\")",
            other
        )),
    }
}

fn read_config_file(path: &Path) -> Result<ViewerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
