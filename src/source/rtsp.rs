//! RTSP connector.
//!
//! `RtspConnector` opens connections for the acquisition loop and the
//! one-shot probe. Real streams are decoded through a GStreamer pipeline
//! (feature `rtsp-gstreamer`); `stub://` URLs select a synthetic backend
//! that generates deterministic frames, so the viewer, the probe, and the
//! tests run without a camera.
//!
//! The pipeline is configured for minimum latency: zero jitterbuffer, a
//! receive queue of depth 1 that drops the oldest sample, and no sink-side
//! clock sync. Stale frames are the acquisition loop's problem, not the
//! transport's.

use log::info;

#[cfg(feature = "rtsp-gstreamer")]
use std::time::Duration;

use crate::frame::Frame;
#[cfg(feature = "rtsp-gstreamer")]
use crate::source::Transport;
use crate::source::{ConnectError, ReadError, StreamConnection, StreamConnector, StreamSource};

/// Connector for RTSP and `stub://` sources.
#[derive(Clone, Copy, Debug, Default)]
pub struct RtspConnector;

impl RtspConnector {
    pub fn new() -> Self {
        Self
    }
}

impl StreamConnector for RtspConnector {
    fn open(&self, source: &StreamSource) -> Result<Box<dyn StreamConnection>, ConnectError> {
        if source.url.starts_with("stub://") {
            let options = StubOptions::parse(&source.url);
            if options.fail_open {
                return Err(ConnectError::new(format!(
                    "synthetic source {} is scripted to refuse connections",
                    source.url
                )));
            }
            info!("connected to {} (synthetic)", source.url);
            return Ok(Box::new(SyntheticConnection::new(options)));
        }

        #[cfg(feature = "rtsp-gstreamer")]
        {
            let conn = GstConnection::open(source)?;
            info!("connected to {} (gstreamer)", source.url);
            Ok(Box::new(conn))
        }
        #[cfg(not(feature = "rtsp-gstreamer"))]
        {
            Err(ConnectError::new(format!(
                "cannot open {}: RTSP support requires the rtsp-gstreamer feature",
                source.url
            )))
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic backend (stub://) for demos and tests
// ----------------------------------------------------------------------------

/// Options encoded in a `stub://` URL query string, e.g.
/// `stub://demo?w=320&h=240&eos_after=10&fail_open=1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct StubOptions {
    width: u32,
    height: u32,
    /// Refuse the `open` call entirely.
    fail_open: bool,
    /// Report `EndOfStream` after this many delivered frames.
    eos_after: Option<u64>,
}

impl StubOptions {
    fn parse(url: &str) -> Self {
        let mut options = Self {
            width: 640,
            height: 480,
            fail_open: false,
            eos_after: None,
        };
        let Some(query) = url.splitn(2, '?').nth(1) else {
            return options;
        };
        for pair in query.split('&') {
            let mut kv = pair.splitn(2, '=');
            let key = kv.next().unwrap_or_default();
            let value = kv.next().unwrap_or_default();
            match key {
                "w" => options.width = value.parse().unwrap_or(options.width),
                "h" => options.height = value.parse().unwrap_or(options.height),
                "fail_open" => options.fail_open = value == "1" || value == "true",
                "eos_after" => options.eos_after = value.parse().ok(),
                _ => {}
            }
        }
        options
    }
}

/// Deterministic frame generator standing in for a live camera.
struct SyntheticConnection {
    width: u32,
    height: u32,
    tick: u64,
    eos_after: Option<u64>,
}

impl SyntheticConnection {
    fn new(options: StubOptions) -> Self {
        Self {
            width: options.width,
            height: options.height,
            tick: 0,
            eos_after: options.eos_after,
        }
    }

    /// Diagonal gradient that shifts each tick, so consecutive frames differ
    /// (the stub motion detector depends on that).
    fn render(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut pixels = vec![0u8; w * h * crate::frame::BYTES_PER_PIXEL];
        let shift = (self.tick * 4) as usize;
        for y in 0..h {
            for x in 0..w {
                let base = (y * w + x) * 3;
                let v = (x + y + shift) % 256;
                pixels[base] = v as u8;
                pixels[base + 1] = ((v + 85) % 256) as u8;
                pixels[base + 2] = ((v + 170) % 256) as u8;
            }
        }
        pixels
    }
}

impl StreamConnection for SyntheticConnection {
    fn read_frame(&mut self) -> Result<Frame, ReadError> {
        if let Some(limit) = self.eos_after {
            if self.tick >= limit {
                return Err(ReadError::EndOfStream);
            }
        }
        let pixels = self.render();
        self.tick += 1;
        Frame::new(pixels, self.width, self.height).map_err(|e| ReadError::Decode(e.to_string()))
    }
}

// ----------------------------------------------------------------------------
// GStreamer backend
// ----------------------------------------------------------------------------

#[cfg(feature = "rtsp-gstreamer")]
struct GstConnection {
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    read_timeout: Duration,
}

#[cfg(feature = "rtsp-gstreamer")]
impl GstConnection {
    /// Build and start the decode pipeline:
    /// `rtspsrc ! decodebin ! videoconvert ! appsink`.
    ///
    /// `latency=0` plus `max-buffers=1 drop=true sync=false` keeps exactly
    /// one undelivered sample inside the transport.
    fn open(source: &StreamSource) -> Result<Self, ConnectError> {
        gstreamer::init()
            .map_err(|e| ConnectError::new(format!("initialize gstreamer: {e}")))?;

        let protocols = match source.transport {
            Transport::Tcp => " protocols=tcp",
            Transport::Udp => "",
        };
        let description = format!(
            "rtspsrc location={}{} latency=0 ! decodebin ! videoconvert ! \
             video/x-raw,format=RGB ! appsink name=appsink sync=false max-buffers=1 drop=true",
            source.url, protocols
        );
        let pipeline = gstreamer::parse_launch(&description)
            .map_err(|e| ConnectError::new(format!("build RTSP pipeline: {e}")))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| ConnectError::new("RTSP pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .ok_or_else(|| ConnectError::new("appsink element missing from pipeline"))?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| ConnectError::new("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| ConnectError::new(format!("start RTSP pipeline: {e}")))?;

        // Wait for the handshake to complete; an unreachable source or one
        // with no media surfaces here instead of on the first read.
        let (change, _, _) = pipeline.state(gstreamer::ClockTime::from_seconds(10));
        if change.is_err() {
            let reason = drain_bus_error(&pipeline)
                .unwrap_or_else(|| "RTSP handshake did not complete".to_string());
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(ConnectError::new(reason));
        }
        if let Some(reason) = drain_bus_error(&pipeline) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(ConnectError::new(reason));
        }

        let read_timeout = read_timeout_for(source.target_fps);
        Ok(Self {
            pipeline,
            appsink,
            read_timeout,
        })
    }

    /// Classify any pending bus message into a read failure.
    fn take_bus_failure(&mut self) -> Option<ReadError> {
        let bus = self.pipeline.bus()?;
        while let Some(message) = bus.pop() {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    return Some(ReadError::Transport(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    )));
                }
                MessageView::Eos(..) => return Some(ReadError::EndOfStream),
                _ => {}
            }
        }
        None
    }
}

#[cfg(feature = "rtsp-gstreamer")]
impl StreamConnection for GstConnection {
    fn read_frame(&mut self) -> Result<Frame, ReadError> {
        if let Some(failure) = self.take_bus_failure() {
            return Err(failure);
        }

        let timeout = gstreamer::ClockTime::from_mseconds(self.read_timeout.as_millis() as u64);
        let Some(sample) = self.appsink.try_pull_sample(timeout) else {
            // A stall and a hard failure look the same from the sink side;
            // the bus tells them apart.
            if let Some(failure) = self.take_bus_failure() {
                return Err(failure);
            }
            return Err(ReadError::Stalled);
        };

        let (pixels, width, height) =
            sample_to_pixels(&sample).map_err(|e| ReadError::Decode(e.to_string()))?;
        Frame::new(pixels, width, height).map_err(|e| ReadError::Decode(e.to_string()))
    }
}

#[cfg(feature = "rtsp-gstreamer")]
impl Drop for GstConnection {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

/// Bounded read timeout derived from the frame-rate hint: four frame
/// intervals, at least 500 ms.
#[cfg(feature = "rtsp-gstreamer")]
fn read_timeout_for(target_fps: u32) -> Duration {
    let base_ms = if target_fps == 0 {
        500
    } else {
        (1000 / target_fps).saturating_mul(4)
    };
    Duration::from_millis(base_ms.max(500) as u64)
}

#[cfg(feature = "rtsp-gstreamer")]
fn drain_bus_error(pipeline: &gstreamer::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    while let Some(message) = bus.pop() {
        use gstreamer::MessageView;
        match message.view() {
            MessageView::Error(err) => {
                return Some(format!(
                    "gstreamer error from {:?}: {}",
                    err.src().map(|s| s.path_string()),
                    err.error()
                ));
            }
            MessageView::Eos(..) => return Some("source reported end of stream".to_string()),
            _ => {}
        }
    }
    None
}

#[cfg(feature = "rtsp-gstreamer")]
fn sample_to_pixels(sample: &gstreamer::Sample) -> anyhow::Result<(Vec<u8>, u32, u32)> {
    use anyhow::Context;

    let buffer = sample.buffer().context("RTSP sample missing buffer")?;
    let caps = sample.caps().context("RTSP sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse RTSP caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * crate::frame::BYTES_PER_PIXEL;
    let stride = info.stride(0) as usize;

    let map = buffer.map_readable().context("map RTSP buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    // De-stride: frames are tightly packed past this point.
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("RTSP buffer row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_produces_frames() {
        let connector = RtspConnector::new();
        let source = StreamSource::new("stub://test?w=64&h=48");
        let mut conn = connector.open(&source).expect("open");

        let frame = conn.read_frame().expect("frame");
        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 48);
        assert_eq!(frame.byte_len(), 64 * 48 * 3);
    }

    #[test]
    fn consecutive_synthetic_frames_differ() {
        let connector = RtspConnector::new();
        let source = StreamSource::new("stub://test?w=32&h=32");
        let mut conn = connector.open(&source).expect("open");

        let a = conn.read_frame().expect("frame a");
        let b = conn.read_frame().expect("frame b");
        assert_ne!(a.pixels, b.pixels);
    }

    #[test]
    fn scripted_open_failure_is_a_connect_error() {
        let connector = RtspConnector::new();
        let source = StreamSource::new("stub://down?fail_open=1");
        let err = connector.open(&source).err().expect("open must fail");
        assert!(err.reason.contains("refuse"));
    }

    #[test]
    fn scripted_eos_surfaces_after_limit() {
        let connector = RtspConnector::new();
        let source = StreamSource::new("stub://short?w=16&h=16&eos_after=2");
        let mut conn = connector.open(&source).expect("open");

        assert!(conn.read_frame().is_ok());
        assert!(conn.read_frame().is_ok());
        assert!(matches!(conn.read_frame(), Err(ReadError::EndOfStream)));
    }

    #[test]
    fn stub_options_parse_query_pairs() {
        let options = StubOptions::parse("stub://cam?w=320&h=240&fail_open=1&eos_after=7");
        assert_eq!(options.width, 320);
        assert_eq!(options.height, 240);
        assert!(options.fail_open);
        assert_eq!(options.eos_after, Some(7));

        let defaults = StubOptions::parse("stub://cam");
        assert_eq!(defaults.width, 640);
        assert_eq!(defaults.height, 480);
        assert!(!defaults.fail_open);
        assert_eq!(defaults.eos_after, None);
    }
}
