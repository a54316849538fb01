//! streamview viewer: interactive low-latency stream window.
//!
//! One cooperative loop per session: poll the freshest frame, overlay
//! detections, blit, handle single-key commands, repeat. Reconnection is
//! the session's job; the viewer only decides when to stop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{error, info, warn};
use macroquad::prelude::*;

use streamview::present::{DEFAULT_WINDOW_HEIGHT, DEFAULT_WINDOW_WIDTH};
use streamview::{
    Annotator, Command, ConnectionState, Detection, Frame, RtspConnector, SnapshotWriter,
    StreamSession, StubBackend, Transport, ViewerConfig, IDLE_RETRY_DELAY,
};

/// Low-latency RTSP stream viewer.
#[derive(Parser, Debug)]
#[command(name = "viewer", version, about = "Low-latency RTSP stream viewer")]
struct Args {
    /// Stream URL (rtsp://... or stub://... for a synthetic source)
    url: Option<String>,

    /// Use UDP transport instead of the default RTSP-over-TCP
    #[arg(long)]
    udp: bool,

    /// ONNX detection model enabling the annotation overlay
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Overlay the built-in motion detector instead of a model
    #[arg(long)]
    motion: bool,
}

fn window_conf() -> Conf {
    Conf {
        window_title: "streamview".to_owned(),
        window_width: DEFAULT_WINDOW_WIDTH as i32,
        window_height: DEFAULT_WINDOW_HEIGHT as i32,
        window_resizable: true,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run().await {
        error!("{err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let mut config = ViewerConfig::load()?;
    if let Some(url) = args.url {
        config.source.url = url;
    }
    if args.udp {
        config.source.transport = Transport::Udp;
    }
    if let Some(model) = args.model {
        config.annotation.model_path = Some(model);
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("install Ctrl-C handler")?;
    }

    info!(
        "connecting to {} ({} transport)",
        config.source.url,
        match config.source.transport {
            Transport::Tcp => "TCP",
            Transport::Udp => "UDP",
        }
    );
    info!("controls: q quit | f fullscreen | r reset window | s snapshot");

    let mut annotator = if args.motion {
        Annotator::with_backend(Box::new(StubBackend::new()))
            .with_threshold(config.annotation.confidence_threshold)
    } else {
        Annotator::from_model_file(
            config.annotation.model_path.as_deref(),
            config.annotation.labels_path.as_deref(),
            (config.annotation.input_width, config.annotation.input_height),
            config.annotation.confidence_threshold,
        )
    };

    let mut session = StreamSession::new(
        RtspConnector::new(),
        config.stream_source(),
        config.session_options(),
    );
    session
        .connect()
        .map_err(|err| anyhow!("could not connect to {}: {}", config.source.url, err))?;

    let mut snapshots = SnapshotWriter::new(&config.snapshot_dir);
    let mut fullscreen = false;
    let mut texture: Option<Texture2D> = None;
    let mut texture_size = (0u32, 0u32);
    let mut detections: Vec<Detection> = Vec::new();
    let mut current: Option<Frame> = None;

    loop {
        if stop.load(Ordering::SeqCst) {
            info!("stop signal received");
            break;
        }

        match session.poll_frame() {
            Some(mut frame) => {
                detections = annotator.annotate(&mut frame);
                upload_frame(&frame, &mut texture, &mut texture_size);
                if frame.seq % 100 == 0 {
                    info!("delivered {} frames (state: {})", frame.seq, session.state());
                }
                current = Some(frame);
            }
            None => {
                if session.state() == ConnectionState::Failed {
                    error!("session failed permanently, shutting down");
                    break;
                }
                // Stops a dead source from busy-spinning the loop.
                std::thread::sleep(IDLE_RETRY_DELAY);
            }
        }

        clear_background(BLACK);
        if let (Some(tex), Some(frame)) = (&texture, &current) {
            let (dx, dy, dw, dh) =
                letterbox(frame.width, frame.height, screen_width(), screen_height());
            draw_texture_ex(
                tex,
                dx,
                dy,
                WHITE,
                DrawTextureParams {
                    dest_size: Some(vec2(dw, dh)),
                    ..Default::default()
                },
            );
            for det in &detections {
                let (bx, by, _, _) = det.bbox.to_pixels(frame.width, frame.height);
                let x = dx + bx as f32 * dw / frame.width as f32;
                let y = dy + by as f32 * dh / frame.height as f32;
                let label = format!("{} {:.0}%", det.label, det.confidence * 100.0);
                draw_text(&label, x + 3.0, y - 3.0, 16.0, WHITE);
            }
            draw_text(&format!("frame {}", frame.seq), 10.0, 24.0, 24.0, GREEN);
            draw_text(
                &chrono::Local::now().format("%H:%M:%S").to_string(),
                10.0,
                48.0,
                20.0,
                YELLOW,
            );
        }
        if session.state() != ConnectionState::Streaming {
            draw_text(
                &format!("{}...", session.state()),
                10.0,
                screen_height() - 14.0,
                24.0,
                RED,
            );
        }

        match poll_command() {
            Some(Command::Quit) => {
                info!("quit requested");
                break;
            }
            Some(Command::ToggleFullscreen) => {
                fullscreen = !fullscreen;
                set_fullscreen(fullscreen);
                info!("{}", if fullscreen { "fullscreen" } else { "windowed" });
            }
            Some(Command::ResetWindow) => {
                fullscreen = false;
                set_fullscreen(false);
                request_new_screen_size(DEFAULT_WINDOW_WIDTH as f32, DEFAULT_WINDOW_HEIGHT as f32);
                info!("window reset");
            }
            Some(Command::SaveSnapshot) => {
                if let Some(frame) = &current {
                    match snapshots.save(frame) {
                        Ok(path) => info!("snapshot saved: {}", path.display()),
                        Err(err) => warn!("snapshot failed: {err:#}"),
                    }
                } else {
                    warn!("no frame to snapshot yet");
                }
            }
            None => {}
        }

        next_frame().await;
    }

    info!(
        "session closed: {} frames delivered, {} reconnect(s)",
        session.frames_delivered(),
        session.reconnects()
    );
    Ok(())
}

/// Single-key, non-blocking command poll.
fn poll_command() -> Option<Command> {
    if is_key_pressed(KeyCode::Q) {
        Command::from_key('q')
    } else if is_key_pressed(KeyCode::F) {
        Command::from_key('f')
    } else if is_key_pressed(KeyCode::R) {
        Command::from_key('r')
    } else if is_key_pressed(KeyCode::S) {
        Command::from_key('s')
    } else {
        None
    }
}

/// Upload the frame into the (re)used texture, converting RGB to RGBA.
fn upload_frame(frame: &Frame, texture: &mut Option<Texture2D>, texture_size: &mut (u32, u32)) {
    let mut rgba = Vec::with_capacity(frame.pixels.len() / 3 * 4);
    for rgb in frame.pixels.chunks_exact(3) {
        rgba.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
    }

    match texture {
        Some(tex) if *texture_size == (frame.width, frame.height) => {
            tex.update(&Image {
                bytes: rgba,
                width: frame.width as u16,
                height: frame.height as u16,
            });
        }
        _ => {
            let tex = Texture2D::from_rgba8(frame.width as u16, frame.height as u16, &rgba);
            tex.set_filter(FilterMode::Linear);
            *texture = Some(tex);
            *texture_size = (frame.width, frame.height);
        }
    }
}

/// Fit the frame into the window, preserving aspect ratio.
fn letterbox(frame_w: u32, frame_h: u32, screen_w: f32, screen_h: f32) -> (f32, f32, f32, f32) {
    let scale = (screen_w / frame_w as f32).min(screen_h / frame_h as f32);
    let dw = frame_w as f32 * scale;
    let dh = frame_h as f32 * scale;
    ((screen_w - dw) / 2.0, (screen_h - dh) / 2.0, dw, dh)
}
