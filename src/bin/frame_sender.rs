//! Test client for the pose server: streams still images from a directory as
//! camera frames, forwards console alignment commands, and saves what comes
//! back.
//!
//! Usage: frame_sender <frames_dir> [server_addr] [output_dir]
//!
//! Console: u/d/l/r move the reference, +/- scale it, 0 resets, p pings.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use signal_hook::consts::SIGINT;
use tokio::sync::mpsc;
use tracing::{info, warn};

use yogavision::codec;
use yogavision::config::LoggingConfig;
use yogavision::logging;
use yogavision::protocol::{self, ClientMessage, ServerMessage};
use yogavision::session::AdjustAction;

const FRAME_INTERVAL: Duration = Duration::from_millis(33);
const DEFAULT_SERVER: &str = "127.0.0.1:5000";

fn load_frames(dir: &Path) -> Result<Vec<Vec<u8>>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
                Some("jpg" | "jpeg" | "png")
            )
        })
        .collect();
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        frames.push(codec::ensure_jpeg(bytes, codec::DEFAULT_JPEG_QUALITY)?);
    }
    Ok(frames)
}

fn parse_command(line: &str) -> Option<ClientMessage> {
    let action = match line {
        "u" => AdjustAction::MoveUp,
        "d" => AdjustAction::MoveDown,
        "l" => AdjustAction::MoveLeft,
        "r" => AdjustAction::MoveRight,
        "+" => AdjustAction::ScaleUp,
        "-" => AdjustAction::ScaleDown,
        "0" => AdjustAction::Reset,
        "p" => return Some(ClientMessage::Ping),
        other => other.parse().ok()?,
    };
    Some(ClientMessage::AdjustPose { action })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Some(frames_dir) = args.get(1) else {
        bail!("usage: frame_sender <frames_dir> [server_addr] [output_dir]");
    };
    let server_addr = args.get(2).map(String::as_str).unwrap_or(DEFAULT_SERVER);
    let output_dir = args.get(3).map(PathBuf::from);

    let (_log_guard, _) = logging::init(&LoggingConfig::default(), "frame_sender")?;
    info!("Frame Sender ({})", env!("GIT_VERSION"));

    let frames = load_frames(Path::new(frames_dir))?;
    if frames.is_empty() {
        bail!("no images in {}", frames_dir);
    }
    info!("[frames] {} image(s) from {}", frames.len(), frames_dir);
    if let Some(dir) = &output_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&stop))?;

    // Console input thread
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ClientMessage>(8);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => match parse_command(line.trim()) {
                    Some(msg) => {
                        if cmd_tx.blocking_send(msg).is_err() {
                            break;
                        }
                    }
                    None => eprintln!("[input] unknown command: {}", line.trim()),
                },
            }
        }
    });

    let tcp = tokio::net::TcpStream::connect(server_addr)
        .await
        .with_context(|| format!("failed to connect to {}", server_addr))?;
    tcp.set_nodelay(true)?;
    info!("[tcp] connected to {}", server_addr);
    let (mut sink, mut stream) = protocol::message_stream(tcp).split();

    let ping_sent = Arc::new(std::sync::Mutex::new(None::<Instant>));
    let reader = {
        let ping_sent = Arc::clone(&ping_sent);
        tokio::spawn(async move {
            let mut received = 0u64;
            loop {
                let msg = match protocol::recv_message::<_, ServerMessage>(&mut stream).await {
                    Ok(Some(msg)) => msg,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("[tcp] receive error: {e:#}");
                        break;
                    }
                };
                match msg {
                    ServerMessage::Status { message } => info!("[server] {}", message),
                    ServerMessage::ProcessedFrame { jpeg_data, score } => {
                        received += 1;
                        match score {
                            Some(s) => info!("[frame {}] score {:.1}", received, s),
                            None => info!("[frame {}] no score", received),
                        }
                        if let Some(dir) = &output_dir {
                            let path = dir.join(format!("frame_{:05}.jpg", received));
                            if let Err(e) = std::fs::write(&path, &jpeg_data) {
                                warn!("failed to write {}: {}", path.display(), e);
                            }
                        }
                    }
                    ServerMessage::PoseAdjusted {
                        offset_x,
                        offset_y,
                        scale,
                    } => info!("[adjust] offset=({:.2}, {:.2}) scale={:.2}", offset_x, offset_y, scale),
                    ServerMessage::Pong => {
                        let sent = ping_sent.lock().unwrap_or_else(|e| e.into_inner()).take();
                        match sent {
                            Some(at) => info!("[ping] {:.1}ms", at.elapsed().as_secs_f64() * 1000.0),
                            None => info!("[ping] pong"),
                        }
                    }
                }
            }
            received
        })
    };

    let started = Instant::now();
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    let mut sent = 0u64;
    while !stop.load(Ordering::Relaxed) && !reader.is_finished() {
        ticker.tick().await;

        while let Ok(cmd) = cmd_rx.try_recv() {
            if cmd == ClientMessage::Ping {
                *ping_sent.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
            }
            protocol::send_message(&mut sink, &cmd).await?;
        }

        let jpeg_data = frames[(sent as usize) % frames.len()].clone();
        let timestamp_us = started.elapsed().as_micros() as u64;
        protocol::send_message(&mut sink, &ClientMessage::Frame { timestamp_us, jpeg_data }).await?;
        sent += 1;
    }

    drop(sink);
    reader.abort();
    info!("[done] sent {} frame(s)", sent);
    Ok(())
}
