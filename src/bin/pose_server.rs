//! Pose server: receives camera frames over TCP, scores each one against the
//! active exercise's reference pose, and streams annotated frames back.
//!
//! Usage: pose_server [config.toml]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use tokio::net::TcpListener;
use tracing::{error, info};

use yogavision::buffer::FrameBuffer;
use yogavision::config::Config;
use yogavision::exercise::{ExerciseCoordinator, SqliteStore};
use yogavision::logging;
use yogavision::pose::PoseDetector;
use yogavision::reference::{DirectorySource, ReferenceStore};
use yogavision::server::PoseServer;
use yogavision::worker::PoseWorker;

const DEFAULT_CONFIG: &str = "pose_server.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = Config::load_or_default(&config_path)?;
    let (_log_guard, _) = logging::init(&config.logging, "pose_server")?;

    info!("Pose Server ({})", env!("GIT_VERSION"));
    info!("[config] {} listen={}", config_path, config.listen_addr);
    info!(
        "[config] database={} references={}/*.{}",
        config.exercise.database_path, config.reference.directory, config.reference.extension
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))?;
    }

    let detector = PoseDetector::new(&config.model)?;
    info!("[model] {} loaded", config.model.path);

    let buffer = Arc::new(FrameBuffer::new());
    let server = Arc::new(PoseServer::new(Arc::clone(&buffer)));

    let coordinator = ExerciseCoordinator::new(
        SqliteStore::new(&config.exercise.database_path),
        config.exercise.reconnect_every,
    );
    let references = ReferenceStore::new(DirectorySource::new(
        &config.reference.directory,
        &config.reference.extension,
    ));
    let mut worker = PoseWorker::new(
        buffer,
        server.sessions(),
        detector,
        coordinator,
        references,
        config.pipeline.clone(),
        Arc::clone(&shutdown),
    );
    let worker_thread = std::thread::Builder::new()
        .name("pose-worker".to_string())
        .spawn(move || worker.run())
        .context("failed to spawn pose worker")?;

    let served = match TcpListener::bind(&config.listen_addr).await {
        Ok(listener) => server.serve(listener, Arc::clone(&shutdown)).await,
        Err(e) => Err(e).with_context(|| format!("failed to bind {}", config.listen_addr)),
    };

    // stop the worker however the server ended
    shutdown.store(true, Ordering::Relaxed);
    if worker_thread.join().is_err() {
        error!("pose worker panicked");
    }
    info!("shutdown complete");
    served
}
