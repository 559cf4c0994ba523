//! screencast-receiver
//!
//! Receives a live stream of still-image frames from a capture client over
//! a persistent WebSocket connection and assembles each recording session
//! into a single playable MP4 via an external ffmpeg process.

mod config;
mod logging;
mod recorder;
mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info};

use config::Config;
use recorder::{FfmpegEncoder, FrameTransformer, RecordingSession};
use server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = logging::init_logging()?;

    info!("screencast-receiver starting...");

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded from {:?}", config.config_path()?);

    // Ensure the recording output directory exists
    std::fs::create_dir_all(&config.recording.output_directory).with_context(|| {
        format!(
            "Failed to create output directory: {:?}",
            config.recording.output_directory
        )
    })?;

    let recording = &config.recording;
    let transformer = FrameTransformer::new(recording.width, recording.height);
    let encoder = FfmpegEncoder::new(
        recording.ffmpeg_binary.clone(),
        recording.width,
        recording.height,
        recording.framerate,
    );
    let session = RecordingSession::new(
        recording.output_directory.clone(),
        transformer,
        Box::new(encoder),
    );

    let state = AppState {
        recorder: Arc::new(Mutex::new(session)),
    };

    let listener = TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(
        "Listening for capture clients on ws://{}",
        config.server.bind_addr
    );
    info!(
        "Recording {}x{} @ {} fps into {:?}",
        recording.width, recording.height, recording.framerate, recording.output_directory
    );

    let app = server::router(state.clone());
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down...");
        }
    }

    // A session still recording (hung connection, interrupted mid-stream)
    // gets its one finalize attempt before the process exits.
    let mut recorder = state.recorder.lock().await;
    if let Some(report) = tokio::task::block_in_place(|| recorder.stop()) {
        if report.success() {
            info!(
                "Final session written: {} frames -> {:?}",
                report.frame_count, report.output_path
            );
        } else {
            error!("Final session finalize failed: {:?}", report.error);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn print_help() {
    println!("screencast-receiver - Assembles streamed screen frames into video files");
    println!();
    println!("USAGE:");
    println!("    screencast-receiver [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help    Print this help message");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG      Set log level (e.g., debug, info, warn)");
    println!();
    println!("Capture clients connect over WebSocket and push one compressed frame");
    println!("per binary message; the text command STOP_RECORDING ends a session.");
}
