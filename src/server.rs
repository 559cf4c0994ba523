//! WebSocket connection handling
//!
//! Thin layer between the transport and the recording session: binary
//! messages carry one compressed frame each, the `STOP_RECORDING` text
//! command ends the session explicitly, and a closed connection ends it
//! implicitly. The session value lives in shared state behind a mutex so
//! it survives the connection that fed it, and so frame intake for a new
//! session queues behind a finalize that is still completing.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::recorder::{FinalizeReport, FrameResult, RecordingSession};

/// Text command that ends the active session
const STOP_COMMAND: &str = "STOP_RECORDING";

#[derive(Clone)]
pub struct AppState {
    pub recorder: Arc<Mutex<RecordingSession>>,
}

/// Build the WebSocket router. Capture clients are not picky about the
/// path, so any route upgrades.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", any(ws_upgrade))
        .route("/{*path}", any(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection_task(state, socket))
}

fn is_stop_command(text: &str) -> bool {
    text.trim() == STOP_COMMAND
}

fn log_report(report: &FinalizeReport) {
    if report.success() {
        info!(
            "Session finalized: {} frames -> {:?}",
            report.frame_count, report.output_path
        );
    } else if let Some(error) = &report.error {
        warn!(
            "Session finalize failed after {} frames: {}",
            report.frame_count, error
        );
    }
}

async fn connection_task(state: AppState, mut socket: WebSocket) {
    info!("Capture client connected");

    while let Some(msg) = socket.recv().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!("WebSocket error: {}", e);
                break;
            }
        };

        match msg {
            Message::Binary(payload) => {
                let mut recorder = state.recorder.lock().await;
                if let FrameResult::Skipped { reason } = recorder.process_frame(&payload) {
                    warn!("Skipping frame: {}", reason);
                }
            }
            Message::Text(text) if is_stop_command(&text) => {
                info!("Stop command received");
                let mut recorder = state.recorder.lock().await;
                if let Some(report) = tokio::task::block_in_place(|| recorder.stop()) {
                    log_report(&report);
                }
            }
            Message::Text(text) => {
                debug!("Ignoring text message: {}", text);
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // Always attempt exactly one finalize before releasing the connection;
    // a session already stopped above makes this a no-op.
    info!("Capture client disconnected");
    let mut recorder = state.recorder.lock().await;
    if let Some(report) = tokio::task::block_in_place(|| recorder.stop()) {
        log_report(&report);
    }
}
