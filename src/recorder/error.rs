//! Error taxonomy for the recording pipeline
//!
//! Frame-level errors are skippable: the session logs them and keeps
//! recording. Encode errors end the session's finalize attempt and are
//! surfaced in the finalize report, never retried.

use thiserror::Error;

/// A single frame could not be turned into a canonical raw frame.
///
/// Always non-fatal for the session: the frame is skipped and not counted.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The compressed payload could not be decoded as an image
    #[error("failed to decode frame payload: {0}")]
    Decode(#[from] image::ImageError),

    /// The decoded pixel layout cannot be reconciled with the canonical
    /// RGB24 output geometry
    #[error("unsupported pixel layout {layout:?}")]
    UnsupportedFormat { layout: image::ColorType },
}

/// Finalizing a session through the encoder subprocess failed.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The encoder binary could not be started at all
    #[error("failed to spawn encoder `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The encoder exited unsuccessfully; stderr is captured for diagnosis
    #[error("encoder exited with code {code:?}")]
    Exit { code: Option<i32>, stderr: String },

    /// Writing frames to the encoder's input pipe failed mid-stream
    #[error("failed streaming frames to encoder: {0}")]
    Stream(#[source] std::io::Error),
}
