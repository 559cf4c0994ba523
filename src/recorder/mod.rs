//! Frame ingestion and encoding pipeline
//!
//! One `RecordingSession` at a time turns a stream of compressed frame
//! payloads into a single video file: decode, normalize to the canonical
//! geometry, buffer in arrival order, then hand the whole sequence to an
//! external encoder process on stop.

mod encoder;
mod error;
mod session;
mod transform;

pub use encoder::{FfmpegEncoder, VideoEncoder};
pub use error::{EncodeError, FrameError};
pub use session::{FinalizeReport, RecordingSession};
pub use transform::{decode_frame, FrameTransformer};

/// A normalized frame ready for the encoder: canonical width × height × 3
/// bytes of RGB24, immutable once produced.
#[derive(Clone)]
pub struct RawFrame {
    /// Pixel data in the canonical layout
    pub data: Vec<u8>,
    /// Zero-based position in the session's frame sequence
    pub index: u64,
}

/// Outcome of feeding one inbound payload to the session
#[derive(Debug)]
pub enum FrameResult {
    /// Frame was decoded, normalized and buffered
    Accepted {
        /// Frames buffered so far, this one included
        frame_count: u64,
    },
    /// Frame could not be used; the session keeps recording
    Skipped { reason: FrameError },
}
