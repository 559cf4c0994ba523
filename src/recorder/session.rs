//! Recording session state machine
//!
//! A session is the bounded unit of work from first frame to finalize and
//! produces exactly one output file. Frames arrive strictly in message
//! order; a frame that fails to decode or normalize is skipped without
//! ending the session. Stop hands the buffered sequence to the encoder
//! synchronously and returns to idle whether or not encoding succeeded.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Local;
use tracing::{debug, error, info, warn};

use super::encoder::VideoEncoder;
use super::error::EncodeError;
use super::transform::{decode_frame, FrameTransformer};
use super::{FrameResult, RawFrame};

/// Progress is logged every this many accepted frames
const PROGRESS_LOG_INTERVAL: u64 = 100;

#[derive(Debug)]
enum SessionState {
    Idle,
    Recording {
        output_path: PathBuf,
        started_at: Instant,
    },
}

/// Result of one finalize attempt, reported to whoever triggered the stop.
#[derive(Debug)]
pub struct FinalizeReport {
    /// Frames handed to the encoder, in arrival order
    pub frame_count: u64,
    /// Where the container file was written (possibly partially, on error)
    pub output_path: PathBuf,
    /// Present when the encoder failed; never retried
    pub error: Option<EncodeError>,
}

impl FinalizeReport {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// The per-session recording state machine and frame buffer.
///
/// Owns start/stop semantics and frame counting. All mutating calls must be
/// serialized by the caller (the connection handler holds it behind a
/// mutex); the session itself is single-threaded by construction.
pub struct RecordingSession {
    output_dir: PathBuf,
    transformer: FrameTransformer,
    encoder: Box<dyn VideoEncoder>,
    state: SessionState,
    frames: Vec<RawFrame>,
    frame_count: u64,
}

impl RecordingSession {
    pub fn new(
        output_dir: PathBuf,
        transformer: FrameTransformer,
        encoder: Box<dyn VideoEncoder>,
    ) -> Self {
        Self {
            output_dir,
            transformer,
            encoder,
            state: SessionState::Idle,
            frames: Vec::new(),
            frame_count: 0,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, SessionState::Recording { .. })
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Begin a new session. Idempotent: a no-op while already recording,
    /// preserving the count and buffered frames.
    pub fn start(&mut self) {
        if self.is_recording() {
            debug!("Recording already started");
            return;
        }

        // Second-granularity timestamp; two starts within the same second
        // share a path. The log line makes a collision visible.
        let output_path = self.output_dir.join(format!(
            "screen_recording_{}.mp4",
            Local::now().format("%Y%m%d_%H%M%S")
        ));
        info!("Recording started: {:?}", output_path);

        self.frames.clear();
        self.frame_count = 0;
        self.state = SessionState::Recording {
            output_path,
            started_at: Instant::now(),
        };
    }

    /// Feed one inbound binary payload. The first frame after idle starts a
    /// session implicitly, matching a capture client that never sends an
    /// explicit start.
    pub fn process_frame(&mut self, payload: &[u8]) -> FrameResult {
        if !self.is_recording() {
            self.start();
        }

        let frame = match decode_frame(payload).and_then(|decoded| {
            self.transformer.transform(decoded)
        }) {
            Ok(data) => data,
            Err(reason) => return FrameResult::Skipped { reason },
        };

        self.frames.push(RawFrame {
            data: frame,
            index: self.frame_count,
        });
        self.frame_count += 1;

        if self.frame_count % PROGRESS_LOG_INTERVAL == 0 {
            info!("Captured {} frames", self.frame_count);
        }

        FrameResult::Accepted {
            frame_count: self.frame_count,
        }
    }

    /// End the session and finalize the buffered frames into the output
    /// file. Returns `None` when already idle, so a second stop in a row is
    /// a no-op. The session returns to idle regardless of encoder success;
    /// a failed finalize leaves any partial output file on disk.
    pub fn stop(&mut self) -> Option<FinalizeReport> {
        let SessionState::Recording {
            output_path,
            started_at,
        } = std::mem::replace(&mut self.state, SessionState::Idle)
        else {
            debug!("No recording in progress");
            return None;
        };

        let frames = std::mem::take(&mut self.frames);
        let frame_count = self.frame_count;
        self.frame_count = 0;

        info!(
            "Stopping recording: {} frames over {:.1}s -> {:?}",
            frame_count,
            started_at.elapsed().as_secs_f64(),
            output_path
        );

        let error = match self.encoder.finalize(&frames, &output_path) {
            Ok(()) => {
                info!("Recording finished: {} frames, {:?}", frame_count, output_path);
                None
            }
            Err(e) => {
                error!("Finalize failed for {:?}: {}", output_path, e);
                Some(e)
            }
        };

        Some(FinalizeReport {
            frame_count,
            output_path,
            error,
        })
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.is_recording() {
            warn!("Recording session dropped while active; finalizing");
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// Captures finalize calls in-memory in place of a subprocess.
    struct MockEncoder {
        calls: Arc<Mutex<Vec<(Vec<RawFrame>, PathBuf)>>>,
        fail_with_code: Option<i32>,
    }

    impl MockEncoder {
        fn new() -> (Self, Arc<Mutex<Vec<(Vec<RawFrame>, PathBuf)>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    calls: calls.clone(),
                    fail_with_code: None,
                },
                calls,
            )
        }

        fn failing(code: i32) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                fail_with_code: Some(code),
            }
        }
    }

    impl VideoEncoder for MockEncoder {
        fn finalize(
            &mut self,
            frames: &[RawFrame],
            output_path: &Path,
        ) -> Result<(), EncodeError> {
            self.calls
                .lock()
                .expect("mock lock")
                .push((frames.to_vec(), output_path.to_path_buf()));
            match self.fail_with_code {
                Some(code) => Err(EncodeError::Exit {
                    code: Some(code),
                    stderr: String::new(),
                }),
                None => Ok(()),
            }
        }
    }

    fn session_with(encoder: Box<dyn VideoEncoder>) -> RecordingSession {
        RecordingSession::new(
            PathBuf::from("/tmp/recordings"),
            FrameTransformer::new(16, 9),
            encoder,
        )
    }

    fn valid_payload(shade: u8) -> Vec<u8> {
        let image = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            32,
            18,
            image::Rgb([shade, shade, shade]),
        ));
        let mut buf = Cursor::new(Vec::new());
        image
            .write_to(&mut buf, image::ImageFormat::Png)
            .expect("encode payload");
        buf.into_inner()
    }

    #[test]
    fn frames_then_stop_reports_count_and_preserves_order() {
        let (encoder, calls) = MockEncoder::new();
        let mut session = session_with(Box::new(encoder));

        for i in 0..5u8 {
            assert!(matches!(
                session.process_frame(&valid_payload(i * 10)),
                FrameResult::Accepted { .. }
            ));
        }
        let report = session.stop().expect("report");
        assert!(report.success());
        assert_eq!(report.frame_count, 5);

        let calls = calls.lock().expect("calls");
        assert_eq!(calls.len(), 1, "encoder invoked exactly once");
        let (frames, path) = &calls[0];
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index, i as u64);
            // Shade survives normalization, proving arrival order
            assert_eq!(frame.data[0], (i as u8) * 10);
        }
        assert_eq!(path, &report.output_path);
    }

    #[test]
    fn first_frame_starts_a_session() {
        let (encoder, _) = MockEncoder::new();
        let mut session = session_with(Box::new(encoder));
        assert!(!session.is_recording());
        session.process_frame(&valid_payload(1));
        assert!(session.is_recording());
        assert_eq!(session.frame_count(), 1);
    }

    #[test]
    fn undecodable_payload_is_skipped_not_counted() {
        let (encoder, calls) = MockEncoder::new();
        let mut session = session_with(Box::new(encoder));

        session.process_frame(&valid_payload(1));
        assert!(matches!(
            session.process_frame(b"garbage"),
            FrameResult::Skipped { .. }
        ));
        assert!(session.is_recording(), "skip must not end the session");
        session.process_frame(&valid_payload(2));

        let report = session.stop().expect("report");
        assert_eq!(report.frame_count, 2);
        assert_eq!(calls.lock().expect("calls")[0].0.len(), 2);
    }

    #[test]
    fn start_is_idempotent() {
        let (encoder, _) = MockEncoder::new();
        let mut session = session_with(Box::new(encoder));

        session.start();
        session.process_frame(&valid_payload(1));
        session.process_frame(&valid_payload(2));
        session.start();
        assert_eq!(session.frame_count(), 2, "start must not reset the count");

        let report = session.stop().expect("report");
        assert_eq!(report.frame_count, 2);
    }

    #[test]
    fn stop_twice_is_a_noop_the_second_time() {
        let (encoder, calls) = MockEncoder::new();
        let mut session = session_with(Box::new(encoder));

        session.process_frame(&valid_payload(1));
        assert!(session.stop().is_some());
        assert!(session.stop().is_none());
        assert_eq!(calls.lock().expect("calls").len(), 1);
    }

    #[test]
    fn encoder_failure_is_reported_not_retried() {
        let mut session = session_with(Box::new(MockEncoder::failing(1)));

        session.process_frame(&valid_payload(1));
        let report = session.stop().expect("report");
        assert!(!report.success());
        match report.error {
            Some(EncodeError::Exit { code, .. }) => assert_eq!(code, Some(1)),
            other => panic!("expected Exit error, got {other:?}"),
        }
        assert!(!session.is_recording(), "session returns to idle on failure");
    }

    #[test]
    fn buffer_is_cleared_between_sessions() {
        let (encoder, calls) = MockEncoder::new();
        let mut session = session_with(Box::new(encoder));

        session.process_frame(&valid_payload(1));
        session.process_frame(&valid_payload(2));
        session.stop();

        session.process_frame(&valid_payload(3));
        let report = session.stop().expect("report");
        assert_eq!(report.frame_count, 1);

        let calls = calls.lock().expect("calls");
        assert_eq!(calls[1].0.len(), 1, "second session starts empty");
    }

    #[test]
    fn output_path_is_timestamped_in_output_dir() {
        let (encoder, _) = MockEncoder::new();
        let mut session = session_with(Box::new(encoder));

        session.process_frame(&valid_payload(1));
        let report = session.stop().expect("report");

        assert_eq!(report.output_path.parent(), Some(Path::new("/tmp/recordings")));
        let name = report
            .output_path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("file name");
        assert!(name.starts_with("screen_recording_"));
        assert!(name.ends_with(".mp4"));
        // screen_recording_YYYYMMDD_HHMMSS.mp4
        assert_eq!(name.len(), "screen_recording_".len() + 15 + ".mp4".len());
    }
}
