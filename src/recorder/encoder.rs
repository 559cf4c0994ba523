//! Encoder subprocess management
//!
//! Finalizing a session spawns one external encoder process (ffmpeg by
//! default), streams every buffered frame to its stdin as raw RGB24, closes
//! the pipe and waits for the container file to be written. The process is
//! owned for exactly one finalize call; a leftover child from an earlier
//! session is terminated before a new one is spawned so two encoders never
//! race on output files.

use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use tracing::{debug, warn};

use super::error::EncodeError;
use super::RawFrame;

/// Drives an external streaming encoder for one session at a time.
///
/// Abstracted as a trait so the session state machine stays independent of
/// the process-spawning primitive (and so tests can capture frames
/// in-memory).
pub trait VideoEncoder: Send {
    /// Encode `frames` in sequence order into a container file at
    /// `output_path`. Blocks until the encoder has exited.
    fn finalize(&mut self, frames: &[RawFrame], output_path: &Path) -> Result<(), EncodeError>;
}

/// ffmpeg invocation: raw video on stdin, H.264 in MP4 out.
pub struct FfmpegEncoder {
    binary: String,
    width: u32,
    height: u32,
    framerate: u32,
    active: Option<Child>,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<String>, width: u32, height: u32, framerate: u32) -> Self {
        Self {
            binary: binary.into(),
            width,
            height,
            framerate,
            active: None,
        }
    }

    fn build_args(&self, output_path: &Path) -> Vec<std::ffi::OsString> {
        let mut args: Vec<std::ffi::OsString> = [
            "-hide_banner",
            "-y",
            "-f",
            "rawvideo",
            "-pixel_format",
            "rgb24",
        ]
        .into_iter()
        .map(Into::into)
        .collect();
        args.push("-video_size".into());
        args.push(format!("{}x{}", self.width, self.height).into());
        args.push("-framerate".into());
        args.push(self.framerate.to_string().into());
        args.extend(["-i", "pipe:0", "-c:v", "libx264", "-pix_fmt", "yuv420p"].map(Into::into));
        args.push(output_path.into());
        args
    }

    /// Kill and reap a child left over from a previous finalize.
    ///
    /// The state machine should make this unreachable; handled anyway so a
    /// stale process can never share an output file with a fresh one.
    fn terminate_leftover(&mut self) {
        if let Some(mut leftover) = self.active.take() {
            warn!("Terminating leftover encoder process from a previous session");
            let _ = leftover.kill();
            let _ = leftover.wait();
        }
    }

    /// Write frames to the active child's stdin, stopping at the first
    /// failure. Dropping the pipe afterwards signals EOF to the encoder.
    fn stream_frames(&mut self, frames: &[RawFrame]) -> Option<std::io::Error> {
        let stdin = self.active.as_mut().and_then(|child| child.stdin.take());
        let Some(mut stdin) = stdin else {
            return None;
        };

        for frame in frames {
            if let Err(e) = stdin.write_all(&frame.data) {
                warn!(
                    "Encoder pipe failed at frame {}: {} (abandoning remaining writes)",
                    frame.index, e
                );
                return Some(e);
            }
        }
        None
    }

    fn collect_exit(&mut self, write_error: Option<std::io::Error>) -> Result<(), EncodeError> {
        let Some(child) = self.active.take() else {
            return Ok(());
        };

        let output = child.wait_with_output().map_err(EncodeError::Stream)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(EncodeError::Exit {
                code: output.status.code(),
                stderr,
            });
        }

        // Exit status 0 despite a broken pipe would hide dropped frames.
        match write_error {
            Some(e) => Err(EncodeError::Stream(e)),
            None => Ok(()),
        }
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn finalize(&mut self, frames: &[RawFrame], output_path: &Path) -> Result<(), EncodeError> {
        self.terminate_leftover();

        debug!(
            "Spawning encoder `{}` for {} frames -> {:?}",
            self.binary,
            frames.len(),
            output_path
        );

        let child = Command::new(&self.binary)
            .args(self.build_args(output_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EncodeError::Spawn {
                command: self.binary.clone(),
                source,
            })?;
        self.active = Some(child);

        let write_error = self.stream_frames(frames);
        self.collect_exit(write_error)
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.terminate_leftover();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn frames(count: usize) -> Vec<RawFrame> {
        (0..count)
            .map(|i| RawFrame {
                data: vec![i as u8; 12],
                index: i as u64,
            })
            .collect()
    }

    #[test]
    fn args_describe_raw_input_and_output_path() {
        let encoder = FfmpegEncoder::new("ffmpeg", 1920, 1080, 30);
        let args = encoder.build_args(Path::new("/tmp/out.mp4"));
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let size_at = args.iter().position(|a| a == "-video_size").expect("size");
        assert_eq!(args[size_at + 1], "1920x1080");
        let rate_at = args.iter().position(|a| a == "-framerate").expect("rate");
        assert_eq!(args[rate_at + 1], "30");
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
        // stdin is the only input
        let input_at = args.iter().position(|a| a == "-i").expect("input");
        assert_eq!(args[input_at + 1], "pipe:0");
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let mut encoder = FfmpegEncoder::new("/nonexistent/encoder-binary", 4, 2, 30);
        let err = encoder
            .finalize(&frames(1), Path::new("/tmp/out.mp4"))
            .expect_err("spawn must fail");
        assert!(matches!(err, EncodeError::Spawn { .. }));
    }

    #[test]
    fn consuming_process_with_zero_exit_succeeds() {
        // `cat` accepts everything on stdin and exits 0, standing in for a
        // well-behaved encoder.
        let mut encoder = FfmpegEncoder::new("cat", 4, 2, 30);
        let dir = tempfile::tempdir().expect("tempdir");
        let out: PathBuf = dir.path().join("out.mp4");
        encoder.finalize(&frames(3), &out).expect("finalize");
    }

    #[test]
    fn nonzero_exit_is_reported_with_code() {
        // `false` exits 1 without reading stdin; the pipe write may also
        // fail, but the exit status takes precedence in the report.
        let mut encoder = FfmpegEncoder::new("false", 4, 2, 30);
        let err = encoder
            .finalize(&frames(200), Path::new("/tmp/out.mp4"))
            .expect_err("must fail");
        match err {
            EncodeError::Exit { code, .. } => assert_eq!(code, Some(1)),
            other => panic!("expected Exit, got {other:?}"),
        }
    }
}
