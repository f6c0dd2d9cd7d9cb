//! Decoder subprocess management
//!
//! One `StreamConnection` wraps one spawned decoder process and its
//! stdout pipe. The supervision loop in the parent module owns at most
//! one live connection at a time and replaces it on any fault.

use super::StreamFault;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

/// Build the default ffmpeg invocation for a live stream.
///
/// The decoder resamples to one frame per `interval`, scales to the
/// fixed output size and writes back-to-back raw rgb24 buffers to
/// stdout. `-rw_timeout` makes ffmpeg itself give up on a dead
/// network source instead of blocking forever inside a read.
pub(crate) fn decoder_argv(
    url: &str,
    interval: Duration,
    width: u32,
    height: u32,
    rw_timeout: Duration,
) -> Vec<String> {
    vec![
        "ffmpeg".to_string(),
        "-rw_timeout".to_string(),
        rw_timeout.as_micros().to_string(),
        "-i".to_string(),
        url.to_string(),
        "-an".to_string(),
        "-vf".to_string(),
        format!("fps=1/{},scale={}:{}", interval.as_secs_f64(), width, height),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-".to_string(),
    ]
}

/// One live decoder process plus its output pipe
pub(crate) struct StreamConnection {
    child: Child,
    stdout: ChildStdout,
    first_frame_received: bool,
}

impl StreamConnection {
    /// Spawn the decoder and capture its stdout.
    ///
    /// stderr goes to null: decoder diagnostics are not parsed, and an
    /// inherited pipe would fill up and stall the child. kill_on_drop
    /// backstops cleanup if the connection is dropped without `close`.
    pub(crate) async fn open(argv: &[String]) -> Result<Self, StreamFault> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            StreamFault::Spawn(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty decoder command",
            ))
        })?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(StreamFault::Spawn)?;

        let stdout = child.stdout.take().ok_or_else(|| {
            StreamFault::Spawn(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "decoder stdout not captured",
            ))
        })?;

        Ok(Self {
            child,
            stdout,
            first_frame_received: false,
        })
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub(crate) fn first_frame_received(&self) -> bool {
        self.first_frame_received
    }

    /// Read exactly one frame of `frame_size` bytes.
    ///
    /// The pipe is read in whatever chunks the kernel delivers; each
    /// chunk must arrive within `deadline`. A zero-byte read before the
    /// buffer fills means the decoder exited or truncated a frame, and
    /// the connection is no longer usable either way.
    pub(crate) async fn read_frame(
        &mut self,
        frame_size: usize,
        deadline: Duration,
    ) -> Result<Vec<u8>, StreamFault> {
        let mut buf = vec![0u8; frame_size];
        let mut filled = 0;

        while filled < frame_size {
            let read = tokio::time::timeout(deadline, self.stdout.read(&mut buf[filled..])).await;
            let n = match read {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(StreamFault::Read(e)),
                Err(_) => {
                    return Err(StreamFault::ReadTimeout {
                        deadline,
                        got: filled,
                        want: frame_size,
                    })
                }
            };
            if n == 0 {
                return Err(StreamFault::ShortRead {
                    got: filled,
                    want: frame_size,
                });
            }
            filled += n;
        }

        self.first_frame_received = true;
        Ok(buf)
    }

    /// Kill the decoder and reap it so no zombie is left behind.
    pub(crate) async fn close(mut self) {
        // start_kill fails if the process already exited on its own.
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "decoder kill skipped");
        }
        match self.child.wait().await {
            Ok(status) => debug!(status = %status, "decoder process reaped"),
            Err(e) => debug!(error = %e, "decoder wait failed"),
        }
    }
}
