//! Resilient frame source
//!
//! ## Responsibilities
//! - Keep exactly one decoder subprocess alive at a time
//! - Assemble fixed-size rgb24 frames from its stdout pipe
//! - Enforce read deadlines (generous for the first frame of a
//!   connection, tighter once the stream is flowing)
//! - Tear down and reconnect with backoff on any stream fault
//! - Hand frames to the consumer through a single-slot channel,
//!   dropping the newest frame when the consumer is busy
//!
//! Transient faults (timeouts, short reads, decoder exits) never reach
//! the consumer; the source reconnects forever. The one terminal
//! condition is a decoder binary that repeatedly cannot be spawned at
//! all, reported once through `stop()`.

mod decoder;

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Current unix time in seconds
pub fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// One decoded frame, fixed size, ownership moves to the consumer
#[derive(Debug)]
pub struct Frame {
    /// Monotonic sequence number across reconnects, starting at 1
    pub seq: u64,
    /// Unix seconds when the full buffer was assembled
    pub captured_at: f64,
    pub width: u32,
    pub height: u32,
    /// Packed rgb24, `width * height * 3` bytes
    pub data: Vec<u8>,
}

/// Why a connection was torn down
#[derive(Debug, thiserror::Error)]
pub(crate) enum StreamFault {
    #[error("decoder spawn failed: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("no data within {deadline:?} ({got}/{want} bytes)")]
    ReadTimeout {
        deadline: Duration,
        got: usize,
        want: usize,
    },
    #[error("stream ended mid-frame ({got}/{want} bytes)")]
    ShortRead { got: usize, want: usize },
    #[error("pipe read failed: {0}")]
    Read(#[source] std::io::Error),
}

/// Frame source configuration
#[derive(Debug, Clone)]
pub struct FrameSourceConfig {
    pub stream_url: String,
    /// Target spacing between sampled frames
    pub interval: Duration,
    pub width: u32,
    pub height: u32,
    /// Lower bound for the steady-state read deadline
    pub read_timeout_floor: Duration,
    /// Wait between teardown and the next connection attempt
    pub reconnect_delay: Duration,
    /// Consecutive spawn failures tolerated before the source gives up
    /// (0 = retry forever)
    pub max_spawn_failures: u32,
    /// Replaces the built-in ffmpeg invocation with a custom argv
    pub command_override: Option<Vec<String>>,
}

impl FrameSourceConfig {
    pub fn new(
        stream_url: impl Into<String>,
        interval: Duration,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            stream_url: stream_url.into(),
            interval,
            width,
            height,
            read_timeout_floor: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            max_spawn_failures: 10,
            command_override: None,
        }
    }

    /// Bytes in one rgb24 frame
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Deadline for frames after the first on a connection.
    ///
    /// Three sampling intervals of silence means the stream stalled,
    /// but never cut below the configured floor.
    pub fn steady_deadline(&self) -> Duration {
        self.read_timeout_floor.max(self.interval * 3)
    }

    /// Deadline for the first frame of a new connection, which also
    /// covers upstream connect and keyframe negotiation latency
    pub fn first_frame_deadline(&self) -> Duration {
        self.steady_deadline() * 3
    }

    fn argv(&self) -> Vec<String> {
        match &self.command_override {
            Some(argv) => argv.clone(),
            None => decoder::decoder_argv(
                &self.stream_url,
                self.interval,
                self.width,
                self.height,
                self.read_timeout_floor,
            ),
        }
    }
}

/// Counters shared between the supervision task and its owner
#[derive(Default)]
pub struct SourceStats {
    frames: AtomicU64,
    reconnects: AtomicU64,
    dropped: AtomicU64,
}

impl SourceStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the source counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Full frames assembled
    pub frames: u64,
    /// Live connections torn down and replaced
    pub reconnects: u64,
    /// Frames discarded because the consumer was busy
    pub dropped: u64,
}

/// Consumer half of the frame handoff
pub struct FrameStream {
    rx: mpsc::Receiver<Frame>,
}

impl FrameStream {
    /// Next frame, or `None` once the source has stopped or died
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }
}

/// Handle owning the supervision task
pub struct FrameSource {
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
    stats: Arc<SourceStats>,
}

impl FrameSource {
    /// Start the supervision task and return it with its frame stream.
    pub fn start(config: FrameSourceConfig) -> (Self, FrameStream) {
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let stats = Arc::new(SourceStats::default());
        let task = tokio::spawn(supervise(config, tx, stats.clone(), cancel.clone()));
        (
            Self {
                cancel,
                task: Some(task),
                stats,
            },
            FrameStream { rx },
        )
    }

    /// Stop the source and reap the decoder, whatever phase it is in.
    ///
    /// Idempotent. Returns the supervision task's result: `Ok` for a
    /// plain stop, or the terminal error if the task had already died
    /// of spawn exhaustion.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();
        match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(e) => Err(Error::Internal(format!("frame source task died: {}", e))),
            },
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        // Unblocks the task if the owner never called stop().
        self.cancel.cancel();
    }
}

/// Connection supervision loop.
///
/// Alternates between owning one live decoder connection and backing
/// off after a fault. Every phase transition is logged.
async fn supervise(
    config: FrameSourceConfig,
    tx: mpsc::Sender<Frame>,
    stats: Arc<SourceStats>,
    cancel: CancellationToken,
) -> Result<()> {
    let frame_size = config.frame_size();
    let steady = config.steady_deadline();
    let first = config.first_frame_deadline();
    let argv = config.argv();
    let mut spawn_failures: u32 = 0;
    let mut seq: u64 = 0;

    info!(
        url = %config.stream_url,
        interval_secs = config.interval.as_secs_f64(),
        frame_size,
        first_deadline_secs = first.as_secs_f64(),
        steady_deadline_secs = steady.as_secs_f64(),
        "frame source starting"
    );

    while !cancel.is_cancelled() {
        let mut conn = match decoder::StreamConnection::open(&argv).await {
            Ok(conn) => {
                spawn_failures = 0;
                conn
            }
            Err(fault) => {
                spawn_failures += 1;
                warn!(
                    error = %fault,
                    consecutive = spawn_failures,
                    "decoder spawn failed"
                );
                if config.max_spawn_failures > 0 && spawn_failures >= config.max_spawn_failures {
                    error!(
                        attempts = spawn_failures,
                        "decoder cannot be started, giving up"
                    );
                    return Err(Error::DecoderUnavailable {
                        attempts: spawn_failures,
                        last: fault.to_string(),
                    });
                }
                if backoff(&cancel, config.reconnect_delay).await {
                    return Ok(());
                }
                continue;
            }
        };

        debug!(pid = conn.pid(), "decoder started");

        // One iteration per frame until a fault ends the connection.
        loop {
            let deadline = if conn.first_frame_received() {
                steady
            } else {
                first
            };
            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                read = conn.read_frame(frame_size, deadline) => Some(read),
            };
            let read = match outcome {
                Some(read) => read,
                None => {
                    conn.close().await;
                    return Ok(());
                }
            };

            match read {
                Ok(data) => {
                    seq += 1;
                    stats.frames.fetch_add(1, Ordering::Relaxed);
                    let frame = Frame {
                        seq,
                        captured_at: unix_now(),
                        width: config.width,
                        height: config.height,
                        data,
                    };
                    match tx.try_send(frame) {
                        Ok(()) => {}
                        Err(TrySendError::Full(frame)) => {
                            stats.dropped.fetch_add(1, Ordering::Relaxed);
                            debug!(seq = frame.seq, "consumer busy, frame dropped");
                        }
                        Err(TrySendError::Closed(_)) => {
                            info!("frame consumer gone, stopping");
                            conn.close().await;
                            return Ok(());
                        }
                    }
                }
                Err(fault) => {
                    warn!(
                        fault = %fault,
                        backoff_ms = config.reconnect_delay.as_millis() as u64,
                        "stream fault, tearing down connection"
                    );
                    conn.close().await;
                    stats.reconnects.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }
        }

        if backoff(&cancel, config.reconnect_delay).await {
            return Ok(());
        }
        info!(url = %config.stream_url, "reconnecting to stream");
    }

    Ok(())
}

/// Wait out the backoff delay; true if cancelled during the wait
async fn backoff(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
