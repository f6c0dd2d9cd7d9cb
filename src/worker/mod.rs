//! Worker orchestration
//!
//! ## Responsibilities
//! - Own the single processing loop: frames in, completed sessions out
//! - Gate classification behind the motion score and a cooldown
//! - JPEG-encode frames off the async runtime
//! - Dispatch completed sessions to log, store and notifier, isolating
//!   each downstream failure
//! - Flush open sessions on shutdown
//!
//! The loop is the sole owner of the tracker and the motion detector,
//! so no other mutual exclusion is needed. Slow classification calls
//! never stall frame production; the source drops frames instead.

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::frame_source::{unix_now, Frame, FrameSource, FrameSourceConfig};
use crate::motion_detector::MotionDetector;
use crate::notifier::Notifier;
use crate::session_store::SessionStore;
use crate::session_tracker::{FrameStamp, Session, SessionTracker};
use crate::vision_client::{SubjectProfile, VisionClient};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const JPEG_QUALITY: u8 = 85;

/// Encode one packed rgb24 buffer as JPEG. The buffer length must be
/// exactly `width * height * 3`; the encoder panics on a mismatch, so
/// short or oversized buffers are rejected here instead.
pub(crate) fn encode_jpeg(data: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    let expected = width as usize * height as usize * 3;
    if data.len() != expected {
        return Err(Error::Internal(format!(
            "jpeg encode expected {} bytes for {}x{} rgb24, got {}",
            expected,
            width,
            height,
            data.len()
        )));
    }
    let mut out = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode(data, width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| Error::Internal(format!("jpeg encode failed: {}", e)))?;
    Ok(out)
}

/// Idle sweeps run at a quarter of the idle timeout, at least every second.
fn sweep_period(idle_timeout_secs: u64) -> Duration {
    Duration::from_secs((idle_timeout_secs / 4).max(1))
}

pub struct Worker {
    settings: Settings,
    subjects: Vec<SubjectProfile>,
    tracker: SessionTracker,
    detector: MotionDetector,
    vision: VisionClient,
    notifier: Notifier,
    store: SessionStore,
    last_classify_at: f64,
}

impl Worker {
    pub fn new(settings: Settings, subjects: Vec<SubjectProfile>) -> Self {
        let tracker = SessionTracker::new(settings.idle_timeout());
        let vision = VisionClient::new(settings.vision_url.clone());
        let notifier = Notifier::new(settings.webhook_url.clone());
        let store = SessionStore::new(settings.store_url.clone());

        Self {
            settings,
            subjects,
            tracker,
            detector: MotionDetector::new(),
            vision,
            notifier,
            store,
            last_classify_at: 0.0,
        }
    }

    /// Run until the stream dies terminally or a shutdown signal arrives.
    pub async fn run(mut self) -> Result<()> {
        let mut config = FrameSourceConfig::new(
            self.settings.stream_url.clone(),
            Duration::from_secs(self.settings.frame_interval_secs),
            self.settings.capture_width,
            self.settings.capture_height,
        );
        config.read_timeout_floor = Duration::from_secs(self.settings.read_timeout_secs);
        config.reconnect_delay = self.settings.reconnect_delay();
        config.max_spawn_failures = self.settings.max_spawn_failures;

        let (mut source, mut stream) = FrameSource::start(config);

        let mut sweep = tokio::time::interval(sweep_period(self.settings.idle_timeout_secs));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            subjects = self.subjects.len(),
            idle_timeout_secs = self.settings.idle_timeout_secs,
            motion_threshold = self.settings.motion_threshold,
            classify_cooldown_secs = self.settings.classify_cooldown_secs,
            "worker loop starting"
        );

        loop {
            tokio::select! {
                maybe_frame = stream.recv() => {
                    match maybe_frame {
                        Some(frame) => self.handle_frame(frame).await,
                        None => {
                            warn!("frame stream ended");
                            break;
                        }
                    }
                }
                _ = sweep.tick() => {
                    let completed = self.tracker.sweep_idle(unix_now());
                    self.dispatch(completed, "idle timeout").await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        let stop_result = source.stop().await;

        // Force-close whatever is still open so nothing is lost.
        let completed = self.tracker.sweep_idle(f64::INFINITY);
        self.dispatch(completed, "shutdown flush").await;

        let stats = source.stats();
        info!(
            frames = stats.frames,
            reconnects = stats.reconnects,
            dropped = stats.dropped,
            "worker stopped"
        );

        stop_result
    }

    async fn handle_frame(&mut self, frame: Frame) {
        // Scored on every frame so the diff baseline keeps advancing.
        let score = self.detector.score(&frame.data);
        if !self.should_classify(score, frame.captured_at) {
            return;
        }

        debug!(seq = frame.seq, score, "motion above threshold, classifying");

        let width = frame.width;
        let height = frame.height;
        let data = frame.data;
        let encoded =
            tokio::task::spawn_blocking(move || encode_jpeg(&data, width, height, JPEG_QUALITY))
                .await;
        let jpeg = match encoded {
            Ok(Ok(jpeg)) => jpeg,
            Ok(Err(e)) => {
                warn!(error = %e, seq = frame.seq, "frame encode failed");
                return;
            }
            Err(e) => {
                warn!(error = %e, seq = frame.seq, "encode task failed");
                return;
            }
        };

        let response = match self
            .vision
            .classify(jpeg, frame.captured_at, &self.subjects)
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, seq = frame.seq, "classification failed");
                return;
            }
        };

        debug!(
            seq = frame.seq,
            present = response.present,
            subjects = response.subjects.len(),
            confidence = response.confidence,
            "classification result"
        );

        let judgments = response.judgments();
        if judgments.is_empty() {
            return;
        }

        let stamp = FrameStamp {
            seq: frame.seq,
            captured_at: frame.captured_at,
        };
        let completed =
            self.tracker
                .observe(&judgments, frame.captured_at, Some(stamp), Some(score));
        self.dispatch(completed, "activity switch").await;
    }

    /// Motion threshold plus classification cooldown, both in the
    /// frame's own time domain. Updates the cooldown clock when it
    /// answers yes.
    fn should_classify(&mut self, score: u32, at: f64) -> bool {
        if score <= self.settings.motion_threshold {
            return false;
        }
        if at - self.last_classify_at < self.settings.classify_cooldown() {
            debug!(score, "motion within cooldown window, skipping");
            return false;
        }
        self.last_classify_at = at;
        true
    }

    async fn dispatch(&self, sessions: Vec<Session>, cause: &str) {
        for session in sessions {
            info!(
                subject = %session.subject,
                activity = %session.activity,
                duration_secs = session.duration_secs(),
                frames = session.frame_count(),
                cause,
                "session completed"
            );

            if self.store.enabled() {
                match self.store.save(&session).await {
                    Ok(id) => debug!(record_id = %id, "session stored"),
                    Err(e) => {
                        warn!(error = %e, subject = %session.subject, "session store failed")
                    }
                }
            }

            if self.notifier.enabled() {
                if let Err(e) = self.notifier.send_session_alert(&session).await {
                    warn!(error = %e, subject = %session.subject, "session alert failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_settings() -> Settings {
        Settings {
            stream_url: "rtmp://example/live".to_string(),
            vision_url: "http://127.0.0.1:9".to_string(),
            frame_interval_secs: 2,
            capture_width: 4,
            capture_height: 2,
            read_timeout_secs: 30,
            reconnect_delay_secs: 5,
            max_spawn_failures: 10,
            idle_timeout_secs: 120,
            motion_threshold: 500,
            classify_cooldown_secs: 30,
            subjects_file: PathBuf::from("subjects.json"),
            webhook_url: String::new(),
            store_url: String::new(),
        }
    }

    #[test]
    fn test_encode_jpeg_produces_jpeg() {
        let data: Vec<u8> = (0..24).map(|i| (i * 10) as u8).collect();
        let jpeg = encode_jpeg(&data, 4, 2, JPEG_QUALITY).unwrap();
        assert!(jpeg.len() > 2);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_jpeg_rejects_wrong_buffer_size() {
        assert!(encode_jpeg(&[0u8; 10], 4, 2, JPEG_QUALITY).is_err());
        assert!(encode_jpeg(&[0u8; 25], 4, 2, JPEG_QUALITY).is_err());
    }

    #[test]
    fn test_should_classify_requires_motion_above_threshold() {
        let mut worker = Worker::new(test_settings(), Vec::new());
        assert!(!worker.should_classify(0, 1000.0));
        assert!(!worker.should_classify(500, 1000.0));
        assert!(worker.should_classify(501, 1000.0));
    }

    #[test]
    fn test_should_classify_enforces_cooldown() {
        let mut worker = Worker::new(test_settings(), Vec::new());
        assert!(worker.should_classify(1000, 1000.0));
        assert!(!worker.should_classify(1000, 1010.0));
        assert!(!worker.should_classify(1000, 1029.9));
        assert!(worker.should_classify(1000, 1030.0));
    }

    #[test]
    fn test_sweep_period_is_quarter_of_idle_timeout() {
        assert_eq!(sweep_period(120), Duration::from_secs(30));
        assert_eq!(sweep_period(60), Duration::from_secs(15));
        assert_eq!(sweep_period(2), Duration::from_secs(1));
        assert_eq!(sweep_period(0), Duration::from_secs(1));
    }
}
