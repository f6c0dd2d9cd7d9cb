//! Per-subject activity session tracking
//!
//! ## Responsibilities
//! - Fold noisy per-frame activity judgments into discrete sessions
//! - Keep at most one open session per subject at any time
//! - Close sessions on activity switch or idle timeout and hand them
//!   to the caller immediately
//!
//! All timestamps are caller-supplied unix seconds. The tracker never
//! reads a clock itself, so the same code drives live operation and
//! offline replay. Sweeping with `f64::INFINITY` force-flushes every
//! open session.

use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Activity kinds reported by the vision service
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    Eating,
    Drinking,
    /// Subject is visible but not engaged. Keeps an open session alive,
    /// never starts one.
    Present,
}

impl Activity {
    pub fn opens_session(self) -> bool {
        !matches!(self, Activity::Present)
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Activity::Eating => write!(f, "eating"),
            Activity::Drinking => write!(f, "drinking"),
            Activity::Present => write!(f, "present"),
        }
    }
}

/// One per-subject observation extracted from a classification response
#[derive(Debug, Clone, PartialEq)]
pub struct Judgment {
    pub subject: String,
    pub activity: Activity,
}

impl Judgment {
    pub fn new(subject: impl Into<String>, activity: Activity) -> Self {
        Self {
            subject: subject.into(),
            activity,
        }
    }
}

/// Metadata for one sampled frame attached to a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameStamp {
    /// Sequence number assigned by the frame source
    pub seq: u64,
    /// Capture time, unix seconds
    pub captured_at: f64,
}

/// A bounded episode of one activity by one subject
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub subject: String,
    pub activity: Activity,
    pub started_at: f64,
    pub last_seen_at: f64,
    /// Frames observed while the session was open, in arrival order
    pub frames: Vec<FrameStamp>,
    /// Running maximum of the motion score across the session
    pub max_change_score: Option<u32>,
}

impl Session {
    pub fn duration_secs(&self) -> f64 {
        self.last_seen_at - self.started_at
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

/// Tracks open sessions for all subjects
///
/// Owned by a single caller. Completed sessions are returned from
/// `observe` (activity switches) and `sweep_idle` (timeouts), never
/// buffered internally.
pub struct SessionTracker {
    idle_timeout: f64,
    open: HashMap<String, Session>,
}

impl SessionTracker {
    pub fn new(idle_timeout: f64) -> Self {
        Self {
            idle_timeout,
            open: HashMap::new(),
        }
    }

    /// Apply one batch of judgments observed at `at`.
    ///
    /// All judgments in the batch come from the same frame; `frame` and
    /// `change_score` apply to every subject the batch names. Returns
    /// sessions closed by an activity switch.
    pub fn observe(
        &mut self,
        judgments: &[Judgment],
        at: f64,
        frame: Option<FrameStamp>,
        change_score: Option<u32>,
    ) -> Vec<Session> {
        let mut completed = Vec::new();

        for judgment in judgments {
            let subject = judgment.subject.trim();
            if subject.is_empty() {
                warn!("dropping judgment with empty subject name");
                continue;
            }

            match self.open.get_mut(subject) {
                Some(session) if session.activity == judgment.activity => {
                    session.last_seen_at = session.last_seen_at.max(at);
                    if let Some(stamp) = frame {
                        session.frames.push(stamp);
                    }
                    if let Some(score) = change_score {
                        session.max_change_score =
                            Some(session.max_change_score.map_or(score, |m| m.max(score)));
                    }
                    debug!(
                        subject = %subject,
                        activity = %session.activity,
                        last_seen_at = at,
                        "session extended"
                    );
                    continue;
                }
                Some(session) if judgment.activity == Activity::Present => {
                    // Keepalive only: no frame, no score, activity unchanged.
                    session.last_seen_at = session.last_seen_at.max(at);
                    debug!(
                        subject = %subject,
                        activity = %session.activity,
                        "presence keeps session alive"
                    );
                    continue;
                }
                _ => {}
            }

            // A different active kind ends the current session here.
            if let Some(finished) = self.open.remove(subject) {
                info!(
                    subject = %finished.subject,
                    activity = %finished.activity,
                    duration_secs = finished.duration_secs(),
                    frames = finished.frame_count(),
                    "session closed by activity switch"
                );
                completed.push(finished);
            }

            if !judgment.activity.opens_session() {
                continue;
            }

            let mut frames = Vec::new();
            if let Some(stamp) = frame {
                frames.push(stamp);
            }
            let session = Session {
                subject: subject.to_string(),
                activity: judgment.activity,
                started_at: at,
                last_seen_at: at,
                frames,
                max_change_score: change_score,
            };
            info!(
                subject = %subject,
                activity = %session.activity,
                started_at = at,
                "session opened"
            );
            self.open.insert(subject.to_string(), session);
        }

        completed
    }

    /// Close every session whose subject has been silent longer than the
    /// idle timeout. `now` comes from the caller; passing `f64::INFINITY`
    /// flushes everything.
    pub fn sweep_idle(&mut self, now: f64) -> Vec<Session> {
        let expired: Vec<String> = self
            .open
            .iter()
            .filter(|(_, session)| now - session.last_seen_at > self.idle_timeout)
            .map(|(subject, _)| subject.clone())
            .collect();

        let mut completed = Vec::new();
        for subject in expired {
            if let Some(finished) = self.open.remove(&subject) {
                info!(
                    subject = %finished.subject,
                    activity = %finished.activity,
                    duration_secs = finished.duration_secs(),
                    frames = finished.frame_count(),
                    "session closed by idle timeout"
                );
                completed.push(finished);
            }
        }
        completed
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn open_session(&self, subject: &str) -> Option<&Session> {
        self.open.get(subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eating(subject: &str) -> Judgment {
        Judgment::new(subject, Activity::Eating)
    }

    fn drinking(subject: &str) -> Judgment {
        Judgment::new(subject, Activity::Drinking)
    }

    fn present(subject: &str) -> Judgment {
        Judgment::new(subject, Activity::Present)
    }

    #[test]
    fn test_eating_opens_session() {
        let mut tracker = SessionTracker::new(60.0);

        let completed = tracker.observe(&[eating("mochi")], 100.0, None, None);

        assert!(completed.is_empty());
        let open = tracker.open_session("mochi").unwrap();
        assert_eq!(open.activity, Activity::Eating);
        assert_eq!(open.started_at, 100.0);
        assert_eq!(open.last_seen_at, 100.0);
    }

    #[test]
    fn test_present_alone_never_opens() {
        let mut tracker = SessionTracker::new(60.0);

        let completed = tracker.observe(&[present("mochi")], 100.0, None, None);

        assert!(completed.is_empty());
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn test_same_activity_extends() {
        let mut tracker = SessionTracker::new(60.0);
        let f1 = FrameStamp { seq: 1, captured_at: 100.0 };
        let f2 = FrameStamp { seq: 2, captured_at: 130.0 };

        tracker.observe(&[eating("mochi")], 100.0, Some(f1), Some(10));
        let completed = tracker.observe(&[eating("mochi")], 130.0, Some(f2), Some(5));

        assert!(completed.is_empty());
        let open = tracker.open_session("mochi").unwrap();
        assert_eq!(open.started_at, 100.0);
        assert_eq!(open.last_seen_at, 130.0);
        assert_eq!(open.frames, vec![f1, f2]);
        assert_eq!(open.max_change_score, Some(10));
    }

    #[test]
    fn test_change_score_keeps_running_maximum() {
        let mut tracker = SessionTracker::new(60.0);

        tracker.observe(&[eating("mochi")], 100.0, None, Some(10));
        tracker.observe(&[eating("mochi")], 110.0, None, Some(42));
        tracker.observe(&[eating("mochi")], 120.0, None, None);

        let open = tracker.open_session("mochi").unwrap();
        assert_eq!(open.max_change_score, Some(42));
    }

    #[test]
    fn test_present_extends_without_recording_frame() {
        let mut tracker = SessionTracker::new(60.0);
        let f1 = FrameStamp { seq: 1, captured_at: 100.0 };
        let f2 = FrameStamp { seq: 2, captured_at: 150.0 };

        tracker.observe(&[eating("mochi")], 100.0, Some(f1), None);
        let completed = tracker.observe(&[present("mochi")], 150.0, Some(f2), Some(99));

        assert!(completed.is_empty());
        let open = tracker.open_session("mochi").unwrap();
        assert_eq!(open.activity, Activity::Eating);
        assert_eq!(open.last_seen_at, 150.0);
        assert_eq!(open.frames, vec![f1]);
        assert_eq!(open.max_change_score, None);
    }

    #[test]
    fn test_activity_switch_emits_old_and_opens_new() {
        let mut tracker = SessionTracker::new(60.0);

        tracker.observe(&[eating("mochi")], 100.0, None, None);
        let completed = tracker.observe(&[drinking("mochi")], 110.0, None, None);

        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].activity, Activity::Eating);
        assert_eq!(completed[0].started_at, 100.0);
        assert_eq!(completed[0].last_seen_at, 100.0);

        assert_eq!(tracker.open_count(), 1);
        let open = tracker.open_session("mochi").unwrap();
        assert_eq!(open.activity, Activity::Drinking);
        assert_eq!(open.started_at, 110.0);
        assert_eq!(open.last_seen_at, 110.0);
    }

    #[test]
    fn test_idle_sweep_respects_timeout() {
        let mut tracker = SessionTracker::new(60.0);

        tracker.observe(&[eating("mochi")], 100.0, None, None);
        assert!(tracker.sweep_idle(115.0).is_empty());

        tracker.observe(&[eating("mochi")], 160.0, None, None);
        let completed = tracker.sweep_idle(230.0);

        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].started_at, 100.0);
        assert_eq!(completed[0].last_seen_at, 160.0);
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn test_idle_sweep_boundary_is_strict() {
        let mut tracker = SessionTracker::new(60.0);
        tracker.observe(&[eating("mochi")], 100.0, None, None);

        assert!(tracker.sweep_idle(160.0).is_empty());
        assert_eq!(tracker.sweep_idle(160.5).len(), 1);
    }

    #[test]
    fn test_multiple_subjects_tracked_independently() {
        let mut tracker = SessionTracker::new(60.0);

        let completed = tracker.observe(&[eating("mochi"), drinking("tora")], 100.0, None, None);
        assert!(completed.is_empty());
        assert_eq!(tracker.open_count(), 2);

        let mut completed = tracker.sweep_idle(200.0);
        completed.sort_by(|a, b| a.subject.cmp(&b.subject));
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].subject, "mochi");
        assert_eq!(completed[0].activity, Activity::Eating);
        assert_eq!(completed[1].subject, "tora");
        assert_eq!(completed[1].activity, Activity::Drinking);
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn test_infinite_sweep_flushes_all_open_sessions() {
        let mut tracker = SessionTracker::new(60.0);
        tracker.observe(&[eating("mochi"), drinking("tora")], 100.0, None, None);

        let completed = tracker.sweep_idle(f64::INFINITY);

        assert_eq!(completed.len(), 2);
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn test_empty_subject_is_dropped() {
        let mut tracker = SessionTracker::new(60.0);

        let completed = tracker.observe(&[Judgment::new("  ", Activity::Eating)], 100.0, None, None);

        assert!(completed.is_empty());
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn test_at_most_one_open_session_per_subject() {
        let mut tracker = SessionTracker::new(60.0);

        tracker.observe(&[eating("mochi")], 100.0, None, None);
        tracker.observe(&[drinking("mochi")], 110.0, None, None);
        tracker.observe(&[eating("mochi")], 120.0, None, None);

        assert_eq!(tracker.open_count(), 1);
    }

    #[test]
    fn test_out_of_order_timestamp_never_rewinds_last_seen() {
        let mut tracker = SessionTracker::new(60.0);

        tracker.observe(&[eating("mochi")], 100.0, None, None);
        tracker.observe(&[eating("mochi")], 90.0, None, None);

        let open = tracker.open_session("mochi").unwrap();
        assert_eq!(open.last_seen_at, 100.0);
    }
}
