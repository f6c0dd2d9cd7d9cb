//! Frame-differencing motion scoring
//!
//! Decides which frames are worth sending to the vision service. The
//! score is the number of pixels whose luma changed noticeably since
//! the previous frame; the worker compares it against a configured
//! threshold. Cheap by design, it runs on every sampled frame.

/// Per-pixel luma delta below which a pixel counts as unchanged
const PIXEL_DELTA: i32 = 25;

/// Scores consecutive RGB frames by changed-pixel count
///
/// Holds a copy of the previous frame. The first frame after
/// construction (or after a frame-size change) always scores 0.
pub struct MotionDetector {
    previous: Option<Vec<u8>>,
}

impl MotionDetector {
    pub fn new() -> Self {
        Self { previous: None }
    }

    /// Count pixels that changed since the previous frame.
    ///
    /// `frame` is packed RGB, 3 bytes per pixel. The frame is copied
    /// and kept as the comparison baseline for the next call.
    pub fn score(&mut self, frame: &[u8]) -> u32 {
        let score = match &self.previous {
            Some(prev) if prev.len() == frame.len() => changed_pixels(frame, prev),
            _ => 0,
        };

        match &mut self.previous {
            Some(prev) if prev.len() == frame.len() => prev.copy_from_slice(frame),
            _ => self.previous = Some(frame.to_vec()),
        }

        score
    }
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn changed_pixels(current: &[u8], previous: &[u8]) -> u32 {
    current
        .chunks_exact(3)
        .zip(previous.chunks_exact(3))
        .filter(|(cur, prev)| {
            let dr = (cur[0] as i32 - prev[0] as i32).abs();
            let dg = (cur[1] as i32 - prev[1] as i32).abs();
            let db = (cur[2] as i32 - prev[2] as i32).abs();
            // BT.601 luma weights on the per-channel deltas
            (299 * dr + 587 * dg + 114 * db) / 1000 > PIXEL_DELTA
        })
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_scores_zero() {
        let mut detector = MotionDetector::new();
        assert_eq!(detector.score(&[255; 12]), 0);
    }

    #[test]
    fn test_identical_frames_score_zero() {
        let mut detector = MotionDetector::new();
        let frame = [128u8; 12];
        detector.score(&frame);
        assert_eq!(detector.score(&frame), 0);
    }

    #[test]
    fn test_counts_changed_pixels() {
        let mut detector = MotionDetector::new();
        detector.score(&[0u8; 12]);

        // Flip the second of four pixels to white.
        let mut frame = [0u8; 12];
        frame[3] = 255;
        frame[4] = 255;
        frame[5] = 255;
        assert_eq!(detector.score(&frame), 1);
    }

    #[test]
    fn test_small_deltas_are_ignored() {
        let mut detector = MotionDetector::new();
        detector.score(&[100u8; 12]);
        assert_eq!(detector.score(&[110u8; 12]), 0);
    }

    #[test]
    fn test_baseline_advances_every_call() {
        let mut detector = MotionDetector::new();
        detector.score(&[0u8; 12]);
        assert_eq!(detector.score(&[255u8; 12]), 4);
        assert_eq!(detector.score(&[255u8; 12]), 0);
    }

    #[test]
    fn test_size_change_resets_baseline() {
        let mut detector = MotionDetector::new();
        detector.score(&[0u8; 12]);
        assert_eq!(detector.score(&[255u8; 24]), 0);
        assert_eq!(detector.score(&[0u8; 24]), 8);
    }
}
