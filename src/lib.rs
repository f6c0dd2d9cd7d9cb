//! Mealwatch Worker Library
//!
//! Pet activity monitor: turns one live camera feed into discrete
//! per-subject activity sessions.
//!
//! ## Architecture
//!
//! 1. FrameSource - resilient decoder supervision, raw frame delivery
//! 2. MotionDetector - frame differencing, classification gate
//! 3. VisionClient - classification service adapter
//! 4. SessionTracker - per-subject activity state machine
//! 5. Worker - the single orchestration loop
//! 6. Notifier - webhook alerts for completed sessions
//! 7. SessionStore - completed session persistence
//!
//! ## Design Principles
//!
//! - The frame source absorbs every transient stream fault itself
//! - All tracker time is caller-supplied, so live and replay paths share code
//! - Downstream failures never stall frame production

pub mod config;
pub mod error;
pub mod frame_source;
pub mod motion_detector;
pub mod notifier;
pub mod session_store;
pub mod session_tracker;
pub mod vision_client;
pub mod worker;

pub use error::{Error, Result};
