//! Worker configuration
//!
//! All settings come from environment variables (a `.env` file is loaded
//! by the binary before this runs). Only the stream and vision endpoints
//! are required; everything else has operational defaults.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Live stream URL handed to the decoder (RTMP/RTSP/HTTP)
    pub stream_url: String,
    /// Vision classification service base URL
    pub vision_url: String,
    /// Seconds between sampled frames
    pub frame_interval_secs: u64,
    /// Fixed capture width after decoder scaling
    pub capture_width: u32,
    /// Fixed capture height after decoder scaling
    pub capture_height: u32,
    /// Read-deadline floor for the frame source (seconds)
    pub read_timeout_secs: u64,
    /// Delay between stream reconnect attempts (seconds)
    pub reconnect_delay_secs: u64,
    /// Consecutive decoder spawn failures tolerated before giving up
    /// (0 = retry forever, matching the unbounded reference behavior)
    pub max_spawn_failures: u32,
    /// Silence tolerated before an open session is closed (seconds)
    pub idle_timeout_secs: u64,
    /// Minimum changed-pixel count before a frame is worth classifying
    pub motion_threshold: u32,
    /// Minimum spacing between vision calls (seconds)
    pub classify_cooldown_secs: u64,
    /// JSON file with known subject profiles
    pub subjects_file: PathBuf,
    /// Webhook URL for session alerts (empty = disabled)
    pub webhook_url: String,
    /// HTTP endpoint for completed session records (empty = disabled)
    pub store_url: String,
}

impl Settings {
    /// Load settings from the environment
    pub fn from_env() -> Result<Self> {
        let stream_url = require("STREAM_URL")?;
        let vision_url = require("VISION_URL")?;
        let (capture_width, capture_height) =
            parse_resolution(&env_or("CAPTURE_RESOLUTION", "1280x720"))?;

        Ok(Self {
            stream_url,
            vision_url,
            frame_interval_secs: env_parse("FRAME_INTERVAL", 2)?,
            capture_width,
            capture_height,
            read_timeout_secs: env_parse("READ_TIMEOUT", 30)?,
            reconnect_delay_secs: env_parse("RECONNECT_DELAY", 5)?,
            max_spawn_failures: env_parse("MAX_SPAWN_FAILURES", 10)?,
            idle_timeout_secs: env_parse("IDLE_TIMEOUT", 120)?,
            motion_threshold: env_parse("MOTION_THRESHOLD", 500)?,
            classify_cooldown_secs: env_parse("CLASSIFY_COOLDOWN", 30)?,
            subjects_file: PathBuf::from(env_or("SUBJECTS_FILE", "subjects.json")),
            webhook_url: env_or("WEBHOOK_URL", ""),
            store_url: env_or("STORE_URL", ""),
        })
    }

    /// Idle timeout in the tracker's time domain (seconds)
    pub fn idle_timeout(&self) -> f64 {
        self.idle_timeout_secs as f64
    }

    /// Cooldown between vision calls in the worker's time domain
    pub fn classify_cooldown(&self) -> f64 {
        self.classify_cooldown_secs as f64
    }

    /// Reconnect backoff as a Duration
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// Parse a `<width>x<height>` resolution string
pub fn parse_resolution(s: &str) -> Result<(u32, u32)> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| Error::Config(format!("resolution '{}' is not WIDTHxHEIGHT", s)))?;
    let width: u32 = w
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("bad resolution width '{}'", w)))?;
    let height: u32 = h
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("bad resolution height '{}'", h)))?;
    if width == 0 || height == 0 {
        return Err(Error::Config(format!("resolution '{}' has a zero dimension", s)));
    }
    Ok((width, height))
}

fn require(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!("{} is required", key))),
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has unparsable value '{}'", key, v))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_resolution("640x480").unwrap(), (640, 480));
    }

    #[test]
    fn test_parse_resolution_rejects_garbage() {
        assert!(parse_resolution("1280").is_err());
        assert!(parse_resolution("x720").is_err());
        assert!(parse_resolution("widextall").is_err());
        assert!(parse_resolution("0x720").is_err());
    }
}
