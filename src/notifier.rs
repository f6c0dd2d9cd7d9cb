//! Webhook notifier for completed sessions
//!
//! Posts an interactive card per completed session to a Lark-style
//! webhook. Disabled when no webhook URL is configured; delivery
//! failures are reported to the caller and never retried here.

use crate::error::{Error, Result};
use crate::session_tracker::{Activity, Session};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub struct Notifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl Notifier {
    pub fn new(webhook_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            webhook_url,
        }
    }

    pub fn enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    /// Send an alert card for one completed session.
    pub async fn send_session_alert(&self, session: &Session) -> Result<()> {
        if !self.enabled() {
            debug!("notifier disabled, skipping alert");
            return Ok(());
        }

        let card = session_card(session);
        let resp = self.client.post(&self.webhook_url).json(&card).send().await?;

        if !resp.status().is_success() {
            return Err(Error::Internal(format!(
                "webhook returned {}",
                resp.status()
            )));
        }

        // Lark acks a delivered card with a zero code in the body.
        let body: serde_json::Value = resp.json().await?;
        check_ack(&body)
    }
}

/// Only `"code": 0` counts as delivered. A missing, non-integer or
/// non-zero code means the webhook did not accept the card.
fn check_ack(body: &serde_json::Value) -> Result<()> {
    match body.get("code").and_then(|c| c.as_i64()) {
        Some(0) => Ok(()),
        _ => Err(Error::Internal(format!("webhook rejected card: {}", body))),
    }
}

/// Build the alert card payload for a completed session.
fn session_card(session: &Session) -> serde_json::Value {
    let (template, title) = match session.activity {
        Activity::Eating => ("green", format!("🍽️ {} just ate!", session.subject)),
        Activity::Drinking => ("blue", format!("💧 {} just drank!", session.subject)),
        Activity::Present => ("grey", format!("👀 {} was around", session.subject)),
    };
    let duration_min = session.duration_secs() / 60.0;
    let time_range = format!(
        "{} - {} UTC",
        fmt_hhmm(session.started_at),
        fmt_hhmm(session.last_seen_at)
    );

    json!({
        "msg_type": "interactive",
        "card": {
            "header": {
                "template": template,
                "title": {"tag": "plain_text", "content": title},
            },
            "elements": [
                {
                    "tag": "div",
                    "fields": [
                        {
                            "is_short": true,
                            "text": {"tag": "lark_md", "content": format!("**Subject**\n{}", session.subject)},
                        },
                        {
                            "is_short": true,
                            "text": {"tag": "lark_md", "content": format!("**Activity**\n{}", session.activity)},
                        },
                    ],
                },
                {
                    "tag": "div",
                    "fields": [
                        {
                            "is_short": true,
                            "text": {"tag": "lark_md", "content": format!("**Duration**\n{:.1} min", duration_min)},
                        },
                        {
                            "is_short": true,
                            "text": {"tag": "lark_md", "content": format!("**Frames**\n{}", session.frame_count())},
                        },
                    ],
                },
                {"tag": "hr"},
                {
                    "tag": "note",
                    "elements": [
                        {"tag": "plain_text", "content": time_range},
                    ],
                },
            ],
        },
    })
}

fn fmt_hhmm(ts: f64) -> String {
    chrono::DateTime::from_timestamp(ts as i64, 0)
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}
