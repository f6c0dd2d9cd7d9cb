//! Completed-session persistence
//!
//! Posts one JSON record per completed session to a configured HTTP
//! endpoint (PostgREST-style insert). Disabled when no endpoint is
//! configured. The worker decides what to do about failures; nothing
//! is retried or buffered here.

use crate::error::{Error, Result};
use crate::session_tracker::{Activity, Session};
use serde::Serialize;
use std::time::Duration;

/// Wire format for one completed session
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub id: String,
    pub subject: String,
    pub activity: Activity,
    /// RFC 3339, UTC
    pub started_at: String,
    pub ended_at: String,
    pub duration_secs: f64,
    pub frame_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_change_score: Option<u32>,
}

impl SessionRecord {
    pub fn from_session(session: &Session) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject: session.subject.clone(),
            activity: session.activity,
            started_at: rfc3339(session.started_at),
            ended_at: rfc3339(session.last_seen_at),
            duration_secs: session.duration_secs(),
            frame_count: session.frame_count(),
            max_change_score: session.max_change_score,
        }
    }
}

fn rfc3339(ts: f64) -> String {
    chrono::DateTime::from_timestamp(ts as i64, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

pub struct SessionStore {
    client: reqwest::Client,
    store_url: String,
}

impl SessionStore {
    pub fn new(store_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, store_url }
    }

    pub fn enabled(&self) -> bool {
        !self.store_url.is_empty()
    }

    /// Persist one completed session. Returns the record id.
    pub async fn save(&self, session: &Session) -> Result<String> {
        if !self.enabled() {
            return Err(Error::Config("no session store endpoint configured".into()));
        }

        let record = SessionRecord::from_session(session);
        let resp = self
            .client
            .post(&self.store_url)
            .json(&record)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Internal(format!(
                "session store returned {}: {}",
                status, body
            )));
        }

        Ok(record.id)
    }
}
