//! VisionClient - classification service adapter
//!
//! ## Responsibilities
//!
//! - Send one JPEG frame plus the known subject profiles to the vision
//!   service and parse the structured result
//! - Map per-subject observations to tracker judgments
//! - Health checks
//!
//! One synchronous call per invocation. Retries and failure handling
//! belong to the worker loop, not here.

use crate::error::{Error, Result};
use crate::session_tracker::{Activity, Judgment};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// A subject the vision service should recognize
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Load subject profiles from a JSON file (array of profiles).
pub async fn load_subjects(path: &Path) -> Result<Vec<SubjectProfile>> {
    let raw = tokio::fs::read(path).await?;
    let profiles: Vec<SubjectProfile> = serde_json::from_slice(&raw)?;
    Ok(profiles)
}

/// One (subject, activity) pair from a classification response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectObservation {
    pub name: String,
    pub activity: Activity,
}

/// Structured classification result for a single frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyResponse {
    /// Any tracked subject visible at all
    pub present: bool,
    #[serde(default)]
    pub subjects: Vec<SubjectObservation>,
    /// Overall confidence in [0, 1]
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub description: Option<String>,
}

impl ClassifyResponse {
    /// Convert observations into tracker judgments.
    pub fn judgments(&self) -> Vec<Judgment> {
        self.subjects
            .iter()
            .map(|obs| Judgment::new(obs.name.clone(), obs.activity))
            .collect()
    }
}

/// Vision service client
pub struct VisionClient {
    client: reqwest::Client,
    base_url: String,
}

impl VisionClient {
    pub fn new(base_url: String) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url }
    }

    /// Check vision service health
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/healthz", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Classify one frame against the known subjects.
    ///
    /// `jpeg` is the encoded frame, `captured_at` unix seconds.
    pub async fn classify(
        &self,
        jpeg: Vec<u8>,
        captured_at: f64,
        subjects: &[SubjectProfile],
    ) -> Result<ClassifyResponse> {
        let url = format!("{}/v1/classify", self.base_url);

        let subjects_json = serde_json::to_string(subjects)?;
        let form = Form::new()
            .part(
                "frame",
                Part::bytes(jpeg)
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")?,
            )
            .text("captured_at", format!("{:.3}", captured_at))
            .text("subjects_json", subjects_json);

        let resp = self.client.post(&url).multipart(form).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Vision(format!(
                "classification failed: {} - {}",
                status, body
            )));
        }

        let result: ClassifyResponse = resp.json().await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_response() {
        let raw = r#"{
            "present": true,
            "subjects": [
                {"name": "mochi", "activity": "eating"},
                {"name": "tora", "activity": "present"}
            ],
            "confidence": 0.92,
            "description": "two cats at the bowl"
        }"#;

        let resp: ClassifyResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.present);
        assert_eq!(resp.subjects.len(), 2);
        assert_eq!(resp.subjects[0].activity, Activity::Eating);
        assert_eq!(resp.confidence, 0.92);
        assert_eq!(resp.description.as_deref(), Some("two cats at the bowl"));
    }

    #[test]
    fn test_parse_minimal_response() {
        let resp: ClassifyResponse = serde_json::from_str(r#"{"present": false}"#).unwrap();
        assert!(!resp.present);
        assert!(resp.subjects.is_empty());
        assert_eq!(resp.confidence, 0.0);
        assert!(resp.description.is_none());
    }

    #[test]
    fn test_unknown_activity_is_rejected() {
        let raw = r#"{"present": true, "subjects": [{"name": "mochi", "activity": "flying"}]}"#;
        assert!(serde_json::from_str::<ClassifyResponse>(raw).is_err());
    }

    #[test]
    fn test_judgments_mapping() {
        let resp = ClassifyResponse {
            present: true,
            subjects: vec![
                SubjectObservation {
                    name: "mochi".to_string(),
                    activity: Activity::Drinking,
                },
                SubjectObservation {
                    name: "tora".to_string(),
                    activity: Activity::Present,
                },
            ],
            confidence: 0.8,
            description: None,
        };

        let judgments = resp.judgments();
        assert_eq!(judgments.len(), 2);
        assert_eq!(judgments[0], Judgment::new("mochi", Activity::Drinking));
        assert_eq!(judgments[1], Judgment::new("tora", Activity::Present));
    }

    #[test]
    fn test_subject_profiles_parse() {
        let raw = r#"[
            {"name": "mochi", "description": "gray tabby, green eyes"},
            {"name": "tora"}
        ]"#;

        let profiles: Vec<SubjectProfile> = serde_json::from_str(raw).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].name, "mochi");
        assert_eq!(profiles[1].description, "");
    }
}
