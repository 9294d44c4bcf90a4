//! Wire types of the companion server HTTP contract
//!
//! - `GET /health` -> [`HealthResponse`]
//! - `POST /ocr` with [`SubmitRequest`] -> [`SubmitResponse`]
//! - `GET /status/{job_id}` -> [`JobStatusResponse`]

use crate::error::JobError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Sentinel value of a healthy `/health` response.
pub const HEALTH_OK: &str = "ok";

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl HealthResponse {
    pub fn ok(version: Option<&str>) -> Self {
        HealthResponse {
            status: HEALTH_OK.to_string(),
            version: version.map(str::to_string),
        }
    }

    /// Only the exact `ok` sentinel counts as healthy.
    pub fn is_ok(&self) -> bool {
        self.status == HEALTH_OK
    }
}

/// Server-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        JobId(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        JobId(value)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-empty, order-preserving set of item keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKeys(Vec<String>);

impl ItemKeys {
    /// Trim, drop blanks and duplicates (first occurrence wins).
    pub fn new<I, S>(keys: I) -> Result<Self, JobError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for key in keys {
            let key = key.as_ref().trim();
            if !key.is_empty() && !unique.iter().any(|k| k == key) {
                unique.push(key.to_string());
            }
        }
        if unique.is_empty() {
            return Err(JobError::EmptyBatch);
        }
        Ok(ItemKeys(unique))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Body of `POST /ocr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub item_keys: ItemKeys,
    pub force: bool,
}

/// Response of `POST /ocr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub items_queued: u32,
}

/// Lifecycle state of a job. Declaration order is lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response of `GET /status/{job_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub status: JobState,
    pub completed: u32,
    pub total: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl JobStatusResponse {
    pub fn new(status: JobState, completed: u32, total: u32) -> Self {
        JobStatusResponse {
            status,
            completed,
            total,
            current_item: None,
            errors: Vec::new(),
        }
    }

    pub fn with_current_item(mut self, item: &str) -> Self {
        self.current_item = Some(item.to_string());
        self
    }

    pub fn with_errors<I, S>(mut self, errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.errors = errors.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_requires_exact_sentinel() {
        let ok: HealthResponse = serde_json::from_str(r#"{"status":"ok","version":"1.2.0"}"#).unwrap();
        assert!(ok.is_ok());
        assert_eq!(ok.version.as_deref(), Some("1.2.0"));

        let degraded: HealthResponse = serde_json::from_str(r#"{"status":"OK"}"#).unwrap();
        assert!(!degraded.is_ok());
    }

    #[test]
    fn test_item_keys_dedupe_preserving_order() {
        let keys = ItemKeys::new(["B2", " A1 ", "", "B2", "C3"]).unwrap();
        assert_eq!(keys.as_slice(), &["B2", "A1", "C3"]);
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_item_keys_reject_empty() {
        assert!(matches!(
            ItemKeys::new(["  ", ""]),
            Err(JobError::EmptyBatch)
        ));
        assert!(ItemKeys::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_submit_request_wire_shape() {
        let request = SubmitRequest {
            item_keys: ItemKeys::new(["ABCD1234"]).unwrap(),
            force: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"item_keys": ["ABCD1234"], "force": false})
        );
    }

    #[test]
    fn test_status_without_optional_fields() {
        let status: JobStatusResponse =
            serde_json::from_str(r#"{"status":"processing","completed":1,"total":3}"#).unwrap();
        assert_eq!(status.status, JobState::Processing);
        assert!(status.current_item.is_none());
        assert!(status.errors.is_empty());

        let status: JobStatusResponse = serde_json::from_str(
            r#"{"status":"completed","completed":1,"total":1,"errors":null}"#,
        )
        .unwrap();
        assert!(status.errors.is_empty());
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let parsed: Result<JobStatusResponse, _> =
            serde_json::from_str(r#"{"status":"paused","completed":0,"total":1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_job_state_order_and_terminality() {
        assert!(JobState::Queued < JobState::Processing);
        assert!(JobState::Processing < JobState::Completed);
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Processing.is_terminal());
    }
}
