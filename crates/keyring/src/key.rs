use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Milliseconds since the Unix epoch, the timestamp unit of stored
/// keys.
#[must_use]
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// A stored key with its metadata.
///
/// `ext` is caller-opaque structured data, persisted as JSON.
/// Timestamps are caller-supplied and persisted verbatim.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Key {
    pub id: String,
    #[serde(rename = "type")]
    pub key_type: String,
    pub private: Option<Vec<u8>>,
    pub public: Option<Vec<u8>>,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
    pub notes: String,
    pub labels: Vec<String>,
    pub ext: Option<serde_json::Value>,
}

impl Key {
    #[must_use]
    pub fn new(id: impl Into<String>, key_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key_type: key_type.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn created(mut self, ts_ms: i64) -> Self {
        self.created_at = ts_ms;
        self
    }

    #[must_use]
    pub fn updated(mut self, ts_ms: i64) -> Self {
        self.updated_at = ts_ms;
        self
    }

    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

// Labels are stored as one TEXT column with each label bracketed by
// sentinels, "^backup$^work$", so label x is found with LIKE %^x$%.
// Queries depend on this encoding.
pub(crate) fn encode_labels(labels: &[String]) -> String {
    labels.iter().map(|l| format!("^{l}$")).collect()
}

pub(crate) fn decode_labels(encoded: &str) -> Vec<String> {
    encoded
        .split_terminator('$')
        .filter_map(|part| part.strip_prefix('^'))
        .map(ToString::to_string)
        .collect()
}
