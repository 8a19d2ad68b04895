//! Token usage accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::OwnerId;

/// One AI-backed unit of work and the tokens it consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub owner: OwnerId,
    pub topic: String,
    pub result_path: Option<String>,
    pub tokens_used: u64,
    pub recorded_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(owner: OwnerId, topic: impl Into<String>, tokens_used: u64) -> Self {
        Self {
            owner,
            topic: topic.into(),
            result_path: None,
            tokens_used,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_result_path(mut self, path: impl Into<String>) -> Self {
        self.result_path = Some(path.into());
        self
    }
}
