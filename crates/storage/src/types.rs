//! Domain records as they appear in response envelopes.
//!
//! Every record exposes its public UUID (`user_id`, `chat_id`, …), never the
//! internal integer key. Timestamps serialize as RFC 3339.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub profile: Option<String>,
    pub record_instructions: bool,
    pub created_at: DateTime<Utc>,
}

/// A chat rendered with its live member users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub chat_id: String,
    pub title: String,
    pub users: Vec<User>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub provider_id: String,
    pub name: String,
    pub api_endpoint: String,
    pub api_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Llm {
    pub llm_id: String,
    pub name: String,
    /// Public id of the owning provider.
    pub provider_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub chat_id: String,
    pub user_id: String,
    pub llm_id: Option<String>,
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionRecord {
    pub record_id: String,
    pub chat_id: Option<String>,
    pub instruction: String,
    pub timestamp: DateTime<Utc>,
}

/// Millisecond unix timestamp → RFC 3339 record timestamp.
pub(crate) fn datetime_from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
