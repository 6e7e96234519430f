//! Typed `data` payloads, one per instruction kind.
//!
//! Handler units decode the generic envelope's `data` mapping into these at
//! the dispatch boundary; callers can build `data` from them via
//! [`Instruction::from_payload`](crate::Instruction::from_payload). Optional
//! fields accept both absent and `null` keys.

use serde::{Deserialize, Serialize};

// ── User domain ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub username: String,
    pub display_name: Option<String>,
    pub profile: Option<String>,
}

/// Absent/null fields keep the stored value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdate {
    pub user_id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub profile: Option<String>,
}

/// `USER_GET` accepts either selector; at least one must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGet {
    pub username: Option<String>,
    pub user_id: Option<String>,
}

/// Shared payload for the instructions addressing one user by public id
/// (`USER_DELETE`, recording toggles, record list/delete, `CHAT_LIST_BY_USER`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserKey {
    pub user_id: String,
}

// ── Chat domain ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCreate {
    pub title: String,
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatUpdate {
    pub chat_id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatKey {
    pub chat_id: String,
}

// ── LLM domain ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAdd {
    pub name: String,
    pub api_endpoint: String,
    pub api_key: Option<String>,
}

/// Absent/null fields keep the stored value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUpdate {
    pub provider_id: String,
    pub name: Option<String>,
    pub api_endpoint: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderKey {
    pub provider_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAdd {
    pub provider_id: String,
    pub llm_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmUpdate {
    pub llm_id: String,
    pub llm_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmKey {
    pub llm_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseGenerate {
    pub user_id: String,
    pub chat_id: String,
    pub provider_id: String,
    pub llm_id: String,
    pub user_input: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRegenerate {
    pub message_id: String,
}
