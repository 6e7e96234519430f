//! Instruction wire protocol.
//!
//! Callers and the worker exchange UTF-8 JSON bodies over the broker:
//! - `Instruction` — caller → worker request `{type, data}`
//! - `Response`    — worker → caller reply `{status, message, data, timestamp}`
//!
//! `type` values form a closed vocabulary (`instruction_types`); the domain
//! prefix up to the first delimiter (`USER_`, `CHAT_`, `LLM_`) selects the
//! handler unit that owns the instruction.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

pub mod payload;

// ── Instruction vocabulary ───────────────────────────────────────────────────

pub mod instruction_types {
    pub const USER_CREATE: &str = "USER_CREATE";
    pub const USER_UPDATE: &str = "USER_UPDATE";
    pub const USER_DELETE: &str = "USER_DELETE";
    pub const USER_LIST: &str = "USER_LIST";
    pub const USER_GET: &str = "USER_GET";
    pub const USER_INSTRUCTION_RECORDING_ENABLE: &str = "USER_INSTRUCTION_RECORDING_ENABLE";
    pub const USER_INSTRUCTION_RECORDING_DISABLE: &str = "USER_INSTRUCTION_RECORDING_DISABLE";
    pub const USER_INSTRUCTION_RECORDS_LIST: &str = "USER_INSTRUCTION_RECORDS_LIST";
    pub const USER_INSTRUCTION_RECORDS_DELETE: &str = "USER_INSTRUCTION_RECORDS_DELETE";

    pub const CHAT_CREATE: &str = "CHAT_CREATE";
    pub const CHAT_UPDATE: &str = "CHAT_UPDATE";
    pub const CHAT_DELETE: &str = "CHAT_DELETE";
    pub const CHAT_LOAD: &str = "CHAT_LOAD";
    pub const CHAT_LIST: &str = "CHAT_LIST";
    pub const CHAT_LIST_BY_USER: &str = "CHAT_LIST_BY_USER";

    pub const LLM_PROVIDER_ADD: &str = "LLM_PROVIDER_ADD";
    pub const LLM_PROVIDER_UPDATE: &str = "LLM_PROVIDER_UPDATE";
    pub const LLM_PROVIDER_DELETE: &str = "LLM_PROVIDER_DELETE";
    pub const LLM_PROVIDER_LIST: &str = "LLM_PROVIDER_LIST";
    pub const LLM_ADD: &str = "LLM_ADD";
    pub const LLM_UPDATE: &str = "LLM_UPDATE";
    pub const LLM_DELETE: &str = "LLM_DELETE";
    pub const LLM_LIST: &str = "LLM_LIST";
    pub const LLM_LIST_BY_PROVIDER: &str = "LLM_LIST_BY_PROVIDER";
    pub const LLM_RESPONSE_GENERATE: &str = "LLM_RESPONSE_GENERATE";
    pub const LLM_RESPONSE_REGENERATE: &str = "LLM_RESPONSE_REGENERATE";
}

// ── Domains ──────────────────────────────────────────────────────────────────

/// Handler-unit domain an instruction type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    User,
    Chat,
    Llm,
}

impl Domain {
    const PREFIXES: [(&'static str, Domain); 3] = [
        ("USER_", Domain::User),
        ("CHAT_", Domain::Chat),
        ("LLM_", Domain::Llm),
    ];

    /// Resolve the owning domain by longest-matching type prefix.
    pub fn of(instruction_type: &str) -> Option<Domain> {
        Self::PREFIXES
            .iter()
            .filter(|(prefix, _)| instruction_type.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, domain)| *domain)
    }
}

// ── Request envelope ─────────────────────────────────────────────────────────

/// Caller → worker request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub r#type: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Instruction {
    pub fn new(r#type: impl Into<String>, data: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { r#type: r#type.into(), data }
    }

    /// Build an instruction from a typed payload struct.
    pub fn from_payload<P: Serialize>(
        r#type: impl Into<String>,
        payload: &P,
    ) -> serde_json::Result<Self> {
        match serde_json::to_value(payload)? {
            serde_json::Value::Object(data) => Ok(Self { r#type: r#type.into(), data }),
            _ => Err(serde::ser::Error::custom("instruction payload must be a mapping")),
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

// ── Response envelope ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Worker → caller reply envelope. `data` is `{}` on error; on success it
/// carries domain records under a domain-specific key (`user`, `chats`,
/// `llm_response`, …).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Response {
    pub fn success(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            data: serde_json::Value::Object(serde_json::Map::new()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
