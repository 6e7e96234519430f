//! Instruction handler units.
//!
//! Each unit owns one domain of the instruction vocabulary (`USER_*`,
//! `CHAT_*`, `LLM_*`) and executes instructions against shared storage;
//! `LlmUnit` additionally talks to provider completion endpoints. [`Router`]
//! fans a decoded instruction out to the owning unit and is infallible:
//! validation failures, storage errors and upstream API errors all come back
//! as error envelopes, never as `Err`.

use serde_json::{Map, Value};

mod chat;
mod completion;
mod error;
mod llm;
mod router;
mod user;

pub use {
    chat::ChatUnit,
    completion::{ChatTurn, CompletionClient, CompletionError},
    error::UnitError,
    llm::LlmUnit,
    router::Router,
    user::UserUnit,
};

/// Decode an instruction's `data` mapping into a typed payload.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    data: &Map<String, Value>,
) -> Result<T, UnitError> {
    serde_json::from_value(Value::Object(data.clone()))
        .map_err(|err| UnitError::Validation(format!("Invalid instruction data: {err}")))
}
