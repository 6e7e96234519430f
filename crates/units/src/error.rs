use {chatlink_protocol::Response, thiserror::Error};

use crate::completion::CompletionError;

/// Failures inside a handler. Every variant converts into an error envelope
/// at the unit boundary; none escape to the worker loop.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] chatlink_storage::StorageError),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

impl UnitError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<UnitError> for Response {
    fn from(err: UnitError) -> Self {
        Response::error(err.to_string())
    }
}

pub(crate) type UnitResult = Result<Response, UnitError>;
