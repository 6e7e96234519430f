use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} {value} already exists")]
    Duplicate { entity: &'static str, value: String },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl StorageError {
    #[must_use]
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound { entity, key: key.into() }
    }

    #[must_use]
    pub fn duplicate(entity: &'static str, value: impl Into<String>) -> Self {
        Self::Duplicate { entity, value: value.into() }
    }

    /// True when the error is a missing-row lookup rather than a real failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
