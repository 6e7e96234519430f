//! Field-shape checks applied before an instruction is queued.

use {axum::Json, chatlink_protocol::Response};

use crate::ApiResult;

/// Usernames start with a letter and use 3-30 letters, digits or underscores.
pub(crate) fn username(value: &str) -> ApiResult<()> {
    let mut chars = value.chars();
    let ok = (3..=30).contains(&value.len())
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Json(Response::error(
            "username must start with a letter and use 3-30 letters, digits or underscores",
        )))
    }
}

pub(crate) fn length(field: &'static str, value: &str, min: usize, max: usize) -> ApiResult<()> {
    if (min..=max).contains(&value.chars().count()) {
        Ok(())
    } else {
        Err(Json(Response::error(format!("{field} must be {min}-{max} characters"))))
    }
}

pub(crate) fn max_length(field: &'static str, value: &str, max: usize) -> ApiResult<()> {
    if value.chars().count() <= max {
        Ok(())
    } else {
        Err(Json(Response::error(format!("{field} must be at most {max} characters"))))
    }
}

pub(crate) fn not_empty(field: &'static str, value: &str) -> ApiResult<()> {
    if value.is_empty() {
        Err(Json(Response::error(format!("{field} must not be empty"))))
    } else {
        Ok(())
    }
}
