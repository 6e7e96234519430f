//! `USER_*` instruction handlers.

use {
    chatlink_protocol::{
        Response,
        instruction_types::{
            USER_CREATE, USER_DELETE, USER_GET, USER_INSTRUCTION_RECORDING_DISABLE,
            USER_INSTRUCTION_RECORDING_ENABLE, USER_INSTRUCTION_RECORDS_DELETE,
            USER_INSTRUCTION_RECORDS_LIST, USER_LIST, USER_UPDATE,
        },
        payload,
    },
    chatlink_storage::Storage,
    serde_json::{Map, Value, json},
    tracing::info,
};

use crate::{
    decode,
    error::{UnitError, UnitResult},
};

pub struct UserUnit {
    storage: Storage,
}

impl UserUnit {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Execute one `USER_*` instruction. Always returns an envelope.
    pub async fn handle(&self, instruction_type: &str, data: &Map<String, Value>) -> Response {
        let result = match instruction_type {
            USER_CREATE => self.create(data).await,
            USER_UPDATE => self.update(data).await,
            USER_DELETE => self.delete(data).await,
            USER_LIST => self.list().await,
            USER_GET => self.get(data).await,
            USER_INSTRUCTION_RECORDING_ENABLE => self.set_recording(data, true).await,
            USER_INSTRUCTION_RECORDING_DISABLE => self.set_recording(data, false).await,
            USER_INSTRUCTION_RECORDS_LIST => self.list_records(data).await,
            USER_INSTRUCTION_RECORDS_DELETE => self.delete_records(data).await,
            _ => Err(UnitError::validation("Unknown instruction type")),
        };
        result.unwrap_or_else(Response::from)
    }

    async fn create(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::UserCreate = decode(data)?;
        let display_name = payload.display_name.as_deref().unwrap_or(&payload.username);
        let user = self
            .storage
            .create_user(&payload.username, display_name, payload.profile.as_deref())
            .await?;
        info!(user_id = %user.user_id, username = %user.username, "user created");
        Ok(Response::success(
            format!("User {} created successfully", user.username),
            json!({ "user": user }),
        ))
    }

    async fn update(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::UserUpdate = decode(data)?;
        let user = self
            .storage
            .update_user(
                &payload.user_id,
                payload.username.as_deref(),
                payload.display_name.as_deref(),
                payload.profile.as_deref(),
            )
            .await?;
        Ok(Response::success(
            format!("User {} updated successfully", payload.user_id),
            json!({ "user": user }),
        ))
    }

    async fn delete(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::UserKey = decode(data)?;
        self.storage.delete_user(&payload.user_id).await?;
        info!(user_id = %payload.user_id, "user deleted");
        Ok(Response::success(
            format!("User {} deleted successfully", payload.user_id),
            json!({}),
        ))
    }

    async fn list(&self) -> UnitResult {
        let users = self.storage.list_users().await?;
        Ok(Response::success("Users retrieved successfully", json!({ "users": users })))
    }

    /// `USER_GET` accepts either selector; the public id wins when both are
    /// present.
    async fn get(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::UserGet = decode(data)?;
        let user = match (&payload.user_id, &payload.username) {
            (Some(user_id), _) => self.storage.get_user(user_id).await?,
            (None, Some(username)) => self.storage.get_user_by_username(username).await?,
            (None, None) => {
                return Err(UnitError::validation("Either user_id or username is required"));
            }
        };
        Ok(Response::success("User retrieved successfully", json!({ "user": user })))
    }

    async fn set_recording(&self, data: &Map<String, Value>, enabled: bool) -> UnitResult {
        let payload: payload::UserKey = decode(data)?;
        self.storage.set_instruction_recording(&payload.user_id, enabled).await?;
        let message = if enabled {
            "Instruction recording enabled"
        } else {
            "Instruction recording disabled"
        };
        Ok(Response::success(message, json!({})))
    }

    async fn list_records(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::UserKey = decode(data)?;
        let records = self.storage.list_instruction_records(&payload.user_id).await?;
        Ok(Response::success(
            "Instruction records retrieved successfully",
            json!({ "records": records }),
        ))
    }

    async fn delete_records(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::UserKey = decode(data)?;
        let deleted = self.storage.delete_instruction_records(&payload.user_id).await?;
        info!(user_id = %payload.user_id, count = deleted, "instruction records deleted");
        Ok(Response::success("Instruction records deleted", json!({})))
    }
}
