//! `CHAT_*` instruction handlers.

use {
    chatlink_protocol::{
        Response,
        instruction_types::{
            CHAT_CREATE, CHAT_DELETE, CHAT_LIST, CHAT_LIST_BY_USER, CHAT_LOAD, CHAT_UPDATE,
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

pub struct ChatUnit {
    storage: Storage,
}

impl ChatUnit {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Execute one `CHAT_*` instruction. Always returns an envelope.
    pub async fn handle(&self, instruction_type: &str, data: &Map<String, Value>) -> Response {
        let result = match instruction_type {
            CHAT_CREATE => self.create(data).await,
            CHAT_UPDATE => self.update(data).await,
            CHAT_DELETE => self.delete(data).await,
            CHAT_LOAD => self.load(data).await,
            CHAT_LIST => self.list().await,
            CHAT_LIST_BY_USER => self.list_by_user(data).await,
            _ => Err(UnitError::validation("Unknown instruction type")),
        };
        result.unwrap_or_else(Response::from)
    }

    async fn create(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::ChatCreate = decode(data)?;
        let chat = self.storage.create_chat(&payload.title, &payload.user_ids).await?;
        info!(chat_id = %chat.chat_id, members = chat.users.len(), "chat created");
        Ok(Response::success(
            format!("Chat {} created successfully", chat.title),
            json!({ "chat": chat }),
        ))
    }

    async fn update(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::ChatUpdate = decode(data)?;
        let chat = self.storage.update_chat(&payload.chat_id, &payload.title).await?;
        Ok(Response::success(
            format!("Chat {} updated successfully", payload.chat_id),
            json!({ "chat": chat }),
        ))
    }

    async fn delete(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::ChatKey = decode(data)?;
        self.storage.delete_chat(&payload.chat_id).await?;
        info!(chat_id = %payload.chat_id, "chat deleted");
        Ok(Response::success(
            format!("Chat {} deleted successfully", payload.chat_id),
            json!({}),
        ))
    }

    async fn load(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::ChatKey = decode(data)?;
        let chat = self.storage.get_chat(&payload.chat_id).await?;
        Ok(Response::success("Chat retrieved successfully", json!({ "chat": chat })))
    }

    async fn list(&self) -> UnitResult {
        let chats = self.storage.list_chats().await?;
        Ok(Response::success("Chats retrieved successfully", json!({ "chats": chats })))
    }

    async fn list_by_user(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::UserKey = decode(data)?;
        let chats = self.storage.list_chats_by_user(&payload.user_id).await?;
        Ok(Response::success(
            format!("Chats retrieved for user {}", payload.user_id),
            json!({ "chats": chats }),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    async fn unit_with_user() -> (ChatUnit, String) {
        let storage = Storage::in_memory().await.unwrap();
        let user = storage.create_user("alice", "Alice", None).await.unwrap();
        (ChatUnit::new(storage), user.user_id)
    }

    #[tokio::test]
    async fn create_returns_chat_with_member_objects() {
        let (unit, user_id) = unit_with_user().await;
        let response = unit
            .handle(
                CHAT_CREATE,
                &data(json!({"title": "Sample Chat", "user_ids": [user_id]})),
            )
            .await;
        assert!(response.is_success());
        assert!(response.data["chat"]["chat_id"].is_string());
        assert_eq!(response.data["chat"]["title"], "Sample Chat");
        assert_eq!(response.data["chat"]["users"][0]["username"], "alice");
    }

    #[tokio::test]
    async fn create_with_unknown_member_is_an_error_envelope() {
        let (unit, user_id) = unit_with_user().await;
        let response = unit
            .handle(
                CHAT_CREATE,
                &data(json!({"title": "T", "user_ids": [user_id, "ghost"]})),
            )
            .await;
        assert!(!response.is_success());
        assert!(response.message.contains("not found"));

        // Nothing was half-written.
        let listed = unit.handle(CHAT_LIST, &Map::new()).await;
        assert!(listed.data["chats"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_requires_title_and_members() {
        let (unit, _) = unit_with_user().await;
        let response = unit.handle(CHAT_CREATE, &data(json!({"title": "T"}))).await;
        assert!(!response.is_success());
        assert!(response.message.contains("user_ids"));
    }

    #[tokio::test]
    async fn load_update_delete_round_trip() {
        let (unit, user_id) = unit_with_user().await;
        let created = unit
            .handle(CHAT_CREATE, &data(json!({"title": "old", "user_ids": [user_id]})))
            .await;
        let chat_id = created.data["chat"]["chat_id"].as_str().unwrap().to_string();

        let loaded = unit.handle(CHAT_LOAD, &data(json!({"chat_id": chat_id}))).await;
        assert_eq!(loaded.data["chat"]["title"], "old");

        let updated = unit
            .handle(CHAT_UPDATE, &data(json!({"chat_id": chat_id, "title": "new"})))
            .await;
        assert_eq!(updated.data["chat"]["title"], "new");

        let deleted = unit.handle(CHAT_DELETE, &data(json!({"chat_id": chat_id}))).await;
        assert!(deleted.is_success());

        let after = unit.handle(CHAT_LOAD, &data(json!({"chat_id": chat_id}))).await;
        assert!(!after.is_success());
        assert!(after.message.contains("not found"));
    }

    #[tokio::test]
    async fn list_by_user_filters_membership() {
        let (unit, alice) = unit_with_user().await;
        unit.handle(CHAT_CREATE, &data(json!({"title": "mine", "user_ids": [alice]})))
            .await;
        unit.handle(CHAT_CREATE, &data(json!({"title": "empty", "user_ids": []})))
            .await;

        let mine = unit
            .handle(CHAT_LIST_BY_USER, &data(json!({"user_id": alice})))
            .await;
        let chats = mine.data["chats"].as_array().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0]["title"], "mine");

        let all = unit.handle(CHAT_LIST, &Map::new()).await;
        assert_eq!(all.data["chats"].as_array().unwrap().len(), 2);
    }
}
