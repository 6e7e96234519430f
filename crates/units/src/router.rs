//! Fans decoded instructions out to the unit that owns their domain prefix.

use {
    chatlink_protocol::{Domain, Response},
    chatlink_storage::Storage,
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::{chat::ChatUnit, completion::CompletionClient, llm::LlmUnit, user::UserUnit};

pub struct Router {
    user: UserUnit,
    chat: ChatUnit,
    llm: LlmUnit,
}

impl Router {
    pub fn new(storage: Storage) -> Self {
        Self::with_completion(storage, CompletionClient::new())
    }

    /// Build a router around a pre-configured completion client.
    pub fn with_completion(storage: Storage, completion: CompletionClient) -> Self {
        Self {
            user: UserUnit::new(storage.clone()),
            chat: ChatUnit::new(storage.clone()),
            llm: LlmUnit::new(storage, completion),
        }
    }

    /// Execute one decoded instruction. Never fails: shape violations,
    /// unrecognized types and everything the units report all come back as
    /// response envelopes.
    ///
    /// The envelope must be a JSON object with a non-empty string `type`;
    /// `data` may be absent or null (treated as empty) but is otherwise
    /// required to be an object.
    pub async fn dispatch(&self, raw: &Value) -> Response {
        let Some(envelope) = raw.as_object() else {
            return Response::error("Instruction must be a JSON object");
        };
        let ty = match envelope.get("type") {
            Some(Value::String(ty)) if !ty.is_empty() => ty.as_str(),
            _ => return Response::error("Instruction type is required"),
        };
        let empty = Map::new();
        let data = match envelope.get("data") {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(data)) => data,
            Some(_) => return Response::error("Instruction data must be an object"),
        };

        debug!(r#type = ty, "dispatching instruction");
        match Domain::of(ty) {
            Some(Domain::User) => self.user.handle(ty, data).await,
            Some(Domain::Chat) => self.chat.handle(ty, data).await,
            Some(Domain::Llm) => self.llm.handle(ty, data).await,
            None => Response::error("Unknown instruction type"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        chatlink_protocol::{Instruction, instruction_types, payload},
        serde_json::json,
    };

    use super::*;

    async fn router() -> Router {
        Router::new(Storage::in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn dispatch_routes_to_the_owning_unit() {
        let router = router().await;
        for (ty, key) in [
            (instruction_types::USER_LIST, "users"),
            (instruction_types::CHAT_LIST, "chats"),
            (instruction_types::LLM_LIST, "llms"),
            (instruction_types::LLM_PROVIDER_LIST, "providers"),
        ] {
            let response = router.dispatch(&json!({"type": ty})).await;
            assert!(response.is_success(), "{ty}: {}", response.message);
            assert!(response.data[key].as_array().unwrap().is_empty(), "{ty}");
        }
    }

    #[tokio::test]
    async fn malformed_envelopes_become_error_envelopes() {
        let router = router().await;
        for (raw, message) in [
            (json!([1, 2, 3]), "Instruction must be a JSON object"),
            (json!("USER_LIST"), "Instruction must be a JSON object"),
            (json!({}), "Instruction type is required"),
            (json!({"type": ""}), "Instruction type is required"),
            (json!({"type": 7}), "Instruction type is required"),
            (json!({"type": "USER_LIST", "data": 5}), "Instruction data must be an object"),
        ] {
            let response = router.dispatch(&raw).await;
            assert!(!response.is_success(), "{raw}");
            assert_eq!(response.message, message, "{raw}");
        }
    }

    #[tokio::test]
    async fn null_and_missing_data_read_as_empty() {
        let router = router().await;
        for raw in [
            json!({"type": "USER_LIST"}),
            json!({"type": "USER_LIST", "data": null}),
            json!({"type": "USER_LIST", "data": {}}),
        ] {
            let response = router.dispatch(&raw).await;
            assert!(response.is_success(), "{raw}: {}", response.message);
        }
    }

    #[tokio::test]
    async fn unrecognized_types_become_error_envelopes() {
        let router = router().await;
        // Foreign domains and unknown types within a known domain read the same
        // to callers.
        for ty in ["BANANA_SPLIT", "USER_TELEPORT", "LLM_RESPONSE_DELETE"] {
            let response = router.dispatch(&json!({"type": ty})).await;
            assert!(!response.is_success(), "{ty}");
            assert_eq!(response.message, "Unknown instruction type", "{ty}");
        }
    }

    #[tokio::test]
    async fn instructions_compose_across_domains() {
        let router = router().await;
        let created = router
            .dispatch(
                &serde_json::to_value(
                    Instruction::from_payload(
                        instruction_types::USER_CREATE,
                        &payload::UserCreate {
                            username: "alice".into(),
                            display_name: None,
                            profile: None,
                        },
                    )
                    .unwrap(),
                )
                .unwrap(),
            )
            .await;
        assert!(created.is_success(), "{}", created.message);
        let user_id = created.data["user"]["user_id"].as_str().unwrap().to_string();

        let chat = router
            .dispatch(&json!({
                "type": instruction_types::CHAT_CREATE,
                "data": {"title": "Daily", "user_ids": [user_id]},
            }))
            .await;
        assert!(chat.is_success(), "{}", chat.message);
        assert_eq!(chat.data["chat"]["users"][0]["user_id"], user_id.as_str());
    }
}
