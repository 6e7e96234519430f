//! `LLM_*` instruction handlers: the provider/llm catalog plus response
//! generation and regeneration.

use {
    chatlink_protocol::{
        Response,
        instruction_types::{
            LLM_ADD, LLM_DELETE, LLM_LIST, LLM_LIST_BY_PROVIDER, LLM_PROVIDER_ADD,
            LLM_PROVIDER_DELETE, LLM_PROVIDER_LIST, LLM_PROVIDER_UPDATE, LLM_RESPONSE_GENERATE,
            LLM_RESPONSE_REGENERATE, LLM_UPDATE,
        },
        payload,
    },
    chatlink_storage::{Message, Storage},
    serde_json::{Map, Value, json},
    tracing::info,
};

use crate::{
    completion::{ChatTurn, CompletionClient},
    decode,
    error::{UnitError, UnitResult},
};

pub struct LlmUnit {
    storage: Storage,
    completion: CompletionClient,
}

fn turn(message: &Message) -> ChatTurn {
    ChatTurn::new(message.role.as_str(), message.content.as_str())
}

impl LlmUnit {
    pub fn new(storage: Storage, completion: CompletionClient) -> Self {
        Self { storage, completion }
    }

    /// Execute one `LLM_*` instruction. Always returns an envelope.
    pub async fn handle(&self, instruction_type: &str, data: &Map<String, Value>) -> Response {
        let result = match instruction_type {
            LLM_PROVIDER_ADD => self.add_provider(data).await,
            LLM_PROVIDER_UPDATE => self.update_provider(data).await,
            LLM_PROVIDER_DELETE => self.delete_provider(data).await,
            LLM_PROVIDER_LIST => self.list_providers().await,
            LLM_ADD => self.add_llm(data).await,
            LLM_UPDATE => self.update_llm(data).await,
            LLM_DELETE => self.delete_llm(data).await,
            LLM_LIST => self.list_llms().await,
            LLM_LIST_BY_PROVIDER => self.list_llms_by_provider(data).await,
            LLM_RESPONSE_GENERATE => self.generate(data).await,
            LLM_RESPONSE_REGENERATE => self.regenerate(data).await,
            _ => Err(UnitError::validation("Unknown instruction type")),
        };
        result.unwrap_or_else(Response::from)
    }

    // ── Provider catalog ─────────────────────────────────────────────────────

    async fn add_provider(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::ProviderAdd = decode(data)?;
        let provider = self
            .storage
            .create_provider(&payload.name, &payload.api_endpoint, payload.api_key.as_deref())
            .await?;
        info!(provider_id = %provider.provider_id, name = %provider.name, "provider added");
        Ok(Response::success("Provider added successfully", json!({ "provider": provider })))
    }

    async fn update_provider(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::ProviderUpdate = decode(data)?;
        let provider = self
            .storage
            .update_provider(
                &payload.provider_id,
                payload.name.as_deref(),
                payload.api_endpoint.as_deref(),
                payload.api_key.as_deref(),
            )
            .await?;
        Ok(Response::success("Provider updated successfully", json!({ "provider": provider })))
    }

    async fn delete_provider(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::ProviderKey = decode(data)?;
        self.storage.delete_provider(&payload.provider_id).await?;
        info!(provider_id = %payload.provider_id, "provider deleted");
        Ok(Response::success("Provider deleted successfully", json!({})))
    }

    async fn list_providers(&self) -> UnitResult {
        let providers = self.storage.list_providers().await?;
        Ok(Response::success(
            "Providers retrieved successfully",
            json!({ "providers": providers }),
        ))
    }

    // ── LLM catalog ──────────────────────────────────────────────────────────

    async fn add_llm(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::LlmAdd = decode(data)?;
        let llm = self.storage.create_llm(&payload.provider_id, &payload.llm_name).await?;
        info!(llm_id = %llm.llm_id, name = %llm.name, "llm added");
        Ok(Response::success("LLM added successfully", json!({ "llm": llm })))
    }

    async fn update_llm(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::LlmUpdate = decode(data)?;
        let llm = self.storage.update_llm(&payload.llm_id, &payload.llm_name).await?;
        Ok(Response::success("LLM updated successfully", json!({ "llm": llm })))
    }

    async fn delete_llm(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::LlmKey = decode(data)?;
        self.storage.delete_llm(&payload.llm_id).await?;
        info!(llm_id = %payload.llm_id, "llm deleted");
        Ok(Response::success("LLM deleted successfully", json!({})))
    }

    async fn list_llms(&self) -> UnitResult {
        let llms = self.storage.list_llms().await?;
        Ok(Response::success("LLMs retrieved successfully", json!({ "llms": llms })))
    }

    async fn list_llms_by_provider(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::ProviderKey = decode(data)?;
        let llms = self.storage.list_llms_by_provider(&payload.provider_id).await?;
        Ok(Response::success(
            format!("LLMs retrieved for provider {}", payload.provider_id),
            json!({ "llms": llms }),
        ))
    }

    // ── Response generation ──────────────────────────────────────────────────

    /// Send the chat's full history plus the new user turn to the provider,
    /// then persist the user message and the assistant message. Nothing is
    /// written when the completion call fails.
    async fn generate(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::ResponseGenerate = decode(data)?;
        let provider = self.storage.get_provider(&payload.provider_id).await?;
        let llm = self.storage.get_llm(&payload.llm_id).await?;

        let mut turns: Vec<ChatTurn> = self
            .storage
            .list_messages_by_chat(&payload.chat_id)
            .await?
            .iter()
            .map(turn)
            .collect();
        turns.push(ChatTurn::new("user", payload.user_input.as_str()));

        let content = self
            .completion
            .complete(&provider.api_endpoint, provider.api_key.as_deref(), &llm.name, &turns)
            .await?;

        self.storage
            .create_message(
                &payload.chat_id,
                &payload.user_id,
                Some(&payload.llm_id),
                "user",
                &payload.user_input,
            )
            .await?;
        let reply = self
            .storage
            .create_message(
                &payload.chat_id,
                &payload.user_id,
                Some(&payload.llm_id),
                "assistant",
                &content,
            )
            .await?;
        info!(
            chat_id = %payload.chat_id,
            llm_id = %payload.llm_id,
            message_id = %reply.message_id,
            "response generated"
        );
        Ok(Response::success("Response generated successfully", json!({ "llm_response": reply })))
    }

    /// Re-run the completion as of just before the target message: only
    /// history strictly older than the target is sent, and one new assistant
    /// message is appended to the chat.
    async fn regenerate(&self, data: &Map<String, Value>) -> UnitResult {
        let payload: payload::ResponseRegenerate = decode(data)?;
        let target = self.storage.get_message(&payload.message_id).await?;
        let Some(llm_id) = target.llm_id.as_deref() else {
            return Err(UnitError::validation("Original message has no associated LLM"));
        };
        let llm = self.storage.get_llm(llm_id).await?;
        let provider = self.storage.get_provider(&llm.provider_id).await?;

        let turns: Vec<ChatTurn> = self
            .storage
            .list_messages_before(&payload.message_id)
            .await?
            .iter()
            .map(turn)
            .collect();

        let content = self
            .completion
            .complete(&provider.api_endpoint, provider.api_key.as_deref(), &llm.name, &turns)
            .await?;

        let reply = self
            .storage
            .create_message(&target.chat_id, &target.user_id, Some(llm_id), "assistant", &content)
            .await?;
        info!(
            target = %payload.message_id,
            message_id = %reply.message_id,
            "response regenerated"
        );
        Ok(Response::success(
            "Response regenerated successfully",
            json!({ "llm_response": reply }),
        ))
    }
}
