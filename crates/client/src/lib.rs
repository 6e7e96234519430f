//! Typed caller client.
//!
//! `ChatLinkClient` wraps one [`RpcClient`] and exposes one method per
//! instruction type: each call encodes the typed payload into an instruction
//! envelope, sends it through the broker, and decodes the correlated reply.
//! Domain failures (unknown ids, duplicates, validation) come back as
//! envelopes with `status = "error"`; `Err` is reserved for connectivity and
//! codec failures.

use serde::Serialize;

use {
    chatlink_mq::{Broker, MqConfig, MqError, RpcClient},
    chatlink_protocol::{Instruction, Response, instruction_types, payload},
};

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Mq(#[from] MqError),
    #[error("malformed envelope: {0}")]
    Codec(#[from] serde_json::Error),
}

pub struct ChatLinkClient {
    rpc: RpcClient,
}

impl ChatLinkClient {
    /// Connect under the transport's retry policy.
    pub async fn connect(broker: Broker, config: MqConfig) -> Result<Self> {
        Ok(Self { rpc: RpcClient::connect(broker, config).await? })
    }

    pub fn close(self) {
        self.rpc.close();
    }

    async fn send<P: Serialize>(&mut self, ty: &str, payload: &P) -> Result<Response> {
        let instruction = Instruction::from_payload(ty, payload)?;
        let reply = self.rpc.call(&instruction.to_bytes()?).await?;
        Ok(Response::from_slice(&reply)?)
    }

    // ── Users ────────────────────────────────────────────────────────────────

    pub async fn create_user(
        &mut self,
        username: &str,
        display_name: Option<&str>,
        profile: Option<&str>,
    ) -> Result<Response> {
        self.send(
            instruction_types::USER_CREATE,
            &payload::UserCreate {
                username: username.into(),
                display_name: display_name.map(Into::into),
                profile: profile.map(Into::into),
            },
        )
        .await
    }

    pub async fn update_user(
        &mut self,
        user_id: &str,
        username: Option<&str>,
        display_name: Option<&str>,
        profile: Option<&str>,
    ) -> Result<Response> {
        self.send(
            instruction_types::USER_UPDATE,
            &payload::UserUpdate {
                user_id: user_id.into(),
                username: username.map(Into::into),
                display_name: display_name.map(Into::into),
                profile: profile.map(Into::into),
            },
        )
        .await
    }

    pub async fn delete_user(&mut self, user_id: &str) -> Result<Response> {
        self.send(instruction_types::USER_DELETE, &payload::UserKey { user_id: user_id.into() })
            .await
    }

    pub async fn list_users(&mut self) -> Result<Response> {
        self.send(instruction_types::USER_LIST, &serde_json::Map::new()).await
    }

    pub async fn get_user(&mut self, username: &str) -> Result<Response> {
        self.send(
            instruction_types::USER_GET,
            &payload::UserGet { username: Some(username.into()), user_id: None },
        )
        .await
    }

    pub async fn get_user_by_id(&mut self, user_id: &str) -> Result<Response> {
        self.send(
            instruction_types::USER_GET,
            &payload::UserGet { username: None, user_id: Some(user_id.into()) },
        )
        .await
    }

    pub async fn enable_instruction_recording(&mut self, user_id: &str) -> Result<Response> {
        self.send(
            instruction_types::USER_INSTRUCTION_RECORDING_ENABLE,
            &payload::UserKey { user_id: user_id.into() },
        )
        .await
    }

    pub async fn disable_instruction_recording(&mut self, user_id: &str) -> Result<Response> {
        self.send(
            instruction_types::USER_INSTRUCTION_RECORDING_DISABLE,
            &payload::UserKey { user_id: user_id.into() },
        )
        .await
    }

    pub async fn list_instruction_records(&mut self, user_id: &str) -> Result<Response> {
        self.send(
            instruction_types::USER_INSTRUCTION_RECORDS_LIST,
            &payload::UserKey { user_id: user_id.into() },
        )
        .await
    }

    pub async fn delete_instruction_records(&mut self, user_id: &str) -> Result<Response> {
        self.send(
            instruction_types::USER_INSTRUCTION_RECORDS_DELETE,
            &payload::UserKey { user_id: user_id.into() },
        )
        .await
    }

    // ── Chats ────────────────────────────────────────────────────────────────

    pub async fn create_chat(&mut self, title: &str, user_ids: &[String]) -> Result<Response> {
        self.send(
            instruction_types::CHAT_CREATE,
            &payload::ChatCreate { title: title.into(), user_ids: user_ids.to_vec() },
        )
        .await
    }

    pub async fn update_chat(&mut self, chat_id: &str, title: &str) -> Result<Response> {
        self.send(
            instruction_types::CHAT_UPDATE,
            &payload::ChatUpdate { chat_id: chat_id.into(), title: title.into() },
        )
        .await
    }

    pub async fn delete_chat(&mut self, chat_id: &str) -> Result<Response> {
        self.send(instruction_types::CHAT_DELETE, &payload::ChatKey { chat_id: chat_id.into() })
            .await
    }

    pub async fn load_chat(&mut self, chat_id: &str) -> Result<Response> {
        self.send(instruction_types::CHAT_LOAD, &payload::ChatKey { chat_id: chat_id.into() })
            .await
    }

    pub async fn list_chats(&mut self) -> Result<Response> {
        self.send(instruction_types::CHAT_LIST, &serde_json::Map::new()).await
    }

    pub async fn list_chats_by_user(&mut self, user_id: &str) -> Result<Response> {
        self.send(
            instruction_types::CHAT_LIST_BY_USER,
            &payload::UserKey { user_id: user_id.into() },
        )
        .await
    }

    // ── Providers and llms ───────────────────────────────────────────────────

    pub async fn add_provider(
        &mut self,
        name: &str,
        api_endpoint: &str,
        api_key: Option<&str>,
    ) -> Result<Response> {
        self.send(
            instruction_types::LLM_PROVIDER_ADD,
            &payload::ProviderAdd {
                name: name.into(),
                api_endpoint: api_endpoint.into(),
                api_key: api_key.map(Into::into),
            },
        )
        .await
    }

    pub async fn update_provider(
        &mut self,
        provider_id: &str,
        name: Option<&str>,
        api_endpoint: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<Response> {
        self.send(
            instruction_types::LLM_PROVIDER_UPDATE,
            &payload::ProviderUpdate {
                provider_id: provider_id.into(),
                name: name.map(Into::into),
                api_endpoint: api_endpoint.map(Into::into),
                api_key: api_key.map(Into::into),
            },
        )
        .await
    }

    pub async fn delete_provider(&mut self, provider_id: &str) -> Result<Response> {
        self.send(
            instruction_types::LLM_PROVIDER_DELETE,
            &payload::ProviderKey { provider_id: provider_id.into() },
        )
        .await
    }

    pub async fn list_providers(&mut self) -> Result<Response> {
        self.send(instruction_types::LLM_PROVIDER_LIST, &serde_json::Map::new()).await
    }

    pub async fn add_llm(&mut self, provider_id: &str, llm_name: &str) -> Result<Response> {
        self.send(
            instruction_types::LLM_ADD,
            &payload::LlmAdd { provider_id: provider_id.into(), llm_name: llm_name.into() },
        )
        .await
    }

    pub async fn update_llm(&mut self, llm_id: &str, llm_name: &str) -> Result<Response> {
        self.send(
            instruction_types::LLM_UPDATE,
            &payload::LlmUpdate { llm_id: llm_id.into(), llm_name: llm_name.into() },
        )
        .await
    }

    pub async fn delete_llm(&mut self, llm_id: &str) -> Result<Response> {
        self.send(instruction_types::LLM_DELETE, &payload::LlmKey { llm_id: llm_id.into() })
            .await
    }

    pub async fn list_llms(&mut self) -> Result<Response> {
        self.send(instruction_types::LLM_LIST, &serde_json::Map::new()).await
    }

    pub async fn list_llms_by_provider(&mut self, provider_id: &str) -> Result<Response> {
        self.send(
            instruction_types::LLM_LIST_BY_PROVIDER,
            &payload::ProviderKey { provider_id: provider_id.into() },
        )
        .await
    }

    // ── Responses ────────────────────────────────────────────────────────────

    pub async fn generate_response(
        &mut self,
        user_id: &str,
        chat_id: &str,
        provider_id: &str,
        llm_id: &str,
        user_input: &str,
    ) -> Result<Response> {
        self.send(
            instruction_types::LLM_RESPONSE_GENERATE,
            &payload::ResponseGenerate {
                user_id: user_id.into(),
                chat_id: chat_id.into(),
                provider_id: provider_id.into(),
                llm_id: llm_id.into(),
                user_input: user_input.into(),
            },
        )
        .await
    }

    pub async fn regenerate_response(&mut self, message_id: &str) -> Result<Response> {
        self.send(
            instruction_types::LLM_RESPONSE_REGENERATE,
            &payload::ResponseRegenerate { message_id: message_id.into() },
        )
        .await
    }
}
