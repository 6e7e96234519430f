//! Route handlers. Each one checks field shapes, forwards the instruction
//! through the shared caller client and returns the envelope verbatim.

use {
    axum::{
        Json, Router,
        extract::{Path, State, rejection::JsonRejection},
        routing::{delete, get, post, put},
    },
    serde::Deserialize,
    tracing::warn,
};

use chatlink_protocol::Response;

use crate::{ApiResult, AppState, validate};

/// Unwrap a transport result into an envelope. Domain failures already
/// arrive as error envelopes; only broker and codec failures end up here.
fn envelope(result: chatlink_client::Result<Response>) -> Json<Response> {
    Json(result.unwrap_or_else(|err| {
        warn!(error = %err, "instruction transport failed");
        Response::error(format!("Service unavailable: {err}"))
    }))
}

fn parse<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<Json<T>> {
    body.map_err(|rejection| Json(Response::error(format!("Invalid request body: {rejection}"))))
}

fn require<T>(field: &'static str, value: Option<T>) -> ApiResult<T> {
    value.ok_or_else(|| Json(Response::error(format!("{field} is required"))))
}

// ── Users ───────────────────────────────────────────────────────────────────

pub(crate) fn users() -> Router<AppState> {
    Router::new()
        .route("/user/create", post(create_user))
        .route("/user/update", put(update_user))
        .route("/user/delete", delete(delete_user))
        .route("/user/list", get(list_users))
        .route("/user/id/{user_id}", get(get_user_by_id))
        .route("/user/{user}", get(get_user))
        .route(
            "/user/{user}/instruction-recording/enable",
            post(enable_instruction_recording),
        )
        .route(
            "/user/{user}/instruction-recording/disable",
            post(disable_instruction_recording),
        )
        .route(
            "/user/{user}/instructions",
            get(list_instruction_records).delete(delete_instruction_records),
        )
}

#[derive(Deserialize)]
struct CreateUserBody {
    username: Option<String>,
    display_name: Option<String>,
    profile: Option<String>,
}

async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<CreateUserBody>, JsonRejection>,
) -> ApiResult<Json<Response>> {
    let Json(body) = parse(body)?;
    let username = require("username", body.username)?;
    validate::username(&username)?;
    Ok(envelope(
        state
            .client
            .lock()
            .await
            .create_user(&username, body.display_name.as_deref(), body.profile.as_deref())
            .await,
    ))
}

#[derive(Deserialize)]
struct UpdateUserBody {
    user_id: Option<String>,
    username: Option<String>,
    display_name: Option<String>,
    profile: Option<String>,
}

async fn update_user(
    State(state): State<AppState>,
    body: Result<Json<UpdateUserBody>, JsonRejection>,
) -> ApiResult<Json<Response>> {
    let Json(body) = parse(body)?;
    let user_id = require("user_id", body.user_id)?;
    if let Some(username) = &body.username {
        validate::username(username)?;
    }
    Ok(envelope(
        state
            .client
            .lock()
            .await
            .update_user(
                &user_id,
                body.username.as_deref(),
                body.display_name.as_deref(),
                body.profile.as_deref(),
            )
            .await,
    ))
}

#[derive(Deserialize)]
struct UserIdBody {
    user_id: Option<String>,
}

async fn delete_user(
    State(state): State<AppState>,
    body: Result<Json<UserIdBody>, JsonRejection>,
) -> ApiResult<Json<Response>> {
    let Json(body) = parse(body)?;
    let user_id = require("user_id", body.user_id)?;
    Ok(envelope(state.client.lock().await.delete_user(&user_id).await))
}

async fn list_users(State(state): State<AppState>) -> Json<Response> {
    envelope(state.client.lock().await.list_users().await)
}

async fn get_user(State(state): State<AppState>, Path(username): Path<String>) -> Json<Response> {
    envelope(state.client.lock().await.get_user(&username).await)
}

async fn get_user_by_id(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Response> {
    envelope(state.client.lock().await.get_user_by_id(&user_id).await)
}

async fn enable_instruction_recording(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Response> {
    envelope(state.client.lock().await.enable_instruction_recording(&user_id).await)
}

async fn disable_instruction_recording(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Response> {
    envelope(state.client.lock().await.disable_instruction_recording(&user_id).await)
}

async fn list_instruction_records(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Response> {
    envelope(state.client.lock().await.list_instruction_records(&user_id).await)
}

async fn delete_instruction_records(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Response> {
    envelope(state.client.lock().await.delete_instruction_records(&user_id).await)
}

// ── Chats ───────────────────────────────────────────────────────────────────

pub(crate) fn chats() -> Router<AppState> {
    Router::new()
        .route("/chat/create", post(create_chat))
        .route("/chat/update", put(update_chat))
        .route("/chat/delete", delete(delete_chat))
        .route("/chat/list", get(list_chats))
        .route("/chat/id/{chat_id}", get(load_chat))
        .route("/chat/user/{user_id}", get(list_chats_by_user))
}

#[derive(Deserialize)]
struct CreateChatBody {
    title: Option<String>,
    user_ids: Option<Vec<String>>,
}

async fn create_chat(
    State(state): State<AppState>,
    body: Result<Json<CreateChatBody>, JsonRejection>,
) -> ApiResult<Json<Response>> {
    let Json(body) = parse(body)?;
    let title = require("title", body.title)?;
    validate::length("title", &title, 1, 100)?;
    let user_ids = require("user_ids", body.user_ids)?;
    Ok(envelope(state.client.lock().await.create_chat(&title, &user_ids).await))
}

#[derive(Deserialize)]
struct UpdateChatBody {
    chat_id: Option<String>,
    title: Option<String>,
}

async fn update_chat(
    State(state): State<AppState>,
    body: Result<Json<UpdateChatBody>, JsonRejection>,
) -> ApiResult<Json<Response>> {
    let Json(body) = parse(body)?;
    let chat_id = require("chat_id", body.chat_id)?;
    let title = require("title", body.title)?;
    validate::length("title", &title, 1, 100)?;
    Ok(envelope(state.client.lock().await.update_chat(&chat_id, &title).await))
}

#[derive(Deserialize)]
struct ChatIdBody {
    chat_id: Option<String>,
}

async fn delete_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatIdBody>, JsonRejection>,
) -> ApiResult<Json<Response>> {
    let Json(body) = parse(body)?;
    let chat_id = require("chat_id", body.chat_id)?;
    Ok(envelope(state.client.lock().await.delete_chat(&chat_id).await))
}

async fn list_chats(State(state): State<AppState>) -> Json<Response> {
    envelope(state.client.lock().await.list_chats().await)
}

async fn load_chat(State(state): State<AppState>, Path(chat_id): Path<String>) -> Json<Response> {
    envelope(state.client.lock().await.load_chat(&chat_id).await)
}

async fn list_chats_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Response> {
    envelope(state.client.lock().await.list_chats_by_user(&user_id).await)
}

// ── Providers and LLMs ──────────────────────────────────────────────────────

pub(crate) fn llms() -> Router<AppState> {
    Router::new()
        .route("/llm_provider/add", post(add_provider))
        .route("/llm_provider/update", put(update_provider))
        .route("/llm_provider/delete", delete(delete_provider))
        .route("/llm_provider/list", get(list_providers))
        .route("/llm/add", post(add_llm))
        .route("/llm/update", put(update_llm))
        .route("/llm/delete", delete(delete_llm))
        .route("/llm/list", get(list_llms))
        .route("/llm/llm_provider/{provider_id}", get(list_llms_by_provider))
        .route("/llm/response_generate", post(generate_response))
        .route("/llm/response_regenerate", post(regenerate_response))
}

#[derive(Deserialize)]
struct AddProviderBody {
    name: Option<String>,
    api_endpoint: Option<String>,
    api_key: Option<String>,
}

async fn add_provider(
    State(state): State<AppState>,
    body: Result<Json<AddProviderBody>, JsonRejection>,
) -> ApiResult<Json<Response>> {
    let Json(body) = parse(body)?;
    let name = require("name", body.name)?;
    validate::length("name", &name, 1, 100)?;
    let api_endpoint = require("api_endpoint", body.api_endpoint)?;
    validate::length("api_endpoint", &api_endpoint, 1, 255)?;
    if let Some(api_key) = &body.api_key {
        validate::max_length("api_key", api_key, 255)?;
    }
    Ok(envelope(
        state
            .client
            .lock()
            .await
            .add_provider(&name, &api_endpoint, body.api_key.as_deref())
            .await,
    ))
}

#[derive(Deserialize)]
struct UpdateProviderBody {
    provider_id: Option<String>,
    name: Option<String>,
    api_endpoint: Option<String>,
    api_key: Option<String>,
}

async fn update_provider(
    State(state): State<AppState>,
    body: Result<Json<UpdateProviderBody>, JsonRejection>,
) -> ApiResult<Json<Response>> {
    let Json(body) = parse(body)?;
    let provider_id = require("provider_id", body.provider_id)?;
    if let Some(name) = &body.name {
        validate::length("name", name, 1, 100)?;
    }
    if let Some(api_endpoint) = &body.api_endpoint {
        validate::length("api_endpoint", api_endpoint, 1, 255)?;
    }
    if let Some(api_key) = &body.api_key {
        validate::max_length("api_key", api_key, 255)?;
    }
    Ok(envelope(
        state
            .client
            .lock()
            .await
            .update_provider(
                &provider_id,
                body.name.as_deref(),
                body.api_endpoint.as_deref(),
                body.api_key.as_deref(),
            )
            .await,
    ))
}

#[derive(Deserialize)]
struct ProviderIdBody {
    provider_id: Option<String>,
}

async fn delete_provider(
    State(state): State<AppState>,
    body: Result<Json<ProviderIdBody>, JsonRejection>,
) -> ApiResult<Json<Response>> {
    let Json(body) = parse(body)?;
    let provider_id = require("provider_id", body.provider_id)?;
    Ok(envelope(state.client.lock().await.delete_provider(&provider_id).await))
}

async fn list_providers(State(state): State<AppState>) -> Json<Response> {
    envelope(state.client.lock().await.list_providers().await)
}

#[derive(Deserialize)]
struct AddLlmBody {
    provider_id: Option<String>,
    llm_name: Option<String>,
}

async fn add_llm(
    State(state): State<AppState>,
    body: Result<Json<AddLlmBody>, JsonRejection>,
) -> ApiResult<Json<Response>> {
    let Json(body) = parse(body)?;
    let provider_id = require("provider_id", body.provider_id)?;
    let llm_name = require("llm_name", body.llm_name)?;
    validate::length("llm_name", &llm_name, 1, 100)?;
    Ok(envelope(state.client.lock().await.add_llm(&provider_id, &llm_name).await))
}

#[derive(Deserialize)]
struct UpdateLlmBody {
    llm_id: Option<String>,
    llm_name: Option<String>,
}

async fn update_llm(
    State(state): State<AppState>,
    body: Result<Json<UpdateLlmBody>, JsonRejection>,
) -> ApiResult<Json<Response>> {
    let Json(body) = parse(body)?;
    let llm_id = require("llm_id", body.llm_id)?;
    let llm_name = require("llm_name", body.llm_name)?;
    validate::length("llm_name", &llm_name, 1, 100)?;
    Ok(envelope(state.client.lock().await.update_llm(&llm_id, &llm_name).await))
}

#[derive(Deserialize)]
struct LlmIdBody {
    llm_id: Option<String>,
}

async fn delete_llm(
    State(state): State<AppState>,
    body: Result<Json<LlmIdBody>, JsonRejection>,
) -> ApiResult<Json<Response>> {
    let Json(body) = parse(body)?;
    let llm_id = require("llm_id", body.llm_id)?;
    Ok(envelope(state.client.lock().await.delete_llm(&llm_id).await))
}

async fn list_llms(State(state): State<AppState>) -> Json<Response> {
    envelope(state.client.lock().await.list_llms().await)
}

async fn list_llms_by_provider(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> Json<Response> {
    envelope(state.client.lock().await.list_llms_by_provider(&provider_id).await)
}

#[derive(Deserialize)]
struct GenerateResponseBody {
    user_id: Option<String>,
    chat_id: Option<String>,
    provider_id: Option<String>,
    llm_id: Option<String>,
    user_input: Option<String>,
}

async fn generate_response(
    State(state): State<AppState>,
    body: Result<Json<GenerateResponseBody>, JsonRejection>,
) -> ApiResult<Json<Response>> {
    let Json(body) = parse(body)?;
    let user_id = require("user_id", body.user_id)?;
    let chat_id = require("chat_id", body.chat_id)?;
    let provider_id = require("provider_id", body.provider_id)?;
    let llm_id = require("llm_id", body.llm_id)?;
    let user_input = require("user_input", body.user_input)?;
    validate::not_empty("user_input", &user_input)?;
    Ok(envelope(
        state
            .client
            .lock()
            .await
            .generate_response(&user_id, &chat_id, &provider_id, &llm_id, &user_input)
            .await,
    ))
}

#[derive(Deserialize)]
struct RegenerateResponseBody {
    message_id: Option<String>,
}

async fn regenerate_response(
    State(state): State<AppState>,
    body: Result<Json<RegenerateResponseBody>, JsonRejection>,
) -> ApiResult<Json<Response>> {
    let Json(body) = parse(body)?;
    let message_id = require("message_id", body.message_id)?;
    Ok(envelope(state.client.lock().await.regenerate_response(&message_id).await))
}
