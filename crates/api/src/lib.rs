//! REST facade over the instruction queue.
//!
//! Every instruction type gets one route; handlers check field shapes, build
//! the instruction through [`ChatLinkClient`] and hand the reply envelope
//! back verbatim. Handled requests always answer HTTP 200: validation
//! failures and transport failures become error envelopes, exactly like any
//! domain error, so callers only ever parse one response shape.

use std::sync::Arc;

use {
    axum::{Json, Router},
    tokio::sync::Mutex,
};

use {chatlink_client::ChatLinkClient, chatlink_protocol::Response};

mod routes;
mod validate;

pub(crate) type ApiResult<T> = Result<T, Json<Response>>;

/// Shared handler state. The caller client holds one reply queue, so HTTP
/// handlers serialize on it; instruction throughput is bounded by the single
/// worker anyway.
#[derive(Clone)]
pub struct AppState {
    client: Arc<Mutex<ChatLinkClient>>,
}

impl AppState {
    pub fn new(client: ChatLinkClient) -> Self {
        Self { client: Arc::new(Mutex::new(client)) }
    }
}

/// Build the full route table over one shared caller client.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::users())
        .merge(routes::chats())
        .merge(routes::llms())
        .with_state(state)
}
