#![allow(clippy::unwrap_used, clippy::expect_used)]
//! The REST surface against a live worker. Every handled route answers
//! HTTP 200 with an envelope, whether the outcome is success, a field-shape
//! failure, or a domain error.

use std::time::Duration;

use {
    serde_json::{Value, json},
    tokio::net::TcpListener,
    tokio_util::sync::CancellationToken,
};

use {
    chatlink_api::AppState,
    chatlink_client::ChatLinkClient,
    chatlink_mq::{Broker, MqConfig},
    chatlink_storage::Storage,
    chatlink_worker::Worker,
};

fn fast_config() -> MqConfig {
    MqConfig {
        max_retries: 3,
        retry_delay: Duration::from_millis(20),
        reply_timeout: Duration::from_millis(500),
        ..MqConfig::default()
    }
}

struct Rig {
    base: String,
    http: reqwest::Client,
    storage: Storage,
    _shutdown: CancellationToken,
}

impl Rig {
    async fn post(&self, path: &str, body: Value) -> Value {
        self.send(self.http.post(format!("{}{path}", self.base)).json(&body)).await
    }

    async fn put(&self, path: &str, body: Value) -> Value {
        self.send(self.http.put(format!("{}{path}", self.base)).json(&body)).await
    }

    async fn delete(&self, path: &str, body: Value) -> Value {
        self.send(self.http.delete(format!("{}{path}", self.base)).json(&body)).await
    }

    async fn get(&self, path: &str) -> Value {
        self.send(self.http.get(format!("{}{path}", self.base))).await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Value {
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), 200);
        response.json().await.unwrap()
    }
}

async fn rig() -> Rig {
    let config = fast_config();
    let broker = Broker::new(&config);
    let storage = Storage::in_memory().await.unwrap();
    let shutdown = CancellationToken::new();
    let worker = Worker::new(broker.clone(), config.clone(), storage.clone());
    tokio::spawn(worker.run(shutdown.clone()));

    let client = ChatLinkClient::connect(broker, config).await.unwrap();
    let app = chatlink_api::app(AppState::new(client));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Rig {
        base: format!("http://{addr}"),
        http: reqwest::Client::new(),
        storage,
        _shutdown: shutdown,
    }
}

/// OpenAI-style completion endpoint that always answers `reply`.
async fn fake_endpoint(reply: &'static str) -> String {
    let app = axum::Router::new().route(
        "/v1/chat/completions",
        axum::routing::post(move || async move {
            axum::Json(json!({
                "choices": [{"message": {"role": "assistant", "content": reply}}]
            }))
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1/chat/completions")
}

#[tokio::test]
async fn user_routes_round_trip() {
    let rig = rig().await;

    let created = rig.post("/user/create", json!({"username": "alice", "profile": "ops"})).await;
    assert_eq!(created["status"], "success", "{created}");
    assert_eq!(created["data"]["user"]["display_name"], "alice");
    let user_id = created["data"]["user"]["user_id"].as_str().unwrap().to_string();

    let by_name = rig.get("/user/alice").await;
    assert_eq!(by_name["data"]["user"]["user_id"].as_str().unwrap(), user_id);

    let by_id = rig.get(&format!("/user/id/{user_id}")).await;
    assert_eq!(by_id["data"]["user"]["username"], "alice");

    let listed = rig.get("/user/list").await;
    assert_eq!(listed["data"]["users"].as_array().unwrap().len(), 1);

    let renamed = rig
        .put(
            "/user/update",
            json!({"user_id": user_id, "username": "alice_2", "display_name": "Alice"}),
        )
        .await;
    assert_eq!(renamed["status"], "success", "{renamed}");
    assert_eq!(renamed["data"]["user"]["username"], "alice_2");

    let deleted = rig.delete("/user/delete", json!({"user_id": user_id})).await;
    assert_eq!(deleted["status"], "success", "{deleted}");

    let missing = rig.get("/user/alice_2").await;
    assert_eq!(missing["status"], "error");
}

#[tokio::test]
async fn field_shapes_are_checked_before_queueing() {
    let rig = rig().await;

    let bad_username = rig.post("/user/create", json!({"username": "9lives"})).await;
    assert_eq!(bad_username["status"], "error");
    assert!(
        bad_username["message"].as_str().unwrap().contains("username"),
        "{bad_username}"
    );

    let missing = rig.post("/user/create", json!({})).await;
    assert_eq!(missing["message"], "username is required");

    let long_title =
        rig.post("/chat/create", json!({"title": "t".repeat(101), "user_ids": []})).await;
    assert_eq!(long_title["message"], "title must be 1-100 characters");

    let partial = rig.post("/llm/response_generate", json!({"user_id": "u-1"})).await;
    assert_eq!(partial["message"], "chat_id is required");

    let empty_input = rig
        .post(
            "/llm/response_generate",
            json!({
                "user_id": "u", "chat_id": "c", "provider_id": "p",
                "llm_id": "l", "user_input": ""
            }),
        )
        .await;
    assert_eq!(empty_input["message"], "user_input must not be empty");

    // No body at all is still a 200 envelope, not an axum rejection.
    let response = rig.http.post(format!("{}/user/create", rig.base)).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let no_body: Value = response.json().await.unwrap();
    assert_eq!(no_body["status"], "error");
    assert!(
        no_body["message"].as_str().unwrap().starts_with("Invalid request body"),
        "{no_body}"
    );
}

#[tokio::test]
async fn catalog_and_generation_flow_over_http() {
    let rig = rig().await;
    let endpoint = fake_endpoint("Hello from the model.").await;

    let alice = rig.post("/user/create", json!({"username": "alice"})).await;
    let user_id = alice["data"]["user"]["user_id"].as_str().unwrap().to_string();

    let chat = rig.post("/chat/create", json!({"title": "Ops", "user_ids": [user_id]})).await;
    assert_eq!(chat["status"], "success", "{chat}");
    let chat_id = chat["data"]["chat"]["chat_id"].as_str().unwrap().to_string();

    let provider = rig
        .post(
            "/llm_provider/add",
            json!({"name": "local", "api_endpoint": endpoint, "api_key": "sk-test"}),
        )
        .await;
    let provider_id = provider["data"]["provider"]["provider_id"].as_str().unwrap().to_string();

    let llm = rig
        .post("/llm/add", json!({"provider_id": provider_id, "llm_name": "test-model"}))
        .await;
    let llm_id = llm["data"]["llm"]["llm_id"].as_str().unwrap().to_string();

    let generated = rig
        .post(
            "/llm/response_generate",
            json!({
                "user_id": user_id, "chat_id": chat_id, "provider_id": provider_id,
                "llm_id": llm_id, "user_input": "Hi there"
            }),
        )
        .await;
    assert_eq!(generated["status"], "success", "{generated}");
    assert_eq!(generated["data"]["llm_response"]["content"], "Hello from the model.");
    let message_id = generated["data"]["llm_response"]["message_id"].as_str().unwrap().to_string();

    let regenerated =
        rig.post("/llm/response_regenerate", json!({"message_id": message_id})).await;
    assert_eq!(regenerated["status"], "success", "{regenerated}");
    assert_eq!(regenerated["data"]["llm_response"]["role"], "assistant");

    let models = rig.get(&format!("/llm/llm_provider/{provider_id}")).await;
    assert_eq!(models["data"]["llms"].as_array().unwrap().len(), 1);

    let renamed = rig
        .put("/llm_provider/update", json!({"provider_id": provider_id, "name": "local-2"}))
        .await;
    assert_eq!(renamed["data"]["provider"]["name"], "local-2");

    // One user turn plus the generated and regenerated assistant turns.
    let history = rig.storage.list_messages_by_chat(&chat_id).await.unwrap();
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn instruction_recording_flow_over_http() {
    let rig = rig().await;

    let created = rig.post("/user/create", json!({"username": "alice"})).await;
    let user_id = created["data"]["user"]["user_id"].as_str().unwrap().to_string();

    let enabled =
        rig.post(&format!("/user/{user_id}/instruction-recording/enable"), json!({})).await;
    assert_eq!(enabled["message"], "Instruction recording enabled");

    // A user-scoped instruction lands in the trail.
    rig.get(&format!("/chat/user/{user_id}")).await;

    let records = rig.get(&format!("/user/{user_id}/instructions")).await;
    let kinds: Vec<&str> = records["data"]["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["instruction"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"CHAT_LIST_BY_USER"), "{kinds:?}");
    // The listing itself carries the user id, so it records itself too.
    assert!(kinds.contains(&"USER_INSTRUCTION_RECORDS_LIST"), "{kinds:?}");

    let disabled =
        rig.post(&format!("/user/{user_id}/instruction-recording/disable"), json!({})).await;
    assert_eq!(disabled["message"], "Instruction recording disabled");

    let cleared = rig.delete(&format!("/user/{user_id}/instructions"), json!({})).await;
    assert_eq!(cleared["message"], "Instruction records deleted");

    let after = rig.get(&format!("/user/{user_id}/instructions")).await;
    assert!(after["data"]["records"].as_array().unwrap().is_empty(), "{after}");
}
