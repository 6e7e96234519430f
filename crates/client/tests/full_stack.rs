#![allow(clippy::unwrap_used, clippy::expect_used)]
//! The typed client against a live worker: broker, storage, units, and a fake
//! completion endpoint wired together in one process.

use std::time::Duration;

use {serde_json::json, tokio::net::TcpListener, tokio_util::sync::CancellationToken};

use {
    chatlink_client::{ChatLinkClient, ClientError},
    chatlink_mq::{Broker, MqConfig, MqError},
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
    broker: Broker,
    config: MqConfig,
    storage: Storage,
    shutdown: CancellationToken,
}

async fn rig() -> Rig {
    let config = fast_config();
    let broker = Broker::new(&config);
    let storage = Storage::in_memory().await.unwrap();
    let shutdown = CancellationToken::new();
    let worker = Worker::new(broker.clone(), config.clone(), storage.clone());
    tokio::spawn(worker.run(shutdown.clone()));
    Rig { broker, config, storage, shutdown }
}

async fn client(rig: &Rig) -> ChatLinkClient {
    ChatLinkClient::connect(rig.broker.clone(), rig.config.clone()).await.unwrap()
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
async fn catalog_methods_round_trip() {
    let rig = rig().await;
    let mut client = client(&rig).await;

    let alice = client.create_user("alice", None, Some("day shift")).await.unwrap();
    assert!(alice.is_success(), "{}", alice.message);
    assert_eq!(alice.data["user"]["display_name"], "alice", "display name defaults to username");
    let alice_id = alice.data["user"]["user_id"].as_str().unwrap().to_string();

    let bob = client.create_user("bob", Some("Bob"), None).await.unwrap();
    let bob_id = bob.data["user"]["user_id"].as_str().unwrap().to_string();

    let chat = client.create_chat("Standup", &[alice_id.clone(), bob_id.clone()]).await.unwrap();
    assert!(chat.is_success(), "{}", chat.message);
    assert_eq!(chat.data["chat"]["users"].as_array().unwrap().len(), 2);
    let chat_id = chat.data["chat"]["chat_id"].as_str().unwrap().to_string();

    let renamed = client.update_chat(&chat_id, "Retro").await.unwrap();
    assert_eq!(renamed.data["chat"]["title"], "Retro");

    let mine = client.list_chats_by_user(&alice_id).await.unwrap();
    assert_eq!(mine.data["chats"].as_array().unwrap().len(), 1);

    client.delete_user(&bob_id).await.unwrap();
    let loaded = client.load_chat(&chat_id).await.unwrap();
    assert_eq!(
        loaded.data["chat"]["users"].as_array().unwrap().len(),
        1,
        "deleted members drop out of the rendered chat"
    );

    rig.shutdown.cancel();
}

#[tokio::test]
async fn domain_failures_are_envelopes_not_errors() {
    let rig = rig().await;
    let mut client = client(&rig).await;

    client.create_user("alice", None, None).await.unwrap();
    let dup = client.create_user("alice", None, None).await.unwrap();
    assert!(!dup.is_success());
    assert!(dup.message.contains("already exists"));
    assert_eq!(dup.data, json!({}));

    let missing = client.load_chat("no-such-chat").await.unwrap();
    assert!(!missing.is_success());
    assert!(missing.message.contains("not found"));

    rig.shutdown.cancel();
}

#[tokio::test]
async fn responses_generate_and_regenerate_through_the_full_stack() {
    let rig = rig().await;
    let mut client = client(&rig).await;
    let endpoint = fake_endpoint("Hello from the model").await;

    let user_id = client.create_user("alice", None, None).await.unwrap().data["user"]["user_id"]
        .as_str()
        .unwrap()
        .to_string();
    let chat_id = client.create_chat("Chat", std::slice::from_ref(&user_id)).await.unwrap().data
        ["chat"]["chat_id"]
        .as_str()
        .unwrap()
        .to_string();
    let provider_id = client.add_provider("local", &endpoint, Some("k-123")).await.unwrap().data
        ["provider"]["provider_id"]
        .as_str()
        .unwrap()
        .to_string();
    let llm_id = client.add_llm(&provider_id, "tiny-model").await.unwrap().data["llm"]["llm_id"]
        .as_str()
        .unwrap()
        .to_string();

    let generated = client
        .generate_response(&user_id, &chat_id, &provider_id, &llm_id, "Hi!")
        .await
        .unwrap();
    assert!(generated.is_success(), "{}", generated.message);
    assert_eq!(generated.message, "Response generated successfully");
    let reply = &generated.data["llm_response"];
    assert_eq!(reply["role"], "assistant");
    assert_eq!(reply["content"], "Hello from the model");
    let message_id = reply["message_id"].as_str().unwrap().to_string();

    let regenerated = client.regenerate_response(&message_id).await.unwrap();
    assert!(regenerated.is_success(), "{}", regenerated.message);
    assert_eq!(regenerated.data["llm_response"]["content"], "Hello from the model");

    // User turn, first assistant turn, regenerated assistant turn.
    let history = rig.storage.list_messages_by_chat(&chat_id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].role, "user");
    assert_eq!(history[0].content, "Hi!");

    rig.shutdown.cancel();
}

#[tokio::test]
async fn missing_worker_surfaces_a_transport_error() {
    let config = fast_config();
    let broker = Broker::new(&config);
    let mut client = ChatLinkClient::connect(broker, config).await.unwrap();
    let err = client.list_users().await.unwrap_err();
    assert!(matches!(err, ClientError::Mq(MqError::ReplyTimeout)));
}
