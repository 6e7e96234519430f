#![allow(clippy::unwrap_used, clippy::expect_used)]
//! The worker loop end to end: a real broker, real storage, and RPC clients
//! on the far side of the shared instruction queue.

use std::time::Duration;

use {serde_json::{Value, json}, tokio_util::sync::CancellationToken};

use {
    chatlink_mq::{Broker, ConsumeOptions, MqConfig, Publication, RpcClient},
    chatlink_protocol::{Response, instruction_types},
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
    worker: tokio::task::JoinHandle<chatlink_worker::Result<()>>,
}

impl Rig {
    async fn start() -> Self {
        Self::tuned(|worker| worker).await
    }

    async fn tuned(tune: impl FnOnce(Worker) -> Worker) -> Self {
        let config = fast_config();
        let broker = Broker::new(&config);
        let storage = Storage::in_memory().await.unwrap();
        let shutdown = CancellationToken::new();
        let worker = tune(Worker::new(broker.clone(), config.clone(), storage.clone()));
        let worker = tokio::spawn(worker.run(shutdown.clone()));
        Self { broker, config, storage, shutdown, worker }
    }

    async fn client(&self) -> RpcClient {
        RpcClient::connect(self.broker.clone(), self.config.clone()).await.unwrap()
    }
}

async fn call(client: &mut RpcClient, ty: &str, data: Value) -> Response {
    let body = serde_json::to_vec(&json!({"type": ty, "data": data})).unwrap();
    Response::from_slice(&client.call(&body).await.unwrap()).unwrap()
}

/// Creating a user and fetching it back through separate instructions returns
/// the same public id.
#[tokio::test]
async fn instructions_round_trip_with_correlated_replies() {
    let rig = Rig::start().await;
    let mut client = rig.client().await;

    let created = call(
        &mut client,
        instruction_types::USER_CREATE,
        json!({"username": "alice", "display_name": "Alice"}),
    )
    .await;
    assert!(created.is_success(), "{}", created.message);
    let user_id = created.data["user"]["user_id"].as_str().unwrap().to_string();

    let fetched =
        call(&mut client, instruction_types::USER_GET, json!({"username": "alice"})).await;
    assert!(fetched.is_success());
    assert_eq!(fetched.data["user"]["user_id"], user_id.as_str());

    rig.shutdown.cancel();
}

#[tokio::test]
async fn concurrent_clients_get_their_own_replies() {
    let rig = Rig::start().await;
    let mut alpha = rig.client().await;
    let mut beta = rig.client().await;

    let (a, b) = tokio::join!(
        call(&mut alpha, instruction_types::USER_CREATE, json!({"username": "alpha"})),
        call(&mut beta, instruction_types::USER_CREATE, json!({"username": "beta"})),
    );
    assert_eq!(a.data["user"]["username"], "alpha");
    assert_eq!(b.data["user"]["username"], "beta");

    rig.shutdown.cancel();
}

/// Domain failures are error envelopes on the reply queue, not redeliveries;
/// the worker keeps serving afterwards.
#[tokio::test]
async fn business_errors_come_back_as_envelopes() {
    let rig = Rig::start().await;
    let mut client = rig.client().await;

    call(&mut client, instruction_types::USER_CREATE, json!({"username": "alice"})).await;
    let dup =
        call(&mut client, instruction_types::USER_CREATE, json!({"username": "alice"})).await;
    assert!(!dup.is_success());
    assert!(dup.message.contains("already exists"));
    assert_eq!(dup.data, json!({}));

    let listed = call(&mut client, instruction_types::USER_LIST, json!({})).await;
    assert!(listed.is_success());
    assert_eq!(listed.data["users"].as_array().unwrap().len(), 1);

    rig.shutdown.cancel();
}

/// Valid JSON with the wrong shape is answered, not requeued.
#[tokio::test]
async fn shape_violations_are_answered_with_error_envelopes() {
    let rig = Rig::start().await;
    let mut client = rig.client().await;

    let reply = Response::from_slice(&client.call(b"[1, 2, 3]").await.unwrap()).unwrap();
    assert!(!reply.is_success());
    assert_eq!(reply.message, "Instruction must be a JSON object");

    let reply = Response::from_slice(&client.call(b"{\"type\": \"\"}").await.unwrap()).unwrap();
    assert_eq!(reply.message, "Instruction type is required");

    rig.shutdown.cancel();
}

/// A body that is not JSON at all blocks the queue head only until the
/// redelivery cap drops it.
#[tokio::test]
async fn undecodable_bodies_are_dropped_at_the_redelivery_cap() {
    let rig = Rig::tuned(|worker| worker.with_redelivery_cap(1)).await;

    // Publish the poison straight onto the request queue, addressed to a live
    // reply queue so only the body is at fault.
    let conn = rig.broker.connect(&rig.config.connect_params()).unwrap();
    conn.declare_queue(&rig.config.request_queue).unwrap();
    let reply_queue = conn.declare_reply_queue().unwrap();
    let _replies = conn.consume(&reply_queue, ConsumeOptions::auto_ack()).unwrap();
    conn.publish(
        &rig.config.request_queue,
        Publication {
            body: b"not json at all".to_vec(),
            correlation_id: Some("poison".into()),
            reply_to: Some(reply_queue),
            persistent: true,
        },
    )
    .unwrap();

    // The queue drains past the poison: a later instruction still gets served.
    let mut client = rig.client().await;
    let listed = call(&mut client, instruction_types::USER_LIST, json!({})).await;
    assert!(listed.is_success());

    rig.shutdown.cancel();
}

/// An instruction published without a reply address never executes.
#[tokio::test]
async fn deliveries_without_a_reply_address_run_no_side_effects() {
    let rig = Rig::tuned(|worker| worker.with_redelivery_cap(1)).await;

    let conn = rig.broker.connect(&rig.config.connect_params()).unwrap();
    conn.declare_queue(&rig.config.request_queue).unwrap();
    let body =
        serde_json::to_vec(&json!({"type": "USER_CREATE", "data": {"username": "ghost"}})).unwrap();
    conn.publish(&rig.config.request_queue, Publication::new(body)).unwrap();

    let mut client = rig.client().await;
    let listed = call(&mut client, instruction_types::USER_LIST, json!({})).await;
    assert!(listed.is_success());
    assert!(listed.data["users"].as_array().unwrap().is_empty(), "ghost must not be created");
    assert!(rig.storage.get_user_by_username("ghost").await.unwrap_err().is_not_found());

    rig.shutdown.cancel();
}

/// The audit side-channel records instruction types for opted-in users only,
/// and only once the flag is already set.
#[tokio::test]
async fn audit_records_instructions_for_opted_in_users() {
    let rig = Rig::start().await;
    let mut client = rig.client().await;

    let alice = call(&mut client, instruction_types::USER_CREATE, json!({"username": "alice"}))
        .await
        .data["user"]["user_id"]
        .as_str()
        .unwrap()
        .to_string();
    let bob = call(&mut client, instruction_types::USER_CREATE, json!({"username": "bob"}))
        .await
        .data["user"]["user_id"]
        .as_str()
        .unwrap()
        .to_string();

    // The enable instruction itself is audited before the flag flips, so it
    // does not appear in the trail.
    let enabled = call(
        &mut client,
        instruction_types::USER_INSTRUCTION_RECORDING_ENABLE,
        json!({"user_id": alice}),
    )
    .await;
    assert!(enabled.is_success(), "{}", enabled.message);

    for user_id in [&alice, &bob] {
        let listed = call(
            &mut client,
            instruction_types::CHAT_LIST_BY_USER,
            json!({"user_id": user_id}),
        )
        .await;
        assert!(listed.is_success(), "{}", listed.message);
    }

    let trail = rig.storage.list_instruction_records(&alice).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].instruction, "CHAT_LIST_BY_USER");
    assert!(rig.storage.list_instruction_records(&bob).await.unwrap().is_empty());

    rig.shutdown.cancel();
}

/// Stopping and restarting the broker loses nobody: the worker reattaches and
/// the client reopens its connection on the next call.
#[tokio::test]
async fn worker_reattaches_after_a_broker_restart() {
    let rig = Rig::start().await;
    let mut client = rig.client().await;

    let first =
        call(&mut client, instruction_types::USER_CREATE, json!({"username": "alice"})).await;
    assert!(first.is_success());

    rig.broker.stop();
    rig.broker.restart();

    let second = call(&mut client, instruction_types::USER_GET, json!({"username": "alice"})).await;
    assert!(second.is_success(), "{}", second.message);

    rig.shutdown.cancel();
}

#[tokio::test]
async fn cancellation_stops_the_loop_cleanly() {
    let rig = Rig::start().await;
    let mut client = rig.client().await;
    call(&mut client, instruction_types::USER_LIST, json!({})).await;

    rig.shutdown.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(1), rig.worker).await;
    assert!(outcome.unwrap().unwrap().is_ok());
}
