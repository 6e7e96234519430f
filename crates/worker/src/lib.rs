//! Single-consumer worker loop.
//!
//! One worker drains the shared instruction queue with prefetch 1: decode,
//! audit, dispatch, reply, ack — strictly one message at a time. Processing
//! failures (missing reply address, undecodable body, reply publish failure)
//! requeue the delivery; a message redelivered past the cap is acked and
//! dropped instead, so a poison message cannot wedge the queue.

use {
    serde_json::Value,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use {
    chatlink_mq::{
        Broker, Connection, ConsumeOptions, Consumer, Delivery, MqConfig, MqError, Publication,
        retry,
    },
    chatlink_storage::Storage,
    chatlink_units::Router,
};

/// Redeliveries after which a failing message is dropped instead of requeued.
const MAX_REDELIVERIES: u32 = 5;

pub type Result<T> = std::result::Result<T, WorkerError>;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Undecodable instruction body or unencodable reply.
    #[error("invalid message body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("delivery carries no reply address")]
    MissingReplyAddress,
    #[error(transparent)]
    Mq(#[from] MqError),
}

pub struct Worker {
    broker: Broker,
    config: MqConfig,
    storage: Storage,
    router: Router,
    max_redeliveries: u32,
}

impl Worker {
    pub fn new(broker: Broker, config: MqConfig, storage: Storage) -> Self {
        let router = Router::new(storage.clone());
        Self { broker, config, storage, router, max_redeliveries: MAX_REDELIVERIES }
    }

    /// Replace the poison-message bound.
    #[must_use]
    pub fn with_redelivery_cap(mut self, cap: u32) -> Self {
        self.max_redeliveries = cap;
        self
    }

    /// Consume until `shutdown` is cancelled or the broker stays unreachable
    /// past the retry bound. A delivery already received when cancellation
    /// arrives is finished and settled before returning.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        loop {
            let (conn, mut deliveries) = tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                attached = self.attach() => attached?,
            };
            info!(queue = %self.config.request_queue, "worker consuming");
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        info!("worker stopping");
                        return Ok(());
                    }
                    delivery = deliveries.recv() => {
                        let Some(delivery) = delivery else { break };
                        self.process(&conn, &deliveries, delivery).await;
                    }
                }
            }
            warn!("worker connection lost, reattaching");
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }

    async fn attach(&self) -> Result<(Connection, Consumer)> {
        let attached =
            retry::with_fixed_delay(self.config.max_retries, self.config.retry_delay, || {
                let conn = self.broker.connect(&self.config.connect_params())?;
                conn.declare_queue(&self.config.request_queue)?;
                let deliveries =
                    conn.consume(&self.config.request_queue, ConsumeOptions::manual(1))?;
                Ok((conn, deliveries))
            })
            .await?;
        Ok(attached)
    }

    async fn process(&self, conn: &Connection, deliveries: &Consumer, delivery: Delivery) {
        match self.execute(conn, &delivery).await {
            Ok(()) => deliveries.ack(&delivery),
            Err(err) if delivery.redelivered >= self.max_redeliveries => {
                error!(
                    error = %err,
                    redelivered = delivery.redelivered,
                    "dropping message after repeated failures"
                );
                deliveries.ack(&delivery);
            }
            Err(err) => {
                warn!(error = %err, "processing failed, requeueing");
                deliveries.nack_requeue(&delivery);
            }
        }
    }

    async fn execute(&self, conn: &Connection, delivery: &Delivery) -> Result<()> {
        // Refuse before executing: an instruction whose reply is undeliverable
        // must not run its side effects on every redelivery.
        let reply_to = delivery.reply_to.as_deref().ok_or(WorkerError::MissingReplyAddress)?;
        let raw: Value = serde_json::from_slice(&delivery.body)?;
        self.audit(&raw).await;
        let response = self.router.dispatch(&raw).await;
        conn.publish(
            reply_to,
            Publication {
                body: response.to_bytes()?,
                correlation_id: delivery.correlation_id.clone(),
                reply_to: None,
                persistent: true,
            },
        )?;
        debug!(reply_to, status = ?response.status, "reply published");
        Ok(())
    }

    /// Record the instruction type for opted-in users before executing it.
    /// Best-effort: failures are logged and never change the outcome.
    async fn audit(&self, raw: &Value) {
        let Some(instruction_type) = raw["type"].as_str() else { return };
        let Some(user_id) = raw["data"]["user_id"].as_str() else { return };
        let user = match self.storage.get_user(user_id).await {
            Ok(user) => user,
            Err(err) => {
                debug!(user_id, error = %err, "audit lookup skipped");
                return;
            }
        };
        if !user.record_instructions {
            return;
        }
        let chat_id = raw["data"]["chat_id"].as_str();
        match self.storage.record_instruction(user_id, chat_id, instruction_type).await {
            Ok(()) => debug!(user_id, instruction_type, "instruction recorded"),
            Err(err) => warn!(user_id, error = %err, "failed to record instruction"),
        }
    }
}
