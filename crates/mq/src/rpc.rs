//! RPC-over-queue transport.
//!
//! `RpcClient` gives callers synchronous call semantics over the asynchronous
//! broker: each call publishes one instruction to the shared request queue
//! with a fresh correlation token and this client's private reply queue, then
//! awaits the matching reply. One client serves one outstanding call at a
//! time; `call` takes `&mut self`, so pipelining is unrepresentable.

use {
    tracing::{debug, warn},
    uuid::Uuid,
};

use crate::{
    Broker, Connection, ConsumeOptions, Consumer, MqConfig, MqError, Publication, Result, retry,
};

pub struct RpcClient {
    broker: Broker,
    config: MqConfig,
    conn: Connection,
    reply_queue: String,
    replies: Consumer,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("reply_queue", &self.reply_queue)
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    /// Connect under the retry policy and set up both queues: the durable
    /// request queue and a fresh exclusive reply queue this client consumes.
    pub async fn connect(broker: Broker, config: MqConfig) -> Result<Self> {
        let (conn, reply_queue, replies) =
            retry::with_fixed_delay(config.max_retries, config.retry_delay, || {
                Self::open(&broker, &config)
            })
            .await?;
        debug!(reply_queue = %reply_queue, "transport connected");
        Ok(Self { broker, config, conn, reply_queue, replies })
    }

    fn open(broker: &Broker, config: &MqConfig) -> Result<(Connection, String, Consumer)> {
        let conn = broker.connect(&config.connect_params())?;
        conn.declare_queue(&config.request_queue)?;
        let reply_queue = conn.declare_reply_queue()?;
        let replies = conn.consume(&reply_queue, ConsumeOptions::auto_ack())?;
        Ok((conn, reply_queue, replies))
    }

    /// Send one request and wait for its correlated reply.
    ///
    /// Publish failures are retried under the policy (reopening the
    /// connection when it has gone away between calls). Replies whose
    /// correlation id does not match the outstanding token are discarded.
    /// Connection loss mid-wait reconnects and surfaces
    /// [`MqError::ConnectionLost`]; the caller may retry the whole call.
    pub async fn call(&mut self, body: &[u8]) -> Result<Vec<u8>> {
        let token = Uuid::new_v4().to_string();

        let (max_retries, retry_delay) = (self.config.max_retries, self.config.retry_delay);
        retry::with_fixed_delay(max_retries, retry_delay, || {
            self.publish_request(&token, body)
        })
        .await?;

        let reply = tokio::time::timeout(self.config.reply_timeout, async {
            while let Some(delivery) = self.replies.recv().await {
                match delivery.correlation_id.as_deref() {
                    Some(id) if id == token => return Some(delivery.body),
                    _ => debug!(
                        queue = %self.reply_queue,
                        "discarding reply with non-matching correlation id"
                    ),
                }
            }
            None
        })
        .await;

        match reply {
            Ok(Some(body)) => Ok(body),
            Ok(None) => {
                warn!("connection lost while awaiting reply, reconnecting");
                self.reconnect().await?;
                Err(MqError::ConnectionLost)
            }
            Err(_elapsed) => Err(MqError::ReplyTimeout),
        }
    }

    fn publish_request(&mut self, token: &str, body: &[u8]) -> Result<()> {
        if !self.conn.is_open() {
            self.reopen()?;
        }
        self.conn.publish(
            &self.config.request_queue,
            Publication {
                body: body.to_vec(),
                correlation_id: Some(token.to_string()),
                reply_to: Some(self.reply_queue.clone()),
                persistent: true,
            },
        )
    }

    /// Single reconnection attempt; replaces the connection and reply queue.
    fn reopen(&mut self) -> Result<()> {
        let (conn, reply_queue, replies) = Self::open(&self.broker, &self.config)?;
        debug!(reply_queue = %reply_queue, "transport reconnected");
        self.conn = conn;
        self.reply_queue = reply_queue;
        self.replies = replies;
        Ok(())
    }

    /// Reconnection under the retry policy, for recovery mid-call.
    async fn reconnect(&mut self) -> Result<()> {
        let (max_retries, retry_delay) = (self.config.max_retries, self.config.retry_delay);
        retry::with_fixed_delay(max_retries, retry_delay, || {
            Self::open(&self.broker, &self.config)
        })
        .await
        .map(|(conn, reply_queue, replies)| {
            self.conn = conn;
            self.reply_queue = reply_queue;
            self.replies = replies;
        })
    }

    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    pub fn close(self) {
        self.conn.close();
    }
}
