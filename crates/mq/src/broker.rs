//! In-process message broker.
//!
//! A lightweight stand-in for an external AMQP server with the semantics the
//! transport relies on: named durable queues, connection-scoped exclusive
//! reply queues, per-message correlation/reply-to properties, prefetch-bounded
//! consumers, and ack / nack-with-requeue settlement. All state lives behind
//! one lock; operations are short and synchronous, and only
//! [`Consumer::recv`](crate::Consumer::recv) suspends.

use {
    std::{
        collections::{HashMap, VecDeque},
        sync::{
            Arc, Mutex, MutexGuard, PoisonError,
            atomic::{AtomicBool, AtomicU64, Ordering},
        },
    },
    tokio::sync::mpsc,
    tracing::{debug, trace},
    uuid::Uuid,
};

use crate::{
    ConnectParams, MqConfig, MqError, Result,
    connection::{Connection, ConsumeOptions, Consumer, Delivery, Publication},
};

pub(crate) type ConnectionId = u64;

/// Shared handle to the embedded broker. Clones refer to the same broker.
#[derive(Clone)]
pub struct Broker {
    username: String,
    password: String,
    inner: Arc<Mutex<BrokerInner>>,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    connections: AtomicU64,
    consumers: AtomicU64,
    delivery_tags: AtomicU64,
}

struct BrokerInner {
    running: bool,
    queues: HashMap<String, QueueState>,
    connections: HashMap<ConnectionId, ConnState>,
    unacked: HashMap<u64, PendingAck>,
}

struct ConnState {
    open: Arc<AtomicBool>,
}

struct QueueState {
    /// Exclusive queues are owned by one connection and die with it.
    owner: Option<ConnectionId>,
    ready: VecDeque<QueuedMessage>,
    consumers: Vec<ConsumerSeat>,
    next_consumer: usize,
}

impl QueueState {
    fn durable() -> Self {
        Self { owner: None, ready: VecDeque::new(), consumers: Vec::new(), next_consumer: 0 }
    }

    fn exclusive(owner: ConnectionId) -> Self {
        Self { owner: Some(owner), ..Self::durable() }
    }
}

struct QueuedMessage {
    body: Vec<u8>,
    correlation_id: Option<String>,
    reply_to: Option<String>,
    persistent: bool,
    redelivered: u32,
}

impl From<Publication> for QueuedMessage {
    fn from(publication: Publication) -> Self {
        Self {
            body: publication.body,
            correlation_id: publication.correlation_id,
            reply_to: publication.reply_to,
            persistent: publication.persistent,
            redelivered: 0,
        }
    }
}

struct ConsumerSeat {
    id: u64,
    conn: ConnectionId,
    auto_ack: bool,
    /// 0 means unbounded.
    prefetch: u16,
    in_flight: u16,
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ConsumerSeat {
    fn has_capacity(&self) -> bool {
        self.auto_ack || self.prefetch == 0 || self.in_flight < self.prefetch
    }
}

struct PendingAck {
    queue: String,
    consumer: u64,
    conn: ConnectionId,
    message: QueuedMessage,
}

impl Broker {
    pub fn new(config: &MqConfig) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
            inner: Arc::new(Mutex::new(BrokerInner {
                running: true,
                queues: HashMap::new(),
                connections: HashMap::new(),
                unacked: HashMap::new(),
            })),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Open a connection, checking credentials against the broker's own.
    pub fn connect(&self, params: &ConnectParams) -> Result<Connection> {
        let mut inner = self.lock();
        if !inner.running {
            return Err(MqError::ConnectionRefused);
        }
        if params.username != self.username || params.password != self.password {
            return Err(MqError::AccessRefused);
        }
        let conn_id = self.counters.connections.fetch_add(1, Ordering::Relaxed) + 1;
        let open = Arc::new(AtomicBool::new(true));
        inner.connections.insert(conn_id, ConnState { open: Arc::clone(&open) });
        debug!(conn_id, host = %params.host, port = params.port, "connection opened");
        Ok(Connection::new(self.clone(), conn_id, open))
    }

    /// Close every connection and refuse new ones. Durable queues and their
    /// ready messages are kept for a later [`restart`](Self::restart).
    pub fn stop(&self) {
        let mut inner = self.lock();
        inner.running = false;
        let states: Vec<(ConnectionId, ConnState)> = inner.connections.drain().collect();
        for (_, state) in &states {
            state.open.store(false, Ordering::SeqCst);
        }
        for (conn_id, _) in states {
            inner.detach_connection(conn_id);
        }
        debug!("broker stopped");
    }

    pub fn restart(&self) {
        self.lock().running = true;
        debug!("broker restarted");
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    // ── Connection-scoped operations ─────────────────────────────────────────

    pub(crate) fn declare_queue_on(&self, conn_id: ConnectionId, name: &str) -> Result<()> {
        let mut inner = self.lock();
        Self::ensure_connection(&inner, conn_id)?;
        match inner.queues.get(name) {
            Some(queue) if queue.owner.is_some() => Err(MqError::QueueInUse(name.to_string())),
            Some(_) => Ok(()),
            None => {
                inner.queues.insert(name.to_string(), QueueState::durable());
                debug!(queue = %name, "queue declared");
                Ok(())
            }
        }
    }

    pub(crate) fn declare_reply_queue_on(&self, conn_id: ConnectionId) -> Result<String> {
        let mut inner = self.lock();
        Self::ensure_connection(&inner, conn_id)?;
        let name = format!("reply.{}", Uuid::new_v4());
        inner.queues.insert(name.clone(), QueueState::exclusive(conn_id));
        debug!(queue = %name, conn_id, "exclusive reply queue declared");
        Ok(name)
    }

    pub(crate) fn publish_on(
        &self,
        conn_id: ConnectionId,
        queue: &str,
        publication: Publication,
    ) -> Result<()> {
        let mut inner = self.lock();
        Self::ensure_connection(&inner, conn_id)?;
        let Some(state) = inner.queues.get_mut(queue) else {
            return Err(MqError::UnknownQueue(queue.to_string()));
        };
        trace!(
            queue,
            correlation_id = publication.correlation_id.as_deref().unwrap_or(""),
            bytes = publication.body.len(),
            "message published"
        );
        state.ready.push_back(QueuedMessage::from(publication));
        inner.pump(queue, &self.counters);
        Ok(())
    }

    pub(crate) fn consume_on(
        &self,
        conn_id: ConnectionId,
        queue: &str,
        options: ConsumeOptions,
    ) -> Result<Consumer> {
        let mut inner = self.lock();
        Self::ensure_connection(&inner, conn_id)?;
        let consumer_id = self.counters.consumers.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        let Some(state) = inner.queues.get_mut(queue) else {
            return Err(MqError::UnknownQueue(queue.to_string()));
        };
        if state.owner.is_some_and(|owner| owner != conn_id) {
            return Err(MqError::QueueInUse(queue.to_string()));
        }
        state.consumers.push(ConsumerSeat {
            id: consumer_id,
            conn: conn_id,
            auto_ack: options.auto_ack,
            prefetch: options.prefetch,
            in_flight: 0,
            tx,
        });
        debug!(queue, consumer_id, prefetch = options.prefetch, "consumer attached");
        inner.pump(queue, &self.counters);
        Ok(Consumer::new(self.clone(), queue.to_string(), consumer_id, rx))
    }

    /// Settle an unacked delivery. Unknown tags are ignored so settlement is
    /// idempotent across connection churn.
    pub(crate) fn settle(&self, delivery_tag: u64, requeue: bool) {
        let mut inner = self.lock();
        let Some(pending) = inner.unacked.remove(&delivery_tag) else {
            return;
        };
        if let Some(state) = inner.queues.get_mut(&pending.queue) {
            if let Some(seat) = state.consumers.iter_mut().find(|s| s.id == pending.consumer) {
                seat.in_flight = seat.in_flight.saturating_sub(1);
            }
            if requeue {
                let mut message = pending.message;
                message.redelivered += 1;
                trace!(queue = %pending.queue, redelivered = message.redelivered, "requeued at front");
                state.ready.push_front(message);
            }
        }
        inner.pump(&pending.queue, &self.counters);
    }

    pub(crate) fn cancel_consumer(&self, queue: &str, consumer_id: u64) {
        let mut inner = self.lock();
        inner.requeue_unacked_matching(|pending| pending.consumer == consumer_id);
        if let Some(state) = inner.queues.get_mut(queue) {
            state.consumers.retain(|seat| seat.id != consumer_id);
            state.next_consumer = 0;
        }
        inner.pump(queue, &self.counters);
    }

    pub(crate) fn remove_connection(&self, conn_id: ConnectionId) {
        let mut inner = self.lock();
        let Some(state) = inner.connections.remove(&conn_id) else {
            return;
        };
        state.open.store(false, Ordering::SeqCst);
        inner.detach_connection(conn_id);
        debug!(conn_id, "connection closed");
        let names: Vec<String> = inner.queues.keys().cloned().collect();
        for name in names {
            inner.pump(&name, &self.counters);
        }
    }

    fn ensure_connection(inner: &BrokerInner, conn_id: ConnectionId) -> Result<()> {
        if !inner.running || !inner.connections.contains_key(&conn_id) {
            return Err(MqError::ConnectionClosed);
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BrokerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BrokerInner {
    /// Deliver ready messages to consumers with capacity, round-robin.
    fn pump(&mut self, queue: &str, counters: &Counters) {
        let Self { queues, unacked, .. } = self;
        let Some(state) = queues.get_mut(queue) else {
            return;
        };
        loop {
            if state.ready.is_empty() || state.consumers.is_empty() {
                return;
            }
            let seats = state.consumers.len();
            let mut chosen = None;
            for step in 0..seats {
                let idx = (state.next_consumer + step) % seats;
                if state.consumers[idx].has_capacity() {
                    chosen = Some(idx);
                    break;
                }
            }
            let Some(idx) = chosen else {
                return;
            };
            let Some(message) = state.ready.pop_front() else {
                return;
            };
            let delivery_tag = counters.delivery_tags.fetch_add(1, Ordering::Relaxed) + 1;
            let seat = &mut state.consumers[idx];
            let delivery = Delivery {
                body: message.body.clone(),
                correlation_id: message.correlation_id.clone(),
                reply_to: message.reply_to.clone(),
                persistent: message.persistent,
                delivery_tag,
                redelivered: message.redelivered,
            };
            if seat.tx.send(delivery).is_err() {
                // Receiver dropped without cancelling; retire the seat.
                state.consumers.remove(idx);
                state.next_consumer = 0;
                state.ready.push_front(message);
                continue;
            }
            if seat.auto_ack {
                trace!(queue, delivery_tag, "delivered (auto-ack)");
            } else {
                seat.in_flight += 1;
                let consumer = seat.id;
                let conn = seat.conn;
                unacked.insert(
                    delivery_tag,
                    PendingAck { queue: queue.to_string(), consumer, conn, message },
                );
                trace!(queue, delivery_tag, "delivered (awaiting ack)");
            }
            state.next_consumer = (idx + 1) % state.consumers.len().max(1);
        }
    }

    /// Drop a connection's consumers and exclusive queues; return its unacked
    /// deliveries to their queues in original order.
    fn detach_connection(&mut self, conn_id: ConnectionId) {
        self.requeue_unacked_matching(|pending| pending.conn == conn_id);
        for state in self.queues.values_mut() {
            state.consumers.retain(|seat| seat.conn != conn_id);
            state.next_consumer = 0;
        }
        self.queues.retain(|_, state| state.owner != Some(conn_id));
    }

    fn requeue_unacked_matching(&mut self, matches: impl Fn(&PendingAck) -> bool) {
        let mut tags: Vec<u64> =
            self.unacked.iter().filter(|(_, p)| matches(p)).map(|(tag, _)| *tag).collect();
        // Newest first so the oldest delivery ends up at the queue front.
        tags.sort_unstable_by(|a, b| b.cmp(a));
        for tag in tags {
            if let Some(pending) = self.unacked.remove(&tag) {
                if let Some(state) = self.queues.get_mut(&pending.queue) {
                    if let Some(seat) =
                        state.consumers.iter_mut().find(|s| s.id == pending.consumer)
                    {
                        seat.in_flight = seat.in_flight.saturating_sub(1);
                    }
                    let mut message = pending.message;
                    message.redelivered += 1;
                    state.ready.push_front(message);
                }
            }
        }
    }
}
