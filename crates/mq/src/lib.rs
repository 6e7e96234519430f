//! Message-queue transport: an embedded broker with AMQP-style semantics
//! (durable and exclusive queues, manual acknowledgement, prefetch,
//! redelivery) plus the RPC client that callers use to reach the worker.
//!
//! Publishing and settlement are synchronous; the only await point is
//! [`Consumer::recv`]. Every connection and consumer tears down its broker
//! state on drop, so exclusive reply queues never outlive their owner.

mod broker;
mod config;
mod connection;
mod error;
pub mod retry;
mod rpc;

pub use {
    broker::Broker,
    config::{ConnectParams, MqConfig},
    connection::{Connection, ConsumeOptions, Consumer, Delivery, Publication},
    error::{MqError, Result},
    rpc::RpcClient,
};

/// The shared queue workers consume instructions from.
pub const INSTRUCTION_QUEUE: &str = "instruction_queue";
