use thiserror::Error;

pub type Result<T> = std::result::Result<T, MqError>;

/// Connectivity-level failures. Business-logic errors never appear here; a
/// delivered error envelope is a successful transport round trip.
#[derive(Debug, Error)]
pub enum MqError {
    #[error("connection refused: broker is not running")]
    ConnectionRefused,

    #[error("access refused: invalid credentials")]
    AccessRefused,

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    #[error("queue {0} is exclusive to another connection")]
    QueueInUse(String),

    #[error("connection lost while awaiting reply")]
    ConnectionLost,

    #[error("timed out waiting for a reply")]
    ReplyTimeout,

    #[error("gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<MqError>,
    },
}

impl MqError {
    /// Attempt count recorded at retry exhaustion, if any.
    pub fn exhausted_attempts(&self) -> Option<u32> {
        match self {
            MqError::RetriesExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}
