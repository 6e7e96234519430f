use {std::time::Duration, tracing::warn};

use crate::{MqError, Result};

/// Run `op` up to `max_attempts` times with a fixed pause between attempts.
/// Exhaustion wraps the final error so callers can tell a dead broker from a
/// transient refusal.
pub async fn with_fixed_delay<T>(
    max_attempts: u32,
    delay: Duration,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(source) if attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %source, "attempt failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(source) => {
                return Err(MqError::RetriesExhausted { attempts: attempt, source: Box::new(source) });
            }
        }
    }
}
