use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::options::millis;
use crate::protocol::constants::USER_AGENT;

/**
 * Settings for the transport [`Engine`](super::Engine).
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Maximum time to establish a connection.
    #[serde(with = "millis")]
    pub connect_timeout: Duration,

    /// Maximum time for a whole transfer, body included.
    #[serde(with = "millis")]
    pub transfer_timeout: Duration,

    /// Redirects followed before the transfer fails.
    pub max_redirects: usize,

    /// Upper bound on a single idle wait of the worker. New work and
    /// shutdown interrupt the wait immediately; this only bounds how long
    /// the loop can go without a pass.
    #[serde(with = "millis")]
    pub wait_ceiling: Duration,

    /// Bytes read from an upload source per chunk.
    pub upload_chunk_size: usize,

    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(60),
            max_redirects: 5,
            wait_ceiling: Duration::from_secs(1),
            upload_chunk_size: 64 * 1024,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl TransportOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() || self.transfer_timeout.is_zero() {
            return Err(Error::invalid("transport timeouts must be non-zero"));
        }
        if self.wait_ceiling.is_zero() {
            return Err(Error::invalid("transport wait_ceiling must be non-zero"));
        }
        if self.upload_chunk_size == 0 {
            return Err(Error::invalid("transport upload_chunk_size must be non-zero"));
        }
        Ok(())
    }
}
