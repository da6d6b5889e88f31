use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::options::millis;
use crate::protocol::constants::{DEFAULT_BATCH_ENDPOINT, DEFAULT_SINGLE_ENDPOINT};

/**
 * How pending hits are put on the wire.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One POST per batch to `batch_endpoint`, one line per hit.
    Batch,
    /// One GET per hit to `single_endpoint`.
    Single,
}

/**
 * What a successful dispatch adds to `successful_hits`.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessAccounting {
    /// One per successful request, however many hits it carried.
    PerBatch,
    /// One per hit carried by the successful request.
    PerHit,
}

/**
 * Settings for a [`DeliveryQueue`](super::DeliveryQueue).
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    /// Destination identifier appended to every hit as `tid`.
    pub tracking_id: String,

    pub batch_endpoint: String,

    pub single_endpoint: String,

    pub mode: DispatchMode,

    /// Maximum hits per batch; a pending list longer than this is
    /// dispatched without waiting for the flush interval.
    pub batch_size: usize,

    /// Period of the unconditional flush of stragglers.
    #[serde(with = "millis")]
    pub flush_interval: Duration,

    /// Failed attempts after which a hit is dropped and counted as failed.
    pub max_attempts: u32,

    pub success_accounting: SuccessAccounting,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            tracking_id: String::new(),
            batch_endpoint: DEFAULT_BATCH_ENDPOINT.to_string(),
            single_endpoint: DEFAULT_SINGLE_ENDPOINT.to_string(),
            mode: DispatchMode::Batch,
            batch_size: 20,
            flush_interval: Duration::from_secs(10),
            max_attempts: 5,
            success_accounting: SuccessAccounting::PerBatch,
        }
    }
}

impl QueueOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::invalid("queue batch_size must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(Error::invalid("queue max_attempts must be at least 1"));
        }
        if self.flush_interval.is_zero() {
            return Err(Error::invalid("queue flush_interval must be non-zero"));
        }
        let endpoint = match self.mode {
            DispatchMode::Batch => &self.batch_endpoint,
            DispatchMode::Single => &self.single_endpoint,
        };
        if endpoint.is_empty() {
            return Err(Error::invalid("queue endpoint for the selected mode is empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = QueueOptions::default();
        assert_eq!(options.batch_size, 20);
        assert_eq!(options.flush_interval, Duration::from_secs(10));
        assert_eq!(options.max_attempts, 5);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let options = QueueOptions {
            batch_size: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_empty_endpoint_only_checked_for_active_mode() {
        let options = QueueOptions {
            single_endpoint: String::new(),
            ..Default::default()
        };
        assert!(options.validate().is_ok());

        let options = QueueOptions {
            mode: DispatchMode::Single,
            ..options
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_mode_deserializes_lowercase() {
        let options: QueueOptions =
            serde_json::from_str(r#"{ "mode": "single", "success_accounting": "per_hit" }"#).unwrap();
        assert_eq!(options.mode, DispatchMode::Single);
        assert_eq!(options.success_accounting, SuccessAccounting::PerHit);
    }
}
