/*!
 * Top-level configuration.
 *
 * All option structs implement `Default` with production values and
 * `serde::Deserialize` with `#[serde(default)]`, so a JSON config only needs
 * the fields it overrides. Durations are written in milliseconds:
 *
 * ```json
 * {
 *   "transport": { "connect_timeout": 5000 },
 *   "queue": { "tracking_id": "UA-12345-1", "batch_size": 10 }
 * }
 * ```
 */
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::queue::QueueOptions;
use crate::transport::TransportOptions;

/// User id reported for hits that have no natural owner, such as panics.
pub const DEFAULT_USER: &str = "anonymous";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/**
 * Configuration for a [`Client`](crate::Client).
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// HTTP transport settings (timeouts, redirects, user agent).
    pub transport: TransportOptions,

    /// Delivery queue settings (tracking id, endpoints, batching, retries).
    pub queue: QueueOptions,

    /// User id attached to hits captured without one (see `capture_exception`).
    pub default_user: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            transport: TransportOptions::default(),
            queue: QueueOptions::default(),
            default_user: DEFAULT_USER.to_string(),
        }
    }
}

impl Options {
    /**
     * Parses options from JSON. Missing fields keep their defaults.
     *
     * Only syntax and types are checked here; semantic validation happens
     * when the client is built.
     */
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Shortcut for the common case of default options with a tracking id.
    pub fn with_tracking_id(tracking_id: impl Into<String>) -> Self {
        let mut options = Self::default();
        options.queue.tracking_id = tracking_id.into();
        options
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// (De)serializes a `Duration` as whole milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_from_json_overrides_only_given_fields() {
        let options = Options::from_json(
            r#"{
                "transport": { "connect_timeout": 5000 },
                "queue": { "tracking_id": "UA-9", "batch_size": 3 }
            }"#,
        )
        .expect("valid json");

        assert_eq!(options.transport.connect_timeout, Duration::from_secs(5));
        assert_eq!(options.transport.transfer_timeout, Duration::from_secs(60));
        assert_eq!(options.queue.tracking_id, "UA-9");
        assert_eq!(options.queue.batch_size, 3);
        assert_eq!(options.queue.max_attempts, 5);
        assert_eq!(options.default_user, DEFAULT_USER);
    }

    #[test]
    fn test_from_json_rejects_bad_types() {
        assert!(Options::from_json(r#"{ "queue": { "batch_size": "many" } }"#).is_err());
    }

    #[test]
    fn test_with_tracking_id() {
        let options = Options::with_tracking_id("UA-1");
        assert_eq!(options.queue.tracking_id, "UA-1");
        assert_eq!(options.queue.batch_size, 20);
    }
}
