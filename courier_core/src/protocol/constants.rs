/*!
 * Protocol-wide constants.
 *
 * Every hit carries `v=PROTOCOL_VERSION`; the endpoints are the defaults
 * used when `QueueOptions` does not override them.
 */

/// Measurement protocol version sent as `v` in every hit.
pub const PROTOCOL_VERSION: &str = "1";

/// Default endpoint for single-hit GET delivery.
pub const DEFAULT_SINGLE_ENDPOINT: &str = "https://www.google-analytics.com/collect";

/// Default endpoint for multi-line POST delivery.
pub const DEFAULT_BATCH_ENDPOINT: &str = "https://www.google-analytics.com/batch";

/// User agent sent by the transport unless overridden.
/// Derived at compile time from the `courier_core` package version.
pub const USER_AGENT: &str = concat!("courier-rust/", env!("CARGO_PKG_VERSION"));
