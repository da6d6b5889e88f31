/*!
 * Courier Core: the internal delivery engine.
 *
 * This crate provides the multiplexed HTTP transport, the batching
 * delivery queue and the process-wide client. End users should depend on
 * the `courier` facade crate instead, which re-exports everything and
 * wires up addons (panic hook).
 *
 * # Module structure
 *
 * - `protocol/`: hits, percent-encoding, constants
 * - `transport/`: engine, requests, uploads
 * - `queue/`: reliable batched delivery with bounded retries
 * - `client`: init, global state, hit routing
 * - `guard`: RAII shutdown-on-drop
 * - `options` / `error`: configuration and the crate error type
 */

mod client;
mod error;
mod guard;
mod options;

pub mod protocol;
pub mod queue;
pub mod transport;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use client::{get_client, Client};
pub use error::{Error, Result};
pub use guard::Guard;
pub use options::{Options, DEFAULT_USER};
pub use protocol::constants::{
    DEFAULT_BATCH_ENDPOINT, DEFAULT_SINGLE_ENDPOINT, PROTOCOL_VERSION, USER_AGENT,
};
pub use protocol::escape::{escape, unescape, unescape_bytes};
pub use protocol::hit::{Hit, HitKind};
pub use queue::{DeliveryQueue, DispatchMode, QueueOptions, Stats, SuccessAccounting};
pub use transport::{
    Body, Callbacks, Engine, FileSource, Form, MemorySource, Method, Progress, Request,
    TransportOptions, Upload, UploadSource,
};

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/**
 * Initializes the global client.
 *
 * Returns `Ok(Guard)` on success. Dropping the `Guard` stops the pusher
 * and the transport worker: keep it alive for the duration of your app.
 *
 * # Errors
 * `AlreadyInitialized` if `init` was already called and its guard is still
 * alive, `InvalidOptions` for unusable options, or a startup failure.
 */
pub fn init(options: Options) -> Result<Guard> {
    client::Client::init(options)?;
    Ok(Guard::new())
}

/**
 * Records a page view for `user_id`.
 *
 * Silent no-op if the client has not been initialized.
 */
pub fn page_view(
    user_id: impl std::fmt::Display,
    title: &str,
    host: &str,
    path: &str,
    lang: Option<&str>,
) {
    if let Some(client) = client::get_client() {
        client
            .queue()
            .push_page_view(user_id, title, host, path, lang);
    }
}

/**
 * Records an event for `user_id`. Silent no-op if not initialized.
 */
pub fn event(user_id: impl std::fmt::Display, category: &str, action: &str, lang: Option<&str>) {
    if let Some(client) = client::get_client() {
        client.queue().push_event(user_id, category, action, lang);
    }
}

/**
 * Enqueues a pre-built `Hit`, for hits that need a label, a value or
 * another builder option. Silent no-op if not initialized.
 */
pub fn capture_hit(hit: Hit) {
    if let Some(client) = client::get_client() {
        client.capture(hit);
    }
}

/**
 * Records an exception attributed to the configured default user.
 *
 * Low-level API used by addons (e.g. `courier_panic`). Silent no-op if not
 * initialized.
 */
pub fn capture_exception(description: &str, fatal: bool) {
    if let Some(client) = client::get_client() {
        client.capture_exception(description, fatal);
    }
}

/**
 * Delivery counters of the global client; all zero when not initialized.
 */
pub fn stats() -> Stats {
    client::get_client()
        .map(|client| client.stats())
        .unwrap_or_default()
}
