/*!
 * RAII guard returned by `courier::init()`.
 *
 * ```ignore
 * fn main() {
 *     let _guard = courier::init(options).unwrap();
 *
 *     // ... hits are captured here ...
 *
 * }   // <-- _guard is dropped: the pusher and transport worker stop
 * ```
 *
 * Shutdown does not flush: hits still pending and requests still in
 * flight are abandoned. Call sites that need delivery should keep the
 * guard alive until `stats()` shows what they expect.
 */
use crate::client;

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

/**
 * Shutdown-on-drop guard for the global client.
 *
 * The guard does not own the client; the client lives in the global slot.
 * Dropping the guard removes it from there. If another thread still holds
 * an `Arc<Client>` from `get_client()`, the threads stop when that last
 * reference goes away.
 */
pub struct Guard {
    _private: (),
}

impl Guard {
    /// Only `init()` creates guards.
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        if let Some(client) = client::take_client() {
            let stats = client.stats();
            tracing::debug!(
                successful = stats.successful,
                failed = stats.failed,
                pending = client.queue().pending(),
                "shutting down courier"
            );
        }
    }
}
