/*!
 * The Courier client: owns one transport engine and one delivery queue.
 *
 * Lifecycle of the process-wide client:
 * 1. `courier::init(options)` builds a `Client` and stores it in
 *    `GLOBAL_CLIENT`.
 * 2. `courier::page_view()` / `courier::event()` read the global client and
 *    enqueue hits. They are silent no-ops before `init`.
 * 3. `init` returns a `Guard`; dropping it takes the client out of the
 *    global slot, which stops the pusher and the transport worker.
 *
 * A `Client` can also be created directly with `Client::new` and used
 * without the global slot.
 */
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::options::Options;
use crate::protocol::hit::Hit;
use crate::queue::{DeliveryQueue, Stats};
use crate::transport::Engine;

// ---------------------------------------------------------------------------
// Global slot
// ---------------------------------------------------------------------------

/**
 * Process-wide client. `RwLock<Option<..>>` rather than `OnceLock` so the
 * guard can take it back out on shutdown and a later `init` can succeed.
 */
static GLOBAL_CLIENT: RwLock<Option<Arc<Client>>> = RwLock::new(None);

/**
 * Returns the global client, or `None` if `init()` has not been called or
 * its guard has been dropped.
 */
pub fn get_client() -> Option<Arc<Client>> {
    GLOBAL_CLIENT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Removes the global client. Called by `Guard::drop`.
pub(crate) fn take_client() -> Option<Arc<Client>> {
    GLOBAL_CLIENT
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/**
 * Engine + queue pair.
 *
 * Field order matters: the queue is dropped (and its pusher joined) before
 * the engine it submits to.
 */
pub struct Client {
    queue: DeliveryQueue,
    engine: Arc<Engine>,
    default_user: String,
}

impl Client {
    /**
     * Builds the transport engine and the delivery queue on top of it.
     *
     * # Errors
     * Any [`Error`] from validating options or starting the two threads.
     */
    pub fn new(options: Options) -> Result<Self> {
        let Options {
            transport,
            queue,
            default_user,
        } = options;

        let engine = Arc::new(Engine::new(transport)?);
        let queue = DeliveryQueue::new(Arc::clone(&engine), queue)?;

        tracing::debug!(
            mode = ?queue.options().mode,
            batch_size = queue.options().batch_size,
            "courier client started"
        );

        Ok(Self {
            queue,
            engine,
            default_user,
        })
    }

    /**
     * Builds a client and installs it as the global one.
     *
     * # Errors
     * `AlreadyInitialized` if a global client exists, otherwise whatever
     * `Client::new` returns.
     */
    pub fn init(options: Options) -> Result<()> {
        /*
         * Early check so a second init does not spin up threads only to
         * tear them down again.
         */
        if get_client().is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let client = Arc::new(Client::new(options)?);

        let mut slot = GLOBAL_CLIENT.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        *slot = Some(client);
        Ok(())
    }

    /// Enqueues a hit for delivery.
    pub fn capture(&self, hit: Hit) {
        self.queue.enqueue(hit);
    }

    /// Enqueues an exception hit attributed to the default user.
    pub fn capture_exception(&self, description: impl Into<String>, fatal: bool) {
        self.queue
            .push_exception(&self.default_user, description, fatal);
    }

    pub fn stats(&self) -> Stats {
        self.queue.stats()
    }

    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn default_user(&self) -> &str {
        &self.default_user
    }
}
