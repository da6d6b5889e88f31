/*!
 * Reliable delivery queue: at-least-once, bounded-retry delivery of hits.
 *
 * ```text
 *  ┌──────────────┐  enqueue()  ┌───────────────────┐
 *  │ producers    │ ──────────► │ pending + counters│ (data mutex)
 *  │ (any thread) │   notify    └─────────┬─────────┘
 *  └──────────────┘                       │ drain batches
 *                                ┌────────▼─────────┐ submit ┌────────┐
 *                                │ pusher thread    │ ─────► │ Engine │
 *                                └────────▲─────────┘        └───┬────┘
 *                                         │ DispatchOutcome      │
 *                                         └──────────────────────┘
 * ```
 *
 * - `options`: batching, retry and endpoint settings
 * - `pusher`: the background thread and batch rendering
 * - `policy`: what happens to hits when a dispatch finishes
 * - `signal`: condvar wake signal
 */

pub mod options;

mod policy;
mod pusher;
mod signal;

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

pub use options::{DispatchMode, QueueOptions, SuccessAccounting};

use self::pusher::Pusher;
use self::signal::WakeSignal;
use crate::error::Result;
use crate::protocol::hit::Hit;
use crate::transport::Engine;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/**
 * Snapshot of the queue's lifetime counters.
 */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Successful dispatches (or hits, with `SuccessAccounting::PerHit`).
    pub successful: u64,
    /// Hits dropped after `max_attempts` failed deliveries.
    pub failed: u64,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Hit>,
    successful: u64,
    failed: u64,
}

pub(crate) struct Shared {
    state: Mutex<QueueState>,
    signal: Arc<WakeSignal>,
    options: QueueOptions,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// DeliveryQueue
// ---------------------------------------------------------------------------

/**
 * Batching delivery queue on top of a transport [`Engine`].
 *
 * `enqueue` and the `push_*` helpers only take a short mutex and ring the
 * pusher. Dropping the queue stops the pusher after one last threshold
 * drain; hits still pending then are discarded.
 */
pub struct DeliveryQueue {
    shared: Arc<Shared>,
    pusher: Option<JoinHandle<()>>,
}

impl DeliveryQueue {
    /**
     * Validates `options` and starts the pusher thread.
     *
     * # Errors
     * `InvalidOptions` for unusable options, `Spawn` if the thread cannot
     * be started.
     */
    pub fn new(engine: Arc<Engine>, options: QueueOptions) -> Result<Self> {
        options.validate()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            signal: Arc::new(WakeSignal::new()),
            options,
        });
        let pusher = Pusher::spawn(Arc::clone(&shared), engine)?;

        Ok(Self {
            shared,
            pusher: Some(pusher),
        })
    }

    /// Appends a hit to the back of the pending list and wakes the pusher.
    pub fn enqueue(&self, hit: Hit) {
        self.shared.lock_state().pending.push_back(hit);
        self.shared.signal.notify();
    }

    pub fn push_page_view(
        &self,
        user_id: impl Display,
        title: impl Into<String>,
        host: impl Into<String>,
        path: impl Into<String>,
        lang: Option<&str>,
    ) {
        self.enqueue(with_lang(Hit::page_view(user_id, title, host, path), lang));
    }

    pub fn push_event(
        &self,
        user_id: impl Display,
        category: impl Into<String>,
        action: impl Into<String>,
        lang: Option<&str>,
    ) {
        self.enqueue(with_lang(Hit::event(user_id, category, action), lang));
    }

    pub fn push_exception(&self, user_id: impl Display, description: impl Into<String>, fatal: bool) {
        self.enqueue(Hit::exception(user_id, description, fatal));
    }

    pub fn stats(&self) -> Stats {
        let state = self.shared.lock_state();
        Stats {
            successful: state.successful,
            failed: state.failed,
        }
    }

    /// Hits waiting to be dispatched (in-flight batches not included).
    pub fn pending(&self) -> usize {
        self.shared.lock_state().pending.len()
    }

    pub fn options(&self) -> &QueueOptions {
        &self.shared.options
    }
}

impl Drop for DeliveryQueue {
    fn drop(&mut self) {
        self.shared.signal.stop();
        if let Some(pusher) = self.pusher.take() {
            if pusher.join().is_err() {
                tracing::error!("pusher thread terminated abnormally");
            }
        }
    }
}

fn with_lang(hit: Hit, lang: Option<&str>) -> Hit {
    match lang {
        Some(lang) => hit.with_lang(lang),
        None => hit,
    }
}
