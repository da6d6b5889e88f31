/*!
 * Condvar-based wake signal for the pusher thread.
 *
 * Uses a `Mutex<WakeFlags>` + `Condvar` pair, separate from the queue's
 * data mutex, so producers ringing the signal never contend with the
 * pusher while it is moving hits around.
 */
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Instant;

/// Why `wait_until` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    /// Someone called `notify` (new hit, finished dispatch).
    Signaled,
    /// The deadline passed with no signal.
    Deadline,
    /// `stop` was called. Takes precedence over the other two.
    Stop,
}

#[derive(Default)]
struct WakeFlags {
    signaled: bool,
    stop: bool,
}

pub(crate) struct WakeSignal {
    flags: Mutex<WakeFlags>,
    condvar: Condvar,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self {
            flags: Mutex::new(WakeFlags::default()),
            condvar: Condvar::new(),
        }
    }

    /// Wakes the waiter. Signals coalesce until the next `wait_until`.
    pub fn notify(&self) {
        let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        flags.signaled = true;
        self.condvar.notify_all();
    }

    pub fn stop(&self) {
        let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        flags.stop = true;
        self.condvar.notify_all();
    }

    /**
     * Blocks until notified, stopped, or `deadline` passes. A signal that
     * arrived before the call is consumed immediately. Spurious wakeups are
     * absorbed by re-checking the flags.
     */
    pub fn wait_until(&self, deadline: Instant) -> Wake {
        let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if flags.stop {
                return Wake::Stop;
            }
            if flags.signaled {
                flags.signaled = false;
                return Wake::Signaled;
            }

            let now = Instant::now();
            if now >= deadline {
                return Wake::Deadline;
            }
            flags = match self.condvar.wait_timeout(flags, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}
