/*!
 * The pusher thread: turns the pending list into requests on the engine.
 *
 * Each wake it first settles finished dispatches (retry/drop/count), then
 * drains:
 * - on a signal, only while the list is longer than `batch_size`;
 * - on the flush deadline, one batch unconditionally, then on the same
 *   terms as a signal.
 *
 * Completion callbacks run on the transport worker and only send a
 * `DispatchOutcome` back here and ring the signal.
 */
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use super::options::{DispatchMode, QueueOptions};
use super::policy::{settle, DispatchOutcome};
use super::signal::{Wake, WakeSignal};
use super::Shared;
use crate::error::{Error, Result};
use crate::protocol::escape::render_pairs;
use crate::protocol::hit::Hit;
use crate::transport::{Engine, Request};

/// Content type of a multi-line batch body.
const BATCH_CONTENT_TYPE: &str = "text/plain";

pub(crate) struct Pusher {
    shared: Arc<Shared>,
    engine: Arc<Engine>,
    outcomes: Receiver<DispatchOutcome>,
    reply: Sender<DispatchOutcome>,
}

impl Pusher {
    pub fn spawn(shared: Arc<Shared>, engine: Arc<Engine>) -> Result<JoinHandle<()>> {
        let (reply, outcomes) = crossbeam_channel::unbounded();
        let pusher = Self {
            shared,
            engine,
            outcomes,
            reply,
        };

        thread::Builder::new()
            .name("courier-pusher".into())
            .spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    pusher.run();
                }));
                if result.is_err() {
                    tracing::error!("pusher thread panicked; queued hits will not be delivered");
                }
            })
            .map_err(|source| Error::Spawn {
                name: "pusher",
                source,
            })
    }

    fn options(&self) -> &QueueOptions {
        &self.shared.options
    }

    fn run(&self) {
        let mut next_flush = Instant::now() + self.options().flush_interval;

        loop {
            let wake = self.shared.signal.wait_until(next_flush);
            self.settle_finished();

            match wake {
                Wake::Stop => {
                    self.drain(false);
                    break;
                }
                Wake::Signaled => self.drain(false),
                Wake::Deadline => {
                    self.drain(true);
                    next_flush = Instant::now() + self.options().flush_interval;
                }
            }
        }

        let abandoned = self.shared.lock_state().pending.len();
        if abandoned > 0 {
            tracing::debug!(abandoned, "delivery queue stopped with hits pending");
        }
    }

    /// Applies the retry policy to every dispatch that has completed.
    fn settle_finished(&self) {
        let options = self.options();
        for outcome in self.outcomes.try_iter() {
            let settlement = settle(outcome, options.max_attempts, options.success_accounting);

            let mut state = self.shared.lock_state();
            state.successful += settlement.succeeded;
            state.failed += settlement.dropped;
            state.pending.extend(settlement.requeue);
        }
    }

    /**
     * Dispatches batches from the front of the list while `next_batch_len`
     * allows. `on_deadline` lets the first batch go out below the threshold.
     */
    fn drain(&self, on_deadline: bool) {
        let batch_size = self.options().batch_size;
        let mut first = on_deadline;
        loop {
            let batch: Vec<Hit> = {
                let mut state = self.shared.lock_state();
                let take = next_batch_len(state.pending.len(), batch_size, first);
                if take == 0 {
                    return;
                }
                state.pending.drain(..take).collect()
            };
            first = false;
            self.dispatch(batch);
        }
    }

    fn dispatch(&self, batch: Vec<Hit>) {
        let options = self.options();
        match options.mode {
            DispatchMode::Batch => {
                let body = render_batch(&batch, &options.tracking_id);
                tracing::debug!(hits = batch.len(), bytes = body.len(), "dispatching batch");

                let request = Request::post(&options.batch_endpoint)
                    .body(BATCH_CONTENT_TYPE, body)
                    .on_done(self.completion(batch));
                self.engine.submit(request);
            }
            DispatchMode::Single => {
                for hit in batch {
                    let request = Request::get(&options.single_endpoint)
                        .queries(hit.to_pairs(&options.tracking_id));
                    self.engine.submit(request.on_done(self.completion(vec![hit])));
                }
            }
        }
    }

    /// Completion callback that returns `hits` to the pusher.
    fn completion(&self, hits: Vec<Hit>) -> impl FnOnce(bool) + Send + 'static {
        let reply = self.reply.clone();
        let signal: Arc<WakeSignal> = Arc::clone(&self.shared.signal);
        move |delivered| {
            // Fails only once the pusher is gone; the hits are abandoned then.
            if reply.send(DispatchOutcome { hits, delivered }).is_ok() {
                signal.notify();
            }
        }
    }
}

/**
 * Size of the next batch to take from a list of `pending` hits, or 0 to
 * stop. Past the threshold a full batch is taken; at or below it, only a
 * deadline's first batch goes out.
 */
fn next_batch_len(pending: usize, batch_size: usize, deadline_first: bool) -> usize {
    if pending > batch_size || deadline_first {
        pending.min(batch_size)
    } else {
        0
    }
}

/**
 * One `\n`-terminated line of escaped pairs per hit.
 */
pub(crate) fn render_batch(hits: &[Hit], tracking_id: &str) -> String {
    let mut body = String::new();
    for hit in hits {
        body.push_str(&render_pairs(&hit.to_pairs(tracking_id)));
        body.push('\n');
    }
    body
}
