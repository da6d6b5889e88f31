/*!
 * The transport engine: one worker thread multiplexing many HTTP transfers.
 *
 * ```text
 *  ┌──────────────┐  submit()   ┌──────────────────┐
 *  │ caller       │ ──────────► │ pending (Mutex)  │
 *  │ (any thread) │   + wake    └────────┬─────────┘
 *  └──────────────┘                      │ admit
 *                               ┌────────▼─────────┐   readiness   ┌────────┐
 *                               │ worker thread    │ ◄───────────► │ server │
 *                               │ slots + futures  │               └────────┘
 *                               └────────┬─────────┘
 *                                        │ on_done(ok) on the worker
 *                                        ▼
 * ```
 *
 * The worker owns a single-threaded tokio runtime. Its reactor is the
 * readiness wait: every active transfer is a future parked on its socket,
 * and one `select!` waits on all of them, on the wake notification, and on
 * a ceiling timer. `submit` only takes the pending-queue mutex and rings
 * the notification, so a caller never waits on the network.
 *
 * Completion callbacks fire on the worker thread, exactly once per request,
 * unless the engine is dropped first: then every outstanding request is
 * released without a callback.
 */
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use futures::future::LocalBoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::Notify;

use super::options::TransportOptions;
use super::request::{Callbacks, DoneCallback, Form, Request};
use super::slots::{Slots, TransferHandle};
use super::transfer::Transfer;
use super::upload::Upload;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Shared state between callers and the worker
// ---------------------------------------------------------------------------

struct Shared {
    /// Requests submitted but not yet admitted by the worker.
    pending: Mutex<Vec<Request>>,

    /// Wake signal. `notify_one` stores a permit when nobody is waiting,
    /// so a wake between two waits is never lost.
    wake: Notify,

    /// Set by `Drop`, or by the worker itself if it exits.
    stopping: AtomicBool,

    /// Submitted requests that have neither completed nor been abandoned.
    in_flight: AtomicUsize,
}

impl Shared {
    fn take_pending(&self) -> Vec<Request> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *pending)
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }
}

/// What the slot arena keeps for each active transfer.
struct ActiveTransfer {
    on_done: Option<DoneCallback>,
    url: String,
    started: Instant,
}

type Running = FuturesUnordered<LocalBoxFuture<'static, (TransferHandle, bool)>>;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/**
 * Asynchronous HTTP transport with a single background worker.
 *
 * `Engine` is `Send + Sync`; share it with `Arc` to submit from several
 * threads. Dropping it stops and joins the worker.
 */
pub struct Engine {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Engine {
    /**
     * Builds the HTTP client and runtime, then spawns the worker thread.
     *
     * # Errors
     * `InvalidOptions` for unusable options, `HttpClient`/`Runtime`/`Spawn`
     * if the underlying resources cannot be created.
     */
    pub fn new(options: TransportOptions) -> Result<Self> {
        options.validate()?;

        let client = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.transfer_timeout)
            .redirect(reqwest::redirect::Policy::limited(options.max_redirects))
            .referer(true)
            .user_agent(options.user_agent.as_str())
            .build()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;

        let shared = Arc::new(Shared {
            pending: Mutex::new(Vec::new()),
            wake: Notify::new(),
            stopping: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("courier-transport".into())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    runtime.block_on(run_loop(&worker_shared, client, &options));
                }));
                if result.is_err() {
                    tracing::error!("transport worker panicked; outstanding requests are abandoned");
                }

                worker_shared.stopping.store(true, Ordering::Release);
                let leftover = worker_shared.take_pending().len();
                worker_shared.in_flight.fetch_sub(leftover, Ordering::AcqRel);
            })
            .map_err(|source| Error::Spawn {
                name: "transport",
                source,
            })?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Engine with default timeouts (30 s connect, 60 s transfer).
    pub fn with_defaults() -> Result<Self> {
        Self::new(TransportOptions::default())
    }

    /**
     * Queues a request and wakes the worker. Never blocks on I/O.
     *
     * If the worker is gone (it panicked) the request is dropped without
     * a callback, the same as a request abandoned at shutdown.
     */
    pub fn submit(&self, request: Request) {
        if self.shared.is_stopping() {
            tracing::warn!(url = %request.target_url(), "transport is stopped; dropping request");
            return;
        }

        {
            let mut pending = self
                .shared
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            pending.push(request);
            self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
        }
        self.shared.wake.notify_one();
    }

    /**
     * GET `url` with the given query parameters (values percent-encoded,
     * order and duplicates preserved).
     */
    pub fn get<K, V>(&self, url: &str, query: impl IntoIterator<Item = (K, V)>, callbacks: Callbacks)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.submit(Request::get(url).queries(query).callbacks(callbacks));
    }

    /**
     * POST a multipart form made of `fields` followed by `uploads`. Upload
     * sources are streamed in chunks during transmission.
     */
    pub fn post<K, V>(
        &self,
        url: &str,
        fields: impl IntoIterator<Item = (K, V)>,
        uploads: Vec<Upload>,
        callbacks: Callbacks,
    ) where
        K: Into<String>,
        V: Into<String>,
    {
        let mut form = Form::new();
        for (name, value) in fields {
            form = form.field(name, value);
        }
        for upload in uploads {
            form = form.upload(upload);
        }
        self.submit(Request::post(url).form(form).callbacks(callbacks));
    }

    /// Requests submitted and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shared.stopping.store(true, Ordering::Release);
        self.shared.wake.notify_one();

        if let Some(worker) = self.worker.take() {
            /*
             * Dropped from inside a completion callback: the worker sees
             * `stopping` as soon as the callback returns and exits on its own.
             */
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                tracing::error!("transport worker terminated abnormally");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

async fn run_loop(shared: &Shared, client: reqwest::Client, options: &TransportOptions) {
    let mut active: Slots<ActiveTransfer> = Slots::new();
    let mut running: Running = FuturesUnordered::new();

    while !shared.is_stopping() {
        admit(shared, &client, options, &mut active, &mut running);

        let finished = tokio::select! {
            biased;
            _ = shared.wake.notified() => None,
            Some(done) = running.next(), if !running.is_empty() => Some(done),
            _ = tokio::time::sleep(options.wait_ceiling) => None,
        };

        if let Some((handle, ok)) = finished {
            if shared.is_stopping() {
                break;
            }
            complete(shared, &mut active, handle, ok);
        }

        // Reap whatever else is already done without waiting again.
        while let Some(Some((handle, ok))) = running.next().now_or_never() {
            if shared.is_stopping() {
                break;
            }
            complete(shared, &mut active, handle, ok);
        }
    }

    let abandoned = active.len();
    drop(running);
    active.clear();
    shared.in_flight.fetch_sub(abandoned, Ordering::AcqRel);
    if abandoned > 0 {
        tracing::debug!(abandoned, "transport stopped with transfers in flight");
    }
}

/// Moves newly submitted requests into the active set and starts them.
fn admit(
    shared: &Shared,
    client: &reqwest::Client,
    options: &TransportOptions,
    active: &mut Slots<ActiveTransfer>,
    running: &mut Running,
) {
    for request in shared.take_pending() {
        let (transfer, on_done) = Transfer::from_request(request);
        let handle = active.insert(ActiveTransfer {
            on_done,
            url: transfer.url().to_string(),
            started: Instant::now(),
        });

        let client = client.clone();
        let chunk_size = options.upload_chunk_size;
        running.push(
            async move {
                let ok = transfer.perform(client, chunk_size).await;
                (handle, ok)
            }
            .boxed_local(),
        );
    }
}

/// Releases a finished transfer and fires its completion callback.
fn complete(shared: &Shared, active: &mut Slots<ActiveTransfer>, handle: TransferHandle, ok: bool) {
    let Some(transfer) = active.remove(handle) else {
        return;
    };
    shared.in_flight.fetch_sub(1, Ordering::AcqRel);

    tracing::debug!(
        url = %transfer.url,
        ok,
        elapsed_ms = transfer.started.elapsed().as_millis() as u64,
        "transfer finished"
    );

    if let Some(on_done) = transfer.on_done {
        if catch_unwind(AssertUnwindSafe(|| on_done(ok))).is_err() {
            tracing::warn!(url = %transfer.url, "completion callback panicked");
        }
    }
}
