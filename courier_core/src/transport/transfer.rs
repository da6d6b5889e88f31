/*!
 * A single HTTP transfer, driven as a future on the engine's worker.
 *
 * `perform` never returns an error: every failure collapses into
 * `false` after being logged with its cause. Callers that need a retry
 * policy (the delivery queue) build it on top of that flag.
 */
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form as MultipartForm, Part};
use thiserror::Error;

use super::request::{Body, ChunkCallback, Form, Method, Progress, ProgressCallback, Request};
use super::upload::UploadSource;

// ---------------------------------------------------------------------------
// TransportError: why a transfer reported `false`
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub(crate) enum TransportError {
    #[error("connection failed: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("redirect limit exceeded: {0}")]
    Redirect(#[source] reqwest::Error),

    #[error("invalid request: {0}")]
    Invalid(#[source] reqwest::Error),

    #[error("{0}")]
    Http(#[source] reqwest::Error),

    #[error("aborted by the chunk callback")]
    Aborted,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err)
        } else if err.is_connect() {
            Self::Connect(err)
        } else if err.is_redirect() {
            Self::Redirect(err)
        } else if err.is_builder() {
            Self::Invalid(err)
        } else {
            Self::Http(err)
        }
    }
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

/**
 * Everything a transfer needs once its completion callback has been split
 * off into the engine's slot arena.
 */
pub(crate) struct Transfer {
    method: Method,
    url: String,
    body: Option<Body>,
    basic_auth: Option<(String, Option<String>)>,
    on_chunk: Option<ChunkCallback>,
    progress: ProgressTracker,
}

impl Transfer {
    /// Splits a request into the transfer and its completion callback.
    pub fn from_request(request: Request) -> (Self, Option<super::request::DoneCallback>) {
        let url = request.target_url();
        let upload_total = match &request.body {
            Some(Body::Form(form)) => form.upload_size(),
            Some(Body::Raw { data, .. }) => data.len() as u64,
            None => 0,
        };
        let callbacks = request.callbacks;

        let transfer = Self {
            method: request.method,
            url,
            body: request.body,
            basic_auth: request.basic_auth,
            on_chunk: callbacks.on_chunk,
            progress: ProgressTracker::new(callbacks.on_progress, upload_total),
        };
        (transfer, callbacks.on_done)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /**
     * Runs the transfer to completion. `true` iff no transport-level error
     * occurred; the HTTP status does not matter.
     */
    pub async fn perform(self, client: reqwest::Client, chunk_size: usize) -> bool {
        let url = self.url.clone();
        match self.run(client, chunk_size).await {
            Ok(status) => {
                tracing::debug!(%url, status, "transfer complete");
                true
            }
            Err(err) => {
                tracing::debug!(%url, error = %err, "transfer failed");
                false
            }
        }
    }

    async fn run(self, client: reqwest::Client, chunk_size: usize) -> Result<u16, TransportError> {
        let Self {
            method,
            url,
            body,
            basic_auth,
            mut on_chunk,
            progress,
        } = self;

        let mut builder = match method {
            Method::Get => client.get(url),
            Method::Post => client.post(url),
        };
        if let Some((user, password)) = basic_auth {
            builder = builder.basic_auth(user, password);
        }
        match body {
            Some(Body::Raw { content_type, data }) => {
                builder = builder.header(CONTENT_TYPE, content_type).body(data);
            }
            Some(Body::Form(form)) => {
                builder = builder.multipart(build_multipart(form, chunk_size, &progress)?);
            }
            None => {}
        }

        let mut response = builder.send().await?;
        progress.upload_complete();
        progress.download_started(response.content_length());

        let status = response.status().as_u16();
        while let Some(chunk) = response.chunk().await? {
            progress.downloaded(chunk.len());
            if let Some(callback) = on_chunk.as_mut() {
                // A panicking callback aborts its own transfer, not the worker.
                let keep_going = catch_unwind(AssertUnwindSafe(|| callback(&chunk))).unwrap_or(false);
                if !keep_going {
                    return Err(TransportError::Aborted);
                }
            }
        }
        progress.download_complete();

        Ok(status)
    }
}

fn build_multipart(
    form: Form,
    chunk_size: usize,
    progress: &ProgressTracker,
) -> Result<MultipartForm, TransportError> {
    let mut multipart = MultipartForm::new();
    for (name, value) in form.fields {
        multipart = multipart.text(name, value);
    }
    for upload in form.uploads {
        let size = upload.source.size();
        let stream = UploadStream::new(upload.source, chunk_size, progress.clone());
        let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), size)
            .file_name(upload.file_name)
            .mime_str(&upload.mime)?;
        multipart = multipart.part(upload.field, part);
    }
    Ok(multipart)
}

// ---------------------------------------------------------------------------
// UploadStream: pulls an upload source chunk by chunk
// ---------------------------------------------------------------------------

/**
 * Adapts an [`UploadSource`] into a body stream. Each poll reads one chunk;
 * a read error ends the stream with that error, failing the transfer.
 */
struct UploadStream {
    // Mutex only to make the stream Sync; it is polled from one task.
    source: Mutex<Option<Box<dyn UploadSource>>>,
    chunk_size: usize,
    progress: ProgressTracker,
}

impl UploadStream {
    fn new(source: Box<dyn UploadSource>, chunk_size: usize, progress: ProgressTracker) -> Self {
        Self {
            source: Mutex::new(Some(source)),
            chunk_size,
            progress,
        }
    }
}

impl Stream for UploadStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let slot = match this.source.get_mut() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(source) = slot.as_mut() else {
            return Poll::Ready(None);
        };

        match source.read(this.chunk_size) {
            Ok(chunk) if chunk.is_empty() => {
                *slot = None;
                Poll::Ready(None)
            }
            Ok(chunk) => {
                this.progress.uploaded(chunk.len());
                Poll::Ready(Some(Ok(chunk)))
            }
            Err(err) => {
                *slot = None;
                Poll::Ready(Some(Err(err)))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ProgressTracker
// ---------------------------------------------------------------------------

/**
 * Shared progress state for one transfer. Cloned into each upload stream;
 * fires the callback only when a per-mille value actually changes.
 */
#[derive(Clone, Default)]
pub(crate) struct ProgressTracker {
    inner: Option<Arc<Mutex<Tracker>>>,
}

struct Tracker {
    callback: ProgressCallback,
    upload_total: u64,
    uploaded: u64,
    upload_done: bool,
    download_total: Option<u64>,
    downloaded: u64,
    download_done: bool,
    last: Progress,
    disabled: bool,
}

impl Tracker {
    fn current(&self) -> Progress {
        let upload = if self.upload_done {
            1000
        } else {
            per_mille(self.uploaded, self.upload_total)
        };
        let download = if self.download_done {
            1000
        } else {
            self.download_total
                .map_or(0, |total| per_mille(self.downloaded, total))
        };
        Progress { upload, download }
    }
}

fn per_mille(done: u64, total: u64) -> u16 {
    if total == 0 {
        return 0;
    }
    (done.saturating_mul(1000) / total).min(1000) as u16
}

impl ProgressTracker {
    pub fn new(callback: Option<ProgressCallback>, upload_total: u64) -> Self {
        let inner = callback.map(|callback| {
            Arc::new(Mutex::new(Tracker {
                callback,
                upload_total,
                uploaded: 0,
                upload_done: false,
                download_total: None,
                downloaded: 0,
                download_done: false,
                last: Progress::default(),
                disabled: false,
            }))
        });
        Self { inner }
    }

    fn update(&self, apply: impl FnOnce(&mut Tracker)) {
        let Some(inner) = &self.inner else {
            return;
        };
        if let Ok(mut tracker) = inner.lock() {
            if tracker.disabled {
                return;
            }
            apply(&mut tracker);
            let now = tracker.current();
            if now != tracker.last {
                tracker.last = now;
                // A panicking callback is silenced; the transfer carries on.
                if catch_unwind(AssertUnwindSafe(|| (tracker.callback)(now))).is_err() {
                    tracing::warn!("progress callback panicked; further progress is not reported");
                    tracker.disabled = true;
                }
            }
        }
    }

    pub fn uploaded(&self, bytes: usize) {
        self.update(|t| t.uploaded += bytes as u64);
    }

    pub fn upload_complete(&self) {
        self.update(|t| t.upload_done = true);
    }

    pub fn download_started(&self, total: Option<u64>) {
        self.update(|t| t.download_total = total);
    }

    pub fn downloaded(&self, bytes: usize) {
        self.update(|t| t.downloaded += bytes as u64);
    }

    pub fn download_complete(&self) {
        self.update(|t| t.download_done = true);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use futures::StreamExt;

    use super::*;
    use crate::transport::upload::MemorySource;

    fn tracker(upload_total: u64) -> (ProgressTracker, mpsc::Receiver<Progress>) {
        let (tx, rx) = mpsc::channel();
        let tracker = ProgressTracker::new(
            Some(Box::new(move |p| {
                let _ = tx.send(p);
            })),
            upload_total,
        );
        (tracker, rx)
    }

    #[test]
    fn test_per_mille() {
        assert_eq!(per_mille(0, 0), 0);
        assert_eq!(per_mille(1, 3), 333);
        assert_eq!(per_mille(5, 4), 1000);
    }

    #[test]
    fn test_progress_reports_only_changes() {
        let (tracker, rx) = tracker(1000);
        tracker.uploaded(500);
        tracker.uploaded(0);
        tracker.upload_complete();
        tracker.download_started(None);
        tracker.downloaded(10);
        tracker.download_complete();

        let seen: Vec<Progress> = rx.try_iter().collect();
        assert_eq!(
            seen,
            vec![
                Progress { upload: 500, download: 0 },
                Progress { upload: 1000, download: 0 },
                Progress { upload: 1000, download: 1000 },
            ]
        );
    }

    #[test]
    fn test_panicking_progress_callback_is_disabled() {
        let calls = Arc::new(Mutex::new(0));
        let seen = Arc::clone(&calls);
        let tracker = ProgressTracker::new(
            Some(Box::new(move |_| {
                *seen.lock().unwrap() += 1;
                panic!("progress bug");
            })),
            100,
        );

        tracker.uploaded(50);
        tracker.uploaded(50);
        tracker.upload_complete();
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_tracker_without_callback_is_inert() {
        let tracker = ProgressTracker::new(None, 10);
        tracker.uploaded(10);
        tracker.upload_complete();
    }

    #[test]
    fn test_upload_stream_yields_bounded_chunks() {
        let (progress, rx) = tracker(10);
        let stream = UploadStream::new(Box::new(MemorySource::new(vec![1u8; 10])), 4, progress);

        let chunks: Vec<usize> = futures::executor::block_on(
            stream.map(|chunk| chunk.expect("memory reads never fail").len()).collect(),
        );
        assert_eq!(chunks, vec![4, 4, 2]);
        assert_eq!(rx.try_iter().last(), Some(Progress { upload: 1000, download: 0 }));
    }

    #[test]
    fn test_from_request_splits_done_callback() {
        let request = Request::get("http://h/p").query("a", "b").on_done(|_| {});
        let (transfer, done) = Transfer::from_request(request);
        assert_eq!(transfer.url(), "http://h/p?a=b");
        assert!(done.is_some());
    }
}
