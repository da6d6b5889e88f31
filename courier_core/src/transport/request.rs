/*!
 * Request descriptions handed to the transport engine.
 *
 * A `Request` is built on the caller's thread and moved into the engine by
 * `Engine::submit`. From then on the engine owns it: callbacks run on the
 * engine's worker thread, never on the caller's.
 */
use bytes::Bytes;

use super::upload::Upload;
use crate::protocol::escape::append_query;

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// Called with each chunk of the response body. Return `false` to abort the
/// transfer, which then completes with `success = false`.
pub type ChunkCallback = Box<dyn FnMut(&[u8]) -> bool + Send>;

/// Called exactly once with the transfer's success flag.
pub type DoneCallback = Box<dyn FnOnce(bool) + Send>;

/// Called whenever upload or download progress changes by at least one
/// per-mille step.
pub type ProgressCallback = Box<dyn FnMut(Progress) + Send>;

/**
 * Transfer progress in per-mille (0–1000).
 *
 * A direction with an unknown total (no `Content-Length` on the response,
 * or nothing to upload) stays at 0 until the transfer finishes.
 */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub upload: u16,
    pub download: u16,
}

/**
 * The optional callbacks of a request, grouped for the `get`/`post`
 * shortcuts on the engine.
 */
#[derive(Default)]
pub struct Callbacks {
    pub on_chunk: Option<ChunkCallback>,
    pub on_done: Option<DoneCallback>,
    pub on_progress: Option<ProgressCallback>,
}

impl Callbacks {
    /// Only a completion callback.
    pub fn done(f: impl FnOnce(bool) + Send + 'static) -> Self {
        Self {
            on_done: Some(Box::new(f)),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/**
 * Multipart form: plain fields followed by file parts, both in insertion
 * order. Field names may repeat.
 */
#[derive(Default)]
pub struct Form {
    pub(crate) fields: Vec<(String, String)>,
    pub(crate) uploads: Vec<Upload>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn upload(mut self, upload: Upload) -> Self {
        self.uploads.push(upload);
        self
    }

    /// Total bytes of all upload sources.
    pub fn upload_size(&self) -> u64 {
        self.uploads.iter().map(Upload::size).sum()
    }
}

pub enum Body {
    Form(Form),
    Raw { content_type: String, data: Bytes },
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/**
 * One outbound HTTP call.
 *
 * ```ignore
 * let request = Request::get("https://example.com/collect")
 *     .query("v", "1")
 *     .query("t", "pageview")
 *     .on_done(|ok| println!("delivered: {ok}"));
 * engine.submit(request);
 * ```
 */
pub struct Request {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Option<Body>,
    pub(crate) basic_auth: Option<(String, Option<String>)>,
    pub(crate) callbacks: Callbacks,
}

impl Request {
    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            body: None,
            basic_auth: None,
            callbacks: Callbacks::default(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Appends a query parameter. Keys may repeat; order is kept.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn queries<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sends a multipart form body.
    pub fn form(mut self, form: Form) -> Self {
        self.body = Some(Body::Form(form));
        self
    }

    /// Sends `data` verbatim with the given content type.
    pub fn body(mut self, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.body = Some(Body::Raw {
            content_type: content_type.into(),
            data: data.into(),
        });
        self
    }

    pub fn basic_auth(mut self, user: impl Into<String>, password: Option<String>) -> Self {
        self.basic_auth = Some((user.into(), password));
        self
    }

    pub fn on_chunk(mut self, f: impl FnMut(&[u8]) -> bool + Send + 'static) -> Self {
        self.callbacks.on_chunk = Some(Box::new(f));
        self
    }

    pub fn on_done(mut self, f: impl FnOnce(bool) + Send + 'static) -> Self {
        self.callbacks.on_done = Some(Box::new(f));
        self
    }

    pub fn on_progress(mut self, f: impl FnMut(Progress) + Send + 'static) -> Self {
        self.callbacks.on_progress = Some(Box::new(f));
        self
    }

    /// Replaces all callbacks at once.
    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Full target URL including the rendered query string.
    pub fn target_url(&self) -> String {
        append_query(&self.url, &self.query)
    }
}
