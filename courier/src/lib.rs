/*!
 * Courier: reliable, batched telemetry delivery for Rust.
 *
 * This is the crate users should depend on. It re-exports the core API and
 * wires up addons (panic hook) through a single `init` call.
 *
 * # Quick start
 *
 * ```ignore
 * fn main() -> courier::Result<()> {
 *     let _guard = courier::init("UA-12345-1")?;
 *
 *     courier::page_view(42, "Home page", "example.com", "/", Some("en"));
 *     courier::event(42, "video", "play", None);
 *
 *     // panics are reported as fatal exceptions (catch_panics defaults to true)
 *     // _guard is dropped here → background threads stop
 *     Ok(())
 * }
 * ```
 *
 * # With options
 *
 * ```ignore
 * let mut core = courier::CoreOptions::with_tracking_id("UA-12345-1");
 * core.queue.batch_size = 5;
 * core.queue.mode = courier::DispatchMode::Single;
 *
 * let _guard = courier::init(courier::Options {
 *     core,
 *     catch_panics: false,
 * })?;
 * ```
 */

// ---------------------------------------------------------------------------
// Re-exports from courier_core: the public surface area
// ---------------------------------------------------------------------------

pub use courier_core::{
    capture_exception, capture_hit, escape, event, get_client, page_view, stats, unescape,
    unescape_bytes, Body, Callbacks, Client, DeliveryQueue, DispatchMode, Engine, Error,
    FileSource, Form, Guard, Hit, HitKind, MemorySource, Method, Progress, QueueOptions, Request,
    Result, Stats, SuccessAccounting, TransportOptions, Upload, UploadSource, DEFAULT_USER,
    USER_AGENT,
};

/// Core configuration, re-exported under a name that does not clash with
/// the facade's own [`Options`].
pub use courier_core::Options as CoreOptions;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/**
 * Configuration for the Courier facade.
 *
 * Implements `From<&str>` so a bare tracking id can be passed to `init()`,
 * and `From<CoreOptions>` for a fully configured core.
 */
#[derive(Debug, Clone)]
pub struct Options {
    /// Transport, queue and default-user settings.
    pub core: CoreOptions,

    /// Whether to install a panic hook that reports panics as fatal
    /// exception hits. Defaults to `true`.
    pub catch_panics: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            core: CoreOptions::default(),
            catch_panics: true,
        }
    }
}

/**
 * Allows `courier::init("UA-12345-1")` with all other options defaulted.
 */
impl From<&str> for Options {
    fn from(tracking_id: &str) -> Self {
        Self {
            core: CoreOptions::with_tracking_id(tracking_id),
            ..Default::default()
        }
    }
}

impl From<CoreOptions> for Options {
    fn from(core: CoreOptions) -> Self {
        Self {
            core,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

/**
 * Initializes Courier.
 *
 * Accepts a tracking id, a `CoreOptions` or a full `Options`. Returns a
 * `Guard`: keep it alive for the duration of your app.
 *
 * # Errors
 * Whatever `courier_core::init` returns; the panic hook is only installed
 * on success.
 */
pub fn init(options: impl Into<Options>) -> Result<Guard> {
    let Options {
        core,
        catch_panics,
    } = options.into();

    let guard = courier_core::init(core)?;

    if catch_panics {
        courier_panic::install();
    }

    Ok(guard)
}
