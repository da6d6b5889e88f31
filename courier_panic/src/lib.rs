/*!
 * Courier Panic Hook: reports panics as fatal exception hits.
 *
 * This crate provides a single function `install()` that registers a
 * custom `std::panic::set_hook` handler. When a panic occurs, it:
 *
 * 1. Extracts the panic message, source location and thread name.
 * 2. Walks a backtrace for the first frame outside the runtime.
 * 3. Enqueues an exception hit with `fatal = true` via
 *    `courier_core::capture_exception()`.
 * 4. Calls the previous panic hook, so the default stderr output is kept.
 *
 * The hit is only queued. Whether it is delivered depends on the process
 * living until the next dispatch.
 *
 * # Recursion safety
 *
 * A `thread_local` flag stops the hook from re-entering itself if
 * `capture_exception` were to panic.
 */

use std::cell::Cell;
use std::panic::{self, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Makes `install()` idempotent: one hook, one hit per panic.
static INSTALLED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// Frames from these paths are the panic machinery, not the panicking code.
const SKIPPED_PREFIXES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "backtrace::",
    "courier_panic::",
    "courier_core::",
    "rust_begin_unwind",
    "__rust",
];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/**
 * Installs the Courier panic hook.
 *
 * Idempotent: subsequent calls are silent no-ops. Panics before
 * `courier_core::init()` are forwarded to the previous hook only.
 */
pub fn install() {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }

    let previous_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        let is_recursive = IN_HOOK.with(|flag| flag.replace(true));

        if !is_recursive {
            let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                handle_panic(info);
            }));

            IN_HOOK.with(|flag| flag.set(false));
        }

        previous_hook(info);
    }));
}

// ---------------------------------------------------------------------------
// Internal: build and enqueue the exception hit
// ---------------------------------------------------------------------------

fn handle_panic(info: &PanicHookInfo) {
    let message = match info.payload().downcast_ref::<&str>() {
        Some(s) => (*s).to_string(),
        None => match info.payload().downcast_ref::<String>() {
            Some(s) => s.clone(),
            None => "<unknown panic>".to_string(),
        },
    };

    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()));

    let thread_name = std::thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_string();

    let frame = first_user_frame(&backtrace::Backtrace::new());

    let description = describe(&message, location.as_deref(), &thread_name, frame.as_deref());
    courier_core::capture_exception(&description, true);
}

/// `panic: <message> at <file:line> [thread: <name>] in <function>`
fn describe(message: &str, location: Option<&str>, thread: &str, function: Option<&str>) -> String {
    let mut description = format!("panic: {message}");
    if let Some(location) = location {
        description.push_str(" at ");
        description.push_str(location);
    }
    description.push_str(&format!(" [thread: {thread}]"));
    if let Some(function) = function {
        description.push_str(" in ");
        description.push_str(function);
    }
    description
}

/**
 * Name of the innermost resolved frame that is not part of the panic or
 * unwinding machinery, with the trailing hash stripped.
 */
fn first_user_frame(bt: &backtrace::Backtrace) -> Option<String> {
    bt.frames()
        .iter()
        .flat_map(|frame| frame.symbols())
        .filter_map(|symbol| symbol.name().map(|name| format!("{name:#}")))
        .find(|name| !SKIPPED_PREFIXES.iter().any(|prefix| name.starts_with(prefix)))
}
