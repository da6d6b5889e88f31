/*!
 * Minimal harness for the Courier Rust crate.
 *
 * Replace the TRACKING_ID constant with a real property id, then run:
 *
 *   cargo run -p courier_demo
 *   cargo run -p courier_demo -- --single   # one GET per hit instead of batches
 *   cargo run -p courier_demo -- --panic    # test panic capture
 *
 * Set `RUST_LOG=courier_core=debug` to watch dispatches and retries.
 */
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

/// Paste your tracking id here.
const TRACKING_ID: &str = "UA-XXXXXXXX-1";

/// How long to wait for the queue to report a delivery before exiting.
const WAIT_LIMIT: Duration = Duration::from_secs(15);

fn main() -> courier::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("courier_core=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let single = args.iter().any(|a| a == "--single");
    let test_panic = args.iter().any(|a| a == "--panic");

    /*
     * Small batches and a short flush interval so the demo finishes
     * quickly.
     */
    let mut core = courier::CoreOptions::with_tracking_id(TRACKING_ID);
    core.queue.flush_interval = Duration::from_secs(2);
    if single {
        core.queue.mode = courier::DispatchMode::Single;
    }

    let _guard = courier::init(core)?;
    println!("[demo] Initialized ({} mode)", if single { "single" } else { "batch" });

    courier::page_view(42, "Home page", "example.com", "/", Some("en"));
    courier::event(42, "video", "play", None);
    courier::capture_hit(
        courier::Hit::event(42, "video", "seek")
            .with_label("intro")
            .with_value(30),
    );
    println!("[demo] Queued three hits");

    if test_panic {
        println!("[demo] Triggering a panic on a worker thread...");
        let _ = std::thread::spawn(|| panic!("Test panic from Courier demo")).join();
    }

    /*
     * Shutdown does not flush, so wait for the next deadline drain to
     * settle.
     */
    let started = Instant::now();
    loop {
        let stats = courier::stats();
        if stats.successful > 0 || stats.failed > 0 {
            println!("[demo] successful={} failed={}", stats.successful, stats.failed);
            break;
        }
        if started.elapsed() > WAIT_LIMIT {
            println!("[demo] No delivery settled within {WAIT_LIMIT:?}");
            break;
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    Ok(())
}
