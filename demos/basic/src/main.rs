/**
 * Minimal harness for the btrace SDK.
 *
 * Set BTRACE_ENDPOINT to a submission URL (and BTRACE_TOKEN if the URL does
 * not carry one), then run the commands below. Without BTRACE_ENDPOINT the
 * demo posts to a placeholder and usage metrics stay off.
 *
 *   cargo run -p btrace_demo
 *   cargo run -p btrace_demo -- --panic        # test panic capture
 *   cargo run -p btrace_demo -- --filter       # drop every report locally
 *
 * Diagnostics are printed through `tracing`; use RUST_LOG=debug to see
 * admission decisions.
 */
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

const DEFAULT_ENDPOINT: &str = "https://submit.backtrace.io/demo/PASTE_YOUR_TOKEN_HERE/json";

fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Vec<String> = std::env::args().collect();
    let test_panic = args.iter().any(|a| a == "--panic");
    let test_filter = args.iter().any(|a| a == "--filter");

    let configured = std::env::var("BTRACE_ENDPOINT").ok();
    let enable_metrics_support = configured.is_some();
    let endpoint = configured.unwrap_or_else(|| DEFAULT_ENDPOINT.into());

    let mut core = btrace::CoreOptions {
        token: std::env::var("BTRACE_TOKEN").ok(),
        rate_limit: 5,
        breadcrumb_limit: Some(20),
        enable_metrics_support,
        ..btrace::CoreOptions::new(endpoint)
    };
    if test_filter {
        println!("[demo] Initializing with a filter that drops everything");
        core.filter = Some(Arc::new(|_: &btrace::Report| true));
    }

    let _guard = btrace::init(core);

    btrace::memorize("demo.run", "basic");
    btrace::leave_breadcrumb("demo started");

    /*
     * Direct path: the outcome comes back on this thread.
     */
    match btrace::report("Hello from the btrace demo!") {
        Some(Ok(result)) => println!("[demo] Direct report: {:?} {}", result.status(), result.message()),
        Some(Err(e)) => println!("[demo] Direct report failed: {e}"),
        None => println!("[demo] btrace is not initialized"),
    }

    /*
     * Background path: queued for the worker, resolved by the callback.
     */
    if let Some(client) = btrace::client() {
        let report = client.create_report(
            "background report",
            btrace::Attributes::from([("attempt".to_string(), btrace::AttributeValue::from(1))]),
            Some(btrace::Attachment::json(
                "context.json",
                &serde_json::json!({ "source": "demo", "attempt": 1 }),
            )),
        );
        let queued = client.send_report(
            report,
            Some(Box::new(|result: btrace::ReportResult| {
                println!("[demo] Background report resolved: {:?}", result.status());
            })),
        );
        if let Ok(result) = queued {
            println!("[demo] Background report: {:?}", result.status());
        }
    }

    match std::fs::read_to_string("/nonexistent/path.txt") {
        Ok(_) => {}
        Err(e) => {
            btrace::report_error(&e);
            println!("[demo] Reported an io::Error: {e}");
        }
    }

    btrace::flush(Duration::from_secs(5));

    if test_panic {
        println!("[demo] Triggering a panic...");
        panic!("Test panic from the btrace demo");
    }

    println!("[demo] Done. Pending reports are flushed when _guard drops.");
}
