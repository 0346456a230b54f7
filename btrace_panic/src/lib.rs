/*!
 * btrace panic hook: automatic panic capture.
 *
 * This crate provides a single function `install()` that registers a
 * custom `std::panic::set_hook` handler. When a panic occurs, it:
 *
 * 1. Extracts the panic message, source location, and thread name.
 * 2. Captures a backtrace at the panic site.
 * 3. Builds an error report named `panic` and submits it through the
 *    client's background path, then waits briefly for delivery.
 * 4. Calls the previous panic hook (so the default stderr output is preserved).
 *
 * # Recursion safety
 *
 * The hook uses a `thread_local` boolean flag to prevent infinite recursion
 * if reporting itself were to panic.
 */

use std::any::Any;
use std::cell::Cell;
use std::panic;
use std::panic::PanicHookInfo;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use btrace_core::transport::WORKER_THREAD_NAME;
use btrace_core::{AttributeValue, Attributes, Client, Payload, DEFAULT_FLUSH_TIMEOUT};
use tracing::warn;

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Ensures `install()` is idempotent: hooks never stack.
static INSTALLED: AtomicBool = AtomicBool::new(false);

thread_local! {
    /// Set while this thread is inside the hook.
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/**
 * Installs the panic hook, reporting through `client`.
 *
 * Replaces the current panic hook with one that:
 * 1. Captures the panic as an error report.
 * 2. Forwards to the *previous* hook (preserving default behaviour).
 *
 * Idempotent: subsequent calls are silent no-ops.
 */
pub fn install(client: Arc<Client>) {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }

    let previous_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        let is_recursive = IN_HOOK.with(|flag| flag.replace(true));

        if !is_recursive {
            let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                handle_panic(&client, info);
            }));

            IN_HOOK.with(|flag| flag.set(false));
        }

        previous_hook(info);
    }));
}

// ---------------------------------------------------------------------------
// Internal: build and send the panic report
// ---------------------------------------------------------------------------

fn handle_panic(client: &Client, info: &PanicHookInfo) {
    let message = panic_message(info.payload());

    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("<unnamed>").to_string();

    let bt = backtrace::Backtrace::new();
    let stack = btrace_core::convert_backtrace(&bt);

    let mut attributes = Attributes::new();
    attributes.insert("error.type".into(), "Unhandled exception".into());
    if let Some(location) = info.location() {
        attributes.insert(
            "exception.lineNumber".into(),
            AttributeValue::from(location.line()),
        );
        attributes.insert(
            "exception.columnNumber".into(),
            AttributeValue::from(location.column()),
        );
    }

    let payload = Payload::Error {
        name: "panic".to_string(),
        message: message.clone(),
        stack,
    };
    let mut report = client.create_report(payload, attributes, None);
    report.add_annotation(
        "panic",
        serde_json::json!({
            "message": message,
            "file": info.location().map(|l| l.file()),
            "line": info.location().map(|l| l.line()),
            "thread": thread_name,
        }),
    );

    if let Err(e) = client.send_report(report, None) {
        warn!(error = %e, "failed to report panic");
        return;
    }

    /*
     * The process may be about to exit. The worker cannot flush itself, so
     * a panic on the worker thread is left queued.
     */
    if thread_name != WORKER_THREAD_NAME && !client.flush(DEFAULT_FLUSH_TIMEOUT) {
        warn!("timed out delivering panic report");
    }
}

/// Extracts the text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    match payload.downcast_ref::<&str>() {
        Some(s) => (*s).to_string(),
        None => match payload.downcast_ref::<String>() {
            Some(s) => s.clone(),
            None => "<unknown panic>".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let text: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(text.as_ref()), "static message");

        let owned: Box<dyn Any + Send> = Box::new(format!("code {}", 7));
        assert_eq!(panic_message(owned.as_ref()), "code 7");

        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(other.as_ref()), "<unknown panic>");
    }
}
