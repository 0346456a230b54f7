//! Periodic session persistence.
//!
//! While the host application is visible, the heartbeat thread records
//! activity once per interval so the metrics session stays alive. Time
//! spent in the background does not extend the session.
//!
//! The thread also sends the session's launch events before its first tick,
//! so starting a client never waits on the metrics host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use super::session::MetricsSession;
use crate::error::ConfigError;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// How long dropping a [`Heartbeat`] waits for an in-flight request.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Whether the host application is currently in the foreground.
pub trait Visibility: Send + Sync {
    fn is_visible(&self) -> bool;
}

impl<F> Visibility for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_visible(&self) -> bool {
        self()
    }
}

/// Headless processes are always in the foreground.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysVisible;

impl Visibility for AlwaysVisible {
    fn is_visible(&self) -> bool {
        true
    }
}

/// A switch the host flips when it moves between foreground and background.
#[derive(Debug)]
pub struct VisibilityFlag(AtomicBool);

impl VisibilityFlag {
    pub fn new(visible: bool) -> Self {
        Self(AtomicBool::new(visible))
    }

    pub fn set(&self, visible: bool) {
        self.0.store(visible, Ordering::Relaxed);
    }
}

impl Default for VisibilityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Visibility for VisibilityFlag {
    fn is_visible(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/**
 * Handle to a running heartbeat thread. Dropping it stops the thread and
 * waits up to [`SHUTDOWN_GRACE`] for it to exit; a thread still blocked
 * on the network after that is detached.
 */
pub struct Heartbeat {
    stop: Option<Sender<()>>,
    exited: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Starts ticking every `interval`.
    pub fn start(
        session: Arc<MetricsSession>,
        visibility: Arc<dyn Visibility>,
        interval: Duration,
    ) -> Result<Self, ConfigError> {
        let (stop, stopped) = bounded::<()>(0);
        // Never sent on: the sender drops when the thread returns.
        let (exit_guard, exited) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("btrace-heartbeat".into())
            .spawn(move || {
                let _exit_guard = exit_guard;
                session.send_pending_events();

                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if visibility.is_visible() {
                                session.persist_session();
                            } else {
                                debug!("application hidden; session not extended");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|source| ConfigError::Spawn {
                name: "btrace-heartbeat",
                source,
            })?;

        Ok(Self {
            stop: Some(stop),
            exited,
            handle: Some(handle),
        })
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        // Disconnecting the channel wakes the thread immediately.
        drop(self.stop.take());

        match self.exited.recv_timeout(SHUTDOWN_GRACE) {
            Err(RecvTimeoutError::Timeout) => {
                warn!("metrics heartbeat still busy; detaching it");
            }
            _ => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
            }
        }
    }
}
