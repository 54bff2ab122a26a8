//! Leading+trailing throttle around `render` calls: wrapped in a fixed wait
//! (≈100 ms). Two successive calls within the wait window collapse to one;
//! the trailing call sees the latest arguments.
//!
//! Uses the same channel-decoupled background task pattern as the tile
//! fetcher, adapted here to a `tokio::time::sleep`-driven window instead
//! of a fetch task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::viewport::Viewport;

/// Coalesces rapid `request` calls into at most one immediate ("leading")
/// invocation and, if further calls arrive before `wait` elapses, exactly
/// one more ("trailing") invocation with the latest viewport.
pub struct RenderThrottle {
    wait: Duration,
    pending: Arc<Mutex<Option<Viewport>>>,
    in_window: Arc<AtomicBool>,
    callback: Arc<dyn Fn(Viewport) + Send + Sync>,
}

impl RenderThrottle {
    pub fn new(wait: Duration, callback: impl Fn(Viewport) + Send + Sync + 'static) -> Self {
        Self {
            wait,
            pending: Arc::new(Mutex::new(None)),
            in_window: Arc::new(AtomicBool::new(false)),
            callback: Arc::new(callback),
        }
    }

    /// Requests a render for `viewport`. Runs immediately if no window is
    /// currently open; otherwise records `viewport` as the latest pending
    /// request and returns — a background task already running for the
    /// current window will pick it up as the trailing call.
    pub fn request(&self, viewport: Viewport) {
        if self.in_window.swap(true, Ordering::SeqCst) {
            *self.pending.lock().unwrap() = Some(viewport);
            return;
        }

        (self.callback)(viewport);

        let wait = self.wait;
        let pending = self.pending.clone();
        let in_window = self.in_window.clone();
        let callback = self.callback.clone();
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            in_window.store(false, Ordering::SeqCst);
            if let Some(trailing) = pending.lock().unwrap().take() {
                callback(trailing);
            }
        });
    }
}
