//! Fire-and-forget handler execution with fault isolation and drain.
//!
//! Each unit of work runs on its own tokio task behind a `catch_unwind`
//! boundary. An in-flight counter is bumped before the task is spawned and
//! released when it finishes, however it finishes, which is what
//! [`Dispatcher::drain`] waits on.
//!
//! `invoke` bumps the counter before it looks at the drained flag, and
//! `drain` sets the flag before its final look at the counter. Both sides use
//! `SeqCst`, so any work `drain` does not see is refused.
//!
//! There is no ordering between invocations, not even for one context.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use keydeck_core::ContextId;
use keydeck_protocol::Command;
use keydeck_settings::DispatcherSettings;
use tracing::{Instrument, debug, error, info, warn};

use crate::errors::{DispatchError, HandlerError};
use crate::sink::CommandSink;

/// Runs handler work concurrently and reports faults to the host.
pub struct Dispatcher {
    sink: Arc<dyn CommandSink>,
    settings: DispatcherSettings,
    in_flight: Arc<AtomicUsize>,
    faults: Arc<AtomicU64>,
    drained: AtomicBool,
}

/// Releases one in-flight slot when dropped, including on panic or abort.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Dispatcher {
    /// Create a dispatcher reporting faults through `sink`.
    pub fn new(sink: Arc<dyn CommandSink>, settings: DispatcherSettings) -> Self {
        Self {
            sink,
            settings,
            in_flight: Arc::new(AtomicUsize::new(0)),
            faults: Arc::new(AtomicU64::new(0)),
            drained: AtomicBool::new(false),
        }
    }

    /// Schedule `work` and return immediately.
    ///
    /// `origin` is the context the work was triggered for; a fault flashes
    /// the alert glyph there when it is present and non-empty. The work runs
    /// inside the caller's current span.
    pub fn invoke<F>(&self, work: F, origin: Option<ContextId>) -> Result<(), DispatchError>
    where
        F: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let _ = self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        if self.drained.load(Ordering::SeqCst) {
            drop(guard);
            return Err(DispatchError::Drained);
        }
        let sink = Arc::clone(&self.sink);
        let faults = Arc::clone(&self.faults);
        let alert = self.settings.alert_on_fault;

        drop(tokio::spawn(
            async move {
                let _guard = guard;
                let fault = match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(Ok(())) => return,
                    Ok(Err(e)) => e,
                    Err(panic) => HandlerError::Panicked(panic_message(panic.as_ref())),
                };
                let _ = faults.fetch_add(1, Ordering::Relaxed);
                report_fault(sink.as_ref(), &fault, origin.as_ref(), alert).await;
            }
            .instrument(tracing::Span::current()),
        ));
        Ok(())
    }

    /// Number of units currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Number of faults reported since creation.
    pub fn fault_count(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    /// Whether [`drain`](Self::drain) has run.
    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::SeqCst)
    }

    /// Wait until nothing is in flight or `timeout` elapses, then refuse
    /// every later [`invoke`](Self::invoke).
    ///
    /// Returns `true` if all work finished in time. Work still running after
    /// the timeout is left alone. Calling it again is harmless.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let poll = self.settings.drain_poll_interval().max(Duration::from_millis(1));

        let finished = loop {
            if self.in_flight() == 0 {
                // Close the door, then look once more for work that slipped in.
                self.drained.store(true, Ordering::SeqCst);
                if self.in_flight() == 0 {
                    break true;
                }
            }
            let pending = self.in_flight();
            if tokio::time::Instant::now() >= deadline {
                warn!(pending, ?timeout, "drain timed out with handlers still running");
                break false;
            }
            tokio::time::sleep(poll).await;
        };

        self.drained.store(true, Ordering::SeqCst);
        info!(finished, faults = self.fault_count(), "dispatcher drained");
        finished
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("in_flight", &self.in_flight())
            .field("faults", &self.fault_count())
            .field("drained", &self.is_drained())
            .finish_non_exhaustive()
    }
}

async fn report_fault(
    sink: &dyn CommandSink,
    fault: &HandlerError,
    origin: Option<&ContextId>,
    alert: bool,
) {
    let origin = origin.filter(|c| !c.is_empty());
    let context = origin.map_or("", ContextId::as_str);
    error!(context, error = %fault, "handler fault");

    let message = match origin {
        Some(c) => format!("handler fault in {c}: {fault}"),
        None => format!("handler fault: {fault}"),
    };
    if let Err(e) = sink.send(Command::log(message)).await {
        debug!(error = %e, "could not forward fault to host log");
    }
    if let (true, Some(c)) = (alert, origin) {
        if let Err(e) = sink.send(Command::alert(c.clone())).await {
            debug!(error = %e, context = %c, "could not show alert");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
