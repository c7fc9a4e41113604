//! Fatal escalation for consumer failures
//!
//! A consumer that cannot process a block leaves block-driven state in an
//! unknown condition, so the dispatcher halts and hands the error to the
//! embedding process instead of retrying.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::DispatchError;

/// Callback invoked once with the first fatal error
pub type FatalHook = Arc<dyn Fn(&DispatchError) + Send + Sync>;

/// Captures the first fatal error and signals the embedding process
#[derive(Clone, Default)]
pub struct FatalErrorHandler {
    inner: Arc<FatalInner>,
}

#[derive(Default)]
struct FatalInner {
    triggered: AtomicBool,
    process_shutdown: Option<CancellationToken>,
    hook: Option<FatalHook>,
    captured_error: Mutex<Option<Arc<DispatchError>>>,
    notify: Notify,
}

impl FatalErrorHandler {
    /// Create a handler.
    ///
    /// `process_shutdown` is cancelled on the first fatal error; `hook`
    /// runs once with that error.
    pub fn new(process_shutdown: Option<CancellationToken>, hook: Option<FatalHook>) -> Self {
        Self {
            inner: Arc::new(FatalInner {
                process_shutdown,
                hook,
                ..Default::default()
            }),
        }
    }

    /// Record a fatal error.
    ///
    /// Only the first call logs, signals and runs the hook; later errors
    /// are returned to the caller but not captured.
    pub fn trigger(&self, error: DispatchError) -> Arc<DispatchError> {
        let error = Arc::new(error);
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            return error;
        }

        tracing::error!(
            severity = "critical",
            error = %error,
            "fatal blockbeat error; halting dispatch"
        );

        {
            let mut slot = self
                .inner
                .captured_error
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if slot.is_none() {
                *slot = Some(Arc::clone(&error));
            }
        }

        if let Some(hook) = &self.inner.hook {
            hook(&error);
        }
        if let Some(token) = &self.inner.process_shutdown {
            token.cancel();
        }
        self.inner.notify.notify_waiters();

        error
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// The captured fatal error, if any
    pub fn error(&self) -> Option<Arc<DispatchError>> {
        self.inner
            .captured_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Wait until a fatal error is captured
    pub async fn wait(&self) -> Arc<DispatchError> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(error) = self.error() {
                return error;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for FatalErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FatalErrorHandler")
            .field("triggered", &self.is_triggered())
            .field("error", &self.error())
            .finish()
    }
}
