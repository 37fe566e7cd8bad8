//! Per-module teardown tracking

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use crate::application::errors::DisposeError;

type DisposeFn = Box<dyn FnOnce() -> Result<(), DisposeError> + Send>;

/// A zero-argument teardown callback
pub struct Disposer {
    label: String,
    run: DisposeFn,
}

impl Disposer {
    /// An infallible disposer
    pub fn new<F>(label: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            label: label.into(),
            run: Box::new(move || {
                f();
                Ok(())
            }),
        }
    }

    /// A disposer that may report failure
    pub fn fallible<F>(label: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> Result<(), DisposeError> + Send + 'static,
    {
        Self {
            label: label.into(),
            run: Box::new(f),
        }
    }

    /// A disposer that does nothing
    pub fn noop() -> Self {
        Self::new("noop", || {})
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run the teardown; panics are converted into errors
    pub fn dispose(self) -> Result<(), DisposeError> {
        let label = self.label;
        match catch_unwind(AssertUnwindSafe(self.run)) {
            Ok(result) => result,
            Err(panic) => Err(DisposeError {
                label,
                reason: panic_message(&*panic),
            }),
        }
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer").field("label", &self.label).finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// Outcome of a `dispose_all` pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DisposeReport {
    pub attempted: usize,
    pub failed: usize,
}

struct TrackerState {
    disposers: Vec<Disposer>,
    closed: bool,
}

/// Registry of teardown callbacks for one module generation
///
/// Once closed by `dispose_all`, late registrations (e.g. from a task that
/// outlived its module) are disposed immediately instead of leaking.
pub struct LifecycleTracker {
    module: String,
    state: Mutex<TrackerState>,
}

impl LifecycleTracker {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            state: Mutex::new(TrackerState {
                disposers: Vec::new(),
                closed: false,
            }),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Register a teardown
    pub fn add(&self, disposer: Disposer) {
        let late = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.closed {
                Some(disposer)
            } else {
                state.disposers.push(disposer);
                None
            }
        };
        if let Some(disposer) = late {
            tracing::warn!(
                module = %self.module,
                disposer = disposer.label(),
                "Disposable added after teardown, disposing now"
            );
            if let Err(e) = disposer.dispose() {
                tracing::warn!(module = %self.module, "{}", e);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.disposers.len())
            .unwrap_or_else(|e| e.into_inner().disposers.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.closed)
            .unwrap_or_else(|e| e.into_inner().closed)
    }

    /// Run every registered disposer exactly once, newest first
    ///
    /// Individual failures are logged and never abort the remaining
    /// teardown. Calling again once empty is a no-op.
    pub fn dispose_all(&self) -> DisposeReport {
        let disposers = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.closed = true;
            std::mem::take(&mut state.disposers)
        };

        let mut report = DisposeReport::default();
        for disposer in disposers.into_iter().rev() {
            report.attempted += 1;
            if let Err(e) = disposer.dispose() {
                report.failed += 1;
                tracing::warn!(module = %self.module, "{}", e);
            }
        }

        if report.attempted > 0 {
            tracing::debug!(
                module = %self.module,
                attempted = report.attempted,
                failed = report.failed,
                "Disposed module resources"
            );
        }
        report
    }
}
