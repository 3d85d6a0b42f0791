//! Cooperative cancellation.
//!
//! A [`CancellationSource`] owns the only way to cancel; any number of
//! [`CancellationToken`]s can poll it. Both wrap a shared
//! [`tokio_util::sync::CancellationToken`], but only the source exposes
//! `cancel`. Cancellation takes effect only where running code checks the
//! token, never in the middle of a request.

use thiserror::Error;
use tokio_util::sync::CancellationToken as SharedToken;

/// Raised by [`CancellationToken::throw_if_cancelled`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Read-only view of a cancellation flag.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: SharedToken,
}

impl CancellationToken {
    /// A token nothing can cancel.
    pub fn none() -> Self {
        Self {
            inner: SharedToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    pub fn throw_if_cancelled(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Owner of a cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationSource {
    inner: SharedToken,
}

impl CancellationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            inner: self.inner.clone(),
        }
    }

    /// Cancels every token handed out. Returns `false` if it was already cancelled.
    pub fn cancel(&self) -> bool {
        let flipped = !self.inner.is_cancelled();
        self.inner.cancel();
        flipped
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}

/// Keeps at most one run active; starting a new run cancels the previous one.
#[derive(Debug, Default)]
pub struct RunController {
    active: Option<CancellationSource>,
}

impl RunController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels any outstanding run and returns the source for a new one.
    pub fn begin(&mut self) -> CancellationSource {
        if self.cancel_active() {
            tracing::info!("cancelled the previous run before starting a new one");
        }
        let source = CancellationSource::new();
        self.active = Some(source.clone());
        source
    }

    /// Cancels the active run, if any. Returns whether a run was cancelled by this call.
    pub fn cancel_active(&mut self) -> bool {
        self.active.as_ref().is_some_and(CancellationSource::cancel)
    }

    /// Forgets the active run without cancelling it.
    pub fn finish(&mut self) {
        self.active = None;
    }

    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|source| !source.is_cancelled())
    }
}
