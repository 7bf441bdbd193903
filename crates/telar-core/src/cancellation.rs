#![forbid(unsafe_code)]

//! Cooperative cancellation for readiness watches.
//!
//! A [`CancellationSource`] stays with the owner of a resource (a viewer card)
//! and hands out [`CancellationToken`]s to whatever works on its behalf (the
//! readiness watch polling that card's surface). Evicting the card cancels the
//! source, and the watch notices on its next poll and drops out instead of
//! polling a detached surface until its timeout.
//!
//! # Example
//!
//! ```
//! use telar_core::cancellation::CancellationSource;
//!
//! let source = CancellationSource::new();
//! let token = source.token();
//! assert!(!token.is_cancelled());
//! source.cancel();
//! assert!(token.is_cancelled());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cloneable cancellation token.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

/// The control handle that triggers cancellation.
///
/// Dropping the source does **not** cancel the token; call
/// [`cancel`](Self::cancel) explicitly.
#[derive(Debug)]
pub struct CancellationSource {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSource {
    /// Create a new cancellation source with an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a cloneable token that observes this source's state.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Signal cancellation to every token derived from this source.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Returns `true` if cancellation has been requested.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
