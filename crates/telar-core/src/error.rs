#![forbid(unsafe_code)]

//! Load-time and lifecycle errors.
//!
//! Loading story data or configuration can fail, and lifecycle calls can
//! arrive in the wrong order. Once a runtime is running, every other failure
//! degrades to a logged warning and a typed outcome value instead of an
//! error.

/// Failure to load story data or runtime configuration.
#[derive(Debug)]
pub enum LoadError {
    /// JSON parse error.
    Json(serde_json::Error),
    /// Parsed successfully but failed validation.
    Validation(Vec<String>),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Validation(errors) => {
                write!(f, "validation errors: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// A lifecycle call made in the wrong state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    /// The story is protected and has not been unlocked.
    Locked,
    /// `unlock` on a story that is not waiting for it.
    NotLocked,
    /// `initialize` ran already.
    AlreadyRunning,
    /// The runtime was torn down.
    TornDown,
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Locked => write!(f, "story is locked; waiting for unlock"),
            Self::NotLocked => write!(f, "story is not waiting for unlock"),
            Self::AlreadyRunning => write!(f, "runtime already initialized"),
            Self::TornDown => write!(f, "runtime was torn down"),
        }
    }
}

impl std::error::Error for LifecycleError {}
