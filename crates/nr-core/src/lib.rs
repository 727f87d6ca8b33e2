//! Shared primitives used across NoRedirect crates.

pub mod clock;
pub mod history;
pub mod verdict;

pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use history::BlockEntry;
pub use history::BlockHistory;
pub use history::DEFAULT_HISTORY_CAPACITY;
pub use verdict::ComponentId;
pub use verdict::RedirectKind;
pub use verdict::RedirectVerdict;

/// Result alias used across the workspace.
pub type GuardResult<T> = Result<T, GuardError>;

/// Browsing-context identifier as handed out by the host browser.
///
/// Reports that arrive without a sender tab use [`NO_TAB`].
pub type TabId = i64;

/// Tab id recorded for blocks that no browsing context can be attributed to.
pub const NO_TAB: TabId = -1;

/// Workspace error: a stable dotted code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct GuardError {
    pub code: &'static str,
    pub message: String,
}

impl GuardError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
