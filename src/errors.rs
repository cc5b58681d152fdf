/*!
 * Error Types
 * Synchronizer error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use smartstring::alias::String as SmartString;
use thiserror::Error;

/// Short error context stored inline (≤23 bytes without allocation)
pub type InlineString = SmartString;

/// Errors raised by synchronizer entry points and strategy hooks
///
/// Timed operations never produce an error on timeout: they report it through
/// their `bool` (or remaining-time) result instead.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SyncError {
    #[error("Illegal monitor state: {0}")]
    #[diagnostic(
        code(sync::illegal_monitor_state),
        help("The calling thread must hold the synchronizer exclusively for this operation.")
    )]
    IllegalMonitorState(InlineString),

    #[error("Thread was interrupted")]
    #[diagnostic(
        code(sync::interrupted),
        help("An interrupt was delivered while the thread was waiting. The wait was abandoned.")
    )]
    Interrupted,

    #[error("Operation not supported: {0}")]
    #[diagnostic(
        code(sync::unsupported),
        help("The strategy does not implement this hook. Override it to use this mode.")
    )]
    Unsupported(InlineString),

    #[error("Condition object belongs to a different synchronizer")]
    #[diagnostic(
        code(sync::foreign_condition),
        help("Use conditions only with the synchronizer that created them.")
    )]
    ForeignCondition,
}

impl SyncError {
    /// Shorthand for an [`SyncError::IllegalMonitorState`] with context
    pub fn illegal_monitor_state(msg: impl Into<InlineString>) -> Self {
        SyncError::IllegalMonitorState(msg.into())
    }

    /// Shorthand for an [`SyncError::Unsupported`] naming the missing hook
    pub fn unsupported(hook: impl Into<InlineString>) -> Self {
        SyncError::Unsupported(hook.into())
    }

    /// Whether the error came from an interrupt rather than misuse
    #[inline]
    pub fn is_interrupt(&self) -> bool {
        matches!(self, SyncError::Interrupted)
    }
}

/// Result type for synchronizer operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;
