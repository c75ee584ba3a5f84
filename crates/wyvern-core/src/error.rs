use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WyvernError {
    // Plugin errors
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Invalid plugin config for {plugin}: {message}")]
    InvalidPluginConfig { plugin: String, message: String },

    // Graph construction errors
    #[error("Duplicate flap name: {0}")]
    DuplicateFlapName(String),

    #[error("Flap {flap} references unknown flap {reference}")]
    UnknownFlapReference { flap: String, reference: String },

    #[error("Soar {0} has flaps but no root flap, every flap sits on a cycle")]
    CyclicGraph(String),

    // Orchestrator errors
    #[error("Soar not found: {0}")]
    SoarNotFound(String),

    #[error("Soar already running: {0}")]
    SoarAlreadyRunning(String),

    // Execution errors
    #[error("Flap failed: {flap} ({flap_id})")]
    FlapFailed { flap: String, flap_id: String },

    #[error("Traversal fault: {0}")]
    Traversal(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Store error: {0}")]
    Store(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WyvernError>;

/// Why a single tick did not run (or finish) a flap's action.
///
/// Most variants mean "nothing to do this tick" and are swallowed by the
/// scheduler; only `AlreadyFailed` and `ActionPanicked` stop a tick pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickError {
    #[error("flap parents are not all finished")]
    ParentsNotAllFinished,

    #[error("flap is not ready")]
    NotReady,

    #[error("flap is already success")]
    AlreadySuccess,

    #[error("flap is already failed")]
    AlreadyFailed,

    #[error("flap waits for next awake time")]
    WaitForAwake,

    #[error("flap action panicked: {0}")]
    ActionPanicked(String),
}

impl TickError {
    /// True for outcomes that only mean "not this tick".
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TickError::ParentsNotAllFinished
                | TickError::NotReady
                | TickError::AlreadySuccess
                | TickError::WaitForAwake
        )
    }
}

/// Failure reported by an action's `execute`.
///
/// A failure carrying `retry_at` is retryable: the flap sleeps until that
/// instant and runs the action again. Without it the flap fails for good.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ActionError {
    pub message: String,
    pub retry_at: Option<DateTime<Utc>>,
}

impl ActionError {
    /// A terminal failure.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_at: None,
        }
    }

    /// A retryable failure, woken again at `at`.
    pub fn retry_at(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            retry_at: Some(at),
        }
    }

    /// A retryable failure, woken again `after` from now.
    pub fn retry_after(message: impl Into<String>, after: std::time::Duration) -> Self {
        let after = chrono::Duration::from_std(after)
            .unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX)));
        let at = Utc::now()
            .checked_add_signed(after)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::retry_at(message, at)
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_tick_errors() {
        assert!(TickError::ParentsNotAllFinished.is_transient());
        assert!(TickError::NotReady.is_transient());
        assert!(TickError::AlreadySuccess.is_transient());
        assert!(TickError::WaitForAwake.is_transient());
        assert!(!TickError::AlreadyFailed.is_transient());
        assert!(!TickError::ActionPanicked("boom".into()).is_transient());
    }

    #[test]
    fn test_action_error_retry_after() {
        let before = Utc::now();
        let err = ActionError::retry_after("flaky", std::time::Duration::from_secs(1));
        let at = err.retry_at.unwrap();
        assert!(err.is_retryable());
        assert!(at >= before + chrono::Duration::seconds(1));
        assert!(!ActionError::fatal("nope").is_retryable());
    }
}
