//! Error types for the break scheduler and its collaborators.

/// Configuration could not be loaded or is out of range.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file exists but could not be read.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for [`crate::config::config::AppConfig`].
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value parsed fine but cannot drive the scheduler.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Persisted last-break state could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse state: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The meeting probe could not determine device state.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("meeting probe `{probe}` failed: {reason}")]
    Probe { probe: &'static str, reason: String },
}

/// The break prompt could not be displayed.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("cannot show break prompt: {0}")]
    Display(String),
}

/// A control call reached a scheduler whose task has exited.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler task is no longer running")]
    Stopped,
}
