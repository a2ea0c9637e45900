/// Shared error type used across all Tarsy crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Agent { recoverable: bool, message: String },

    /// Terminal per-stage failure raised when an iteration controller
    /// exhausts `max_iterations` with no usable conclusion.
    #[error("Stage failed: reached maximum iterations ({max_iterations}) and last LLM interaction failed.{}",
        .last_error_message.as_ref().map(|m| format!(" Last error: {m}")).unwrap_or_default())]
    MaxIterationsFailure {
        max_iterations: u32,
        context: String,
        last_error_message: Option<String>,
    },

    /// Non-fatal control-flow signal: the session was paused at `iteration`.
    #[error("session paused at iteration {iteration}")]
    SessionPaused { iteration: u32 },

    /// External cancellation was observed at a cooperative check point.
    #[error("agent cancelled")]
    AgentCancelled,

    /// Raised at startup only; never expected during an active session.
    #[error("config: {0}")]
    Configuration(String),

    /// Caught and converted to a fail-safe masked response inside the
    /// masking service; never propagated as plaintext.
    #[error("masking: {0}")]
    Masking(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("mcp: {0}")]
    Mcp(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn agent(message: impl Into<String>, recoverable: bool) -> Self {
        Error::Agent {
            recoverable,
            message: message.into(),
        }
    }

    /// `true` for the non-fatal control-flow variants (`SessionPaused`,
    /// `AgentCancelled`) that chain/stage callers must special-case rather
    /// than treat as ordinary failures.
    pub fn is_control_flow(&self) -> bool {
        matches!(self, Error::SessionPaused { .. } | Error::AgentCancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
