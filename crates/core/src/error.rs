/// Result alias that carries the custom [`PiLitesError`] type.
pub type Result<T> = std::result::Result<T, PiLitesError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PiLitesError {
    /// Free-form message, mostly used for poisoned locks and other internal
    /// failures that have no better home.
    #[error("{0}")]
    Message(String),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// The play or channel set violates a configuration-layer invariant.
    #[error("configuration error: {0}")]
    Config(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// The request conflicts with the current session state. No state was
    /// changed.
    #[error("conflict: {0}")]
    Conflict(String),
    /// An effect could not produce pixels for the current frame.
    #[error("render error in `{effect}`: {reason}")]
    Render { effect: String, reason: String },
    /// An observer could not be reached.
    #[error("delivery error: {0}")]
    Delivery(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PiLitesError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn render(effect: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Render {
            effect: effect.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that a caller should surface as "try again in a
    /// different session state" rather than as a failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<&str> for PiLitesError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PiLitesError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
