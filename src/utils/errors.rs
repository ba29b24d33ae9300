use thiserror::Error;

/// Errors raised while loading a schema or running an extraction job
///
/// Failures are isolated at the smallest unit that raised them: a field, an
/// action, or a target URL. Nothing in this enum aborts a whole job on its own.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// Bad selector type, missing pattern, unknown descriptor type, ...
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Selector did not attach within the wait budget. Callers treat this as "no match".
    #[error("Selector '{selector}' did not attach within {timeout_ms}ms")]
    ResolutionTimeout { selector: String, timeout_ms: u128 },

    /// No element satisfied an action's selector (and text pattern)
    #[error("No element matches '{selector}'")]
    TargetNotFound { selector: String },

    #[error("Navigation failed for {url}: {reason}")]
    NavigationFailure { url: String, reason: String },

    #[error("Action '{action}' failed after {attempts} attempt(s): {reason}")]
    ActionFailure {
        action: String,
        attempts: u32,
        reason: String,
    },

    /// Base64 / UTF-8 decode problems. Always swallowed by the post-processing pipeline.
    #[error("Decode failed: {0}")]
    DecodeFailure(String),

    /// Error reported by the page automation layer (CDP, fake page, ...)
    #[error("Automation error: {0}")]
    Automation(String),

    /// Schema document violates a job-level invariant
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),
}

impl ScrapeError {
    pub fn automation(err: impl std::fmt::Display) -> Self {
        ScrapeError::Automation(err.to_string())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        ScrapeError::InvalidConfiguration(msg.into())
    }

    /// True for the "no match" family that callers must not treat as failure
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ScrapeError::ResolutionTimeout { .. } | ScrapeError::TargetNotFound { .. }
        )
    }
}

/// Result type for scraping operations
pub type ScrapeResult<T> = Result<T, ScrapeError>;

/// Outcome of a lookup that may legitimately find nothing
///
/// Keeps "selector matched nothing" apart from `Err(ScrapeError)` so callers
/// never inspect error messages to decide whether to continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Lookup::Found(value),
            None => Lookup::NotFound,
        }
    }
}

impl From<serde_json::Error> for ScrapeError {
    fn from(err: serde_json::Error) -> Self {
        ScrapeError::Json(err.to_string())
    }
}

impl From<std::io::Error> for ScrapeError {
    fn from(err: std::io::Error) -> Self {
        ScrapeError::Io(err.to_string())
    }
}

impl From<regex::Error> for ScrapeError {
    fn from(err: regex::Error) -> Self {
        ScrapeError::InvalidConfiguration(format!("invalid regular expression: {err}"))
    }
}
