use thiserror::Error;

/// Low-level failures raised by a document engine or locator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Option not available: {0}")]
    OptionNotAvailable(String),

    #[error("Browser session closed: {0}")]
    SessionClosed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Fatal conditions that stop a run before the field pipeline starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Authentication control {control} never appeared: {reason}")]
    AuthenticationControlMissing { control: String, reason: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Order form never became ready: {0}")]
    FormNotReady(String),

    #[error("Run exceeded its timeout of {0} ms")]
    RunTimeout(u64),
}

/// A single step's failure. Recorded in its outcome, never escalated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("Control {selector} never appeared: {source}")]
    ControlMissing {
        selector: String,
        #[source]
        source: AutomationError,
    },

    #[error("Could not apply value to {selector}: {source}")]
    ApplyFailed {
        selector: String,
        #[source]
        source: AutomationError,
    },

    #[error("No usable code for value {value:?} in mapping {mapping}")]
    MappingUnresolved { mapping: String, value: String },
}

/// Why the fee could not be resolved. Reported as `partial`, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Fee element {selector} never appeared: {reason}")]
    ElementMissing { selector: String, reason: String },

    #[error("No extraction strategy produced a currency value")]
    NoStrategyMatched,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required config value: {0}")]
    Missing(String),
}
