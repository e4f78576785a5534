use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by a page capability.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PageError {
    #[error("page not connected")]
    NotConnected,

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("element '{handle}' not interactable: {reason}")]
    NotInteractable { handle: String, reason: String },

    #[error("{operation} timeout after {ms}ms")]
    Timeout { operation: String, ms: u64 },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("operation not supported: {0}")]
    NotSupported(String),

    #[error("{0}")]
    Other(String),
}

impl PageError {
    pub fn code(&self) -> &'static str {
        match self {
            PageError::NotConnected => "NOT_CONNECTED",
            PageError::ConnectionLost(_) => "CONNECTION_LOST",
            PageError::Navigation(_) => "NAVIGATION_ERROR",
            PageError::ElementNotFound(_) => "ELEMENT_NOT_FOUND",
            PageError::NotInteractable { .. } => "ELEMENT_NOT_INTERACTABLE",
            PageError::Timeout { .. } => "TIMEOUT",
            PageError::PermissionDenied(_) => "PERMISSION_DENIED",
            PageError::NotSupported(_) => "NOT_SUPPORTED",
            PageError::Other(_) => "UNKNOWN_ERROR",
        }
    }
}

/// Coarse error taxonomy carried on results and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Structural,
    Precondition,
    Timeout,
    ElementNotFound,
    Network,
    Connection,
    PermissionDenied,
    Fatal,
    Page,
    Handler,
    Cancelled,
}

/// Errors produced while executing a single step.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StepError {
    #[error("structural error: {0}")]
    Structural(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("step '{step_id}' exceeded its {timeout_ms}ms timeout")]
    Timeout { step_id: String, timeout_ms: u64 },

    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("fatal error [{code}]: {message}")]
    Fatal { code: String, message: String },

    #[error("page error: {0}")]
    Page(#[from] PageError),

    #[error("{message}")]
    Handler {
        message: String,
        code: Option<String>,
    },

    #[error("step '{step_id}' was cancelled")]
    Cancelled { step_id: String },
}

/// Code that marks an error as explicitly fatal.
pub const FATAL_ERROR_CODE: &str = "FATAL_ERROR";

impl StepError {
    /// A generic handler failure with no code.
    pub fn handler(message: impl Into<String>) -> Self {
        StepError::Handler {
            message: message.into(),
            code: None,
        }
    }

    /// A handler failure carrying a machine-readable code.
    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        StepError::Handler {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        StepError::Fatal {
            code: FATAL_ERROR_CODE.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::Structural(_) => ErrorKind::Structural,
            StepError::Precondition(_) => ErrorKind::Precondition,
            StepError::Timeout { .. } => ErrorKind::Timeout,
            StepError::ElementNotFound { .. } => ErrorKind::ElementNotFound,
            StepError::Network(_) => ErrorKind::Network,
            StepError::Connection(_) => ErrorKind::Connection,
            StepError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            StepError::Fatal { .. } => ErrorKind::Fatal,
            StepError::Page(_) => ErrorKind::Page,
            StepError::Handler { .. } => ErrorKind::Handler,
            StepError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Machine-readable error code, when one is known.
    pub fn code(&self) -> Option<&str> {
        match self {
            StepError::Structural(_) => Some("STRUCTURAL_ERROR"),
            StepError::Precondition(_) => Some("PRECONDITION_FAILED"),
            StepError::Timeout { .. } => Some("TIMEOUT"),
            StepError::ElementNotFound { .. } => Some("ELEMENT_NOT_FOUND"),
            StepError::Network(_) => Some("NETWORK_ERROR"),
            StepError::Connection(_) => Some("CONNECTION_LOST"),
            StepError::PermissionDenied(_) => Some("PERMISSION_DENIED"),
            StepError::Fatal { code, .. } => Some(code.as_str()),
            StepError::Page(e) => Some(e.code()),
            StepError::Handler { code, .. } => code.as_deref(),
            StepError::Cancelled { .. } => Some("CANCELLED"),
        }
    }

    /// Cause chain rendered as strings, outermost first.
    pub fn trace(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }
        chain
    }
}
