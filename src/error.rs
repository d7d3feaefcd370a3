use std::time::Duration;

use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// Stable identifiers surfaced to callers, independent of the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ErrorCode {
    // capability
    MethodUnsupported,
    MethodParameterUnsupported,
    UnknownEnv,
    // timing / cancellation
    TimedOut,
    Aborted,
    Cancelled,
    // protocol
    CustomMethodInvokeResponseError,
    // validation
    ParseError,
    UnexpectedType,
    CaptureFailed,
    InvalidRequest,
    // transport
    TransportFailed,
    // invoice
    InvoiceOpened,
    InvalidHostname,
    InvalidSlug,
    ConfigInvalid,
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Method {method} is unsupported in Mini Apps version {version}")]
    MethodUnsupported { method: String, version: String },

    #[error("Parameter {param} of method {method} is unsupported in Mini Apps version {version}")]
    MethodParameterUnsupported {
        method: String,
        param: String,
        version: String,
    },

    #[error("Unable to determine the host environment")]
    UnknownEnv,

    #[error("Timeout reached: {}ms", .timeout.as_millis())]
    TimedOut { timeout: Duration },

    #[error("Operation aborted: {reason}")]
    Aborted { reason: String },

    #[error("Operation cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("Custom method invocation failed: {error}")]
    CustomMethodInvokeResponse { error: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Unexpected type: expected {expected}, got {got}")]
    UnexpectedType { expected: String, got: String },

    #[error("Capture predicate failed: {message}")]
    Capture { message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport failed: {message}")]
    Transport { message: String },

    #[error("Invoice is already opened")]
    InvoiceOpened,

    #[error("Invalid invoice hostname: {0}")]
    InvalidHostname(String),

    #[error("Invalid invoice slug in {0}")]
    InvalidSlug(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::MethodUnsupported { .. } => ErrorCode::MethodUnsupported,
            BridgeError::MethodParameterUnsupported { .. } => {
                ErrorCode::MethodParameterUnsupported
            }
            BridgeError::UnknownEnv => ErrorCode::UnknownEnv,
            BridgeError::TimedOut { .. } => ErrorCode::TimedOut,
            BridgeError::Aborted { .. } => ErrorCode::Aborted,
            BridgeError::Cancelled { .. } => ErrorCode::Cancelled,
            BridgeError::CustomMethodInvokeResponse { .. } => {
                ErrorCode::CustomMethodInvokeResponseError
            }
            BridgeError::Parse { .. } => ErrorCode::ParseError,
            BridgeError::UnexpectedType { .. } => ErrorCode::UnexpectedType,
            BridgeError::Capture { .. } => ErrorCode::CaptureFailed,
            BridgeError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            BridgeError::Transport { .. } => ErrorCode::TransportFailed,
            BridgeError::InvoiceOpened => ErrorCode::InvoiceOpened,
            BridgeError::InvalidHostname(_) => ErrorCode::InvalidHostname,
            BridgeError::InvalidSlug(_) => ErrorCode::InvalidSlug,
            BridgeError::Config(_) => ErrorCode::ConfigInvalid,
        }
    }

    pub fn cancelled<S: Into<String>>(reason: S) -> Self {
        BridgeError::Cancelled {
            reason: reason.into(),
        }
    }

    pub fn aborted<S: Into<String>>(reason: S) -> Self {
        BridgeError::Aborted {
            reason: reason.into(),
        }
    }

    pub fn transport<S: Into<String>>(message: S) -> Self {
        BridgeError::Transport {
            message: message.into(),
        }
    }

    pub fn parse<S: Into<String>>(message: S) -> Self {
        BridgeError::Parse {
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::TimedOut { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, BridgeError::Aborted { .. })
    }

    /// Errors raised by the capability check, before anything is sent.
    pub fn is_capability(&self) -> bool {
        matches!(
            self,
            BridgeError::MethodUnsupported { .. }
                | BridgeError::MethodParameterUnsupported { .. }
                | BridgeError::UnknownEnv
        )
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
