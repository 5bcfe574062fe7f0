//! Classification of request failures and their HTTP mapping.

use hydra_core::ActuatorError;
use thiserror::Error;

/// Why a request failed, independent of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    /// Malformed body or timestamp
    InvalidArgument,
    /// Missing, duplicate or malformed credential
    Unauthenticated,
    /// Credential not recognized
    PermissionDenied,
    /// Unknown environment, command or method
    Unimplemented,
    Internal,
    /// Actuator backend cannot take commands right now
    Unavailable,
    /// Anything unexpected; never echoed to the caller
    Unknown,
}

impl Code {
    pub fn http_status(self) -> u16 {
        match self {
            // Kept at 400 for compatibility with existing clients.
            Code::Internal => 400,
            Code::InvalidArgument => 400,
            Code::Unauthenticated => 401,
            Code::PermissionDenied => 403,
            Code::Unimplemented => 404,
            Code::Unavailable => 503,
            Code::Unknown => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Code::InvalidArgument => "invalid_argument",
            Code::Unauthenticated => "unauthenticated",
            Code::PermissionDenied => "permission_denied",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RequestError {
    pub code: Code,
    pub message: String,
}

impl RequestError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Code::Unauthenticated, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(Code::PermissionDenied, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Code::Unknown, message)
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Text safe to send back to the caller.
    pub fn public_message(&self) -> &str {
        match self.code {
            Code::Unknown => "",
            _ => &self.message,
        }
    }
}

impl From<ActuatorError> for RequestError {
    fn from(err: ActuatorError) -> Self {
        Self::new(Code::Unavailable, err.to_string())
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(err: serde_json::Error) -> Self {
        Self::unknown(format!("failed to encode response: {err}"))
    }
}
