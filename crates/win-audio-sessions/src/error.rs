//! Error types and result alias for the win-audio-sessions crate.
use std::result::Result as StdResult;

use focusmute_core::CapabilityError;
use thiserror::Error;
#[cfg(windows)]
use windows::core::Error as WinError;

use crate::status;

/// Convenient result type used throughout this crate.
pub type Result<T> = StdResult<T, Error>;

/// Error variants produced by this crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An audio or COM call returned a failure status.
    #[error("{op} failed: {message} ({code:#010x})")]
    Os {
        /// Operation that failed.
        op: &'static str,
        /// Raw HRESULT.
        code: i32,
        /// System message for `code`.
        message: String,
    },
    /// A string returned by the audio service was not valid UTF-16.
    #[error("{op} returned an invalid string")]
    InvalidString {
        /// Operation that produced the string.
        op: &'static str,
    },
}

impl Error {
    /// Operation that failed.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Os { op, .. } | Self::InvalidString { op } => op,
        }
    }

    /// HRESULT associated with the failure.
    pub fn code(&self) -> i32 {
        match self {
            Self::Os { code, .. } => *code,
            Self::InvalidString { .. } => status::E_UNEXPECTED,
        }
    }

    /// Build an [`Error::Os`] from a raw status code.
    pub fn from_code(op: &'static str, code: i32) -> Self {
        Self::Os {
            op,
            code,
            message: status::describe(code).to_string(),
        }
    }

    #[cfg(windows)]
    /// Wrap a `windows` crate error with the operation that produced it.
    pub(crate) fn os(op: &'static str, err: &WinError) -> Self {
        Self::Os {
            op,
            code: err.code().0,
            message: err.message().to_string(),
        }
    }
}

impl From<Error> for CapabilityError {
    fn from(err: Error) -> Self {
        let message = match &err {
            Error::Os { message, .. } => message.clone(),
            Error::InvalidString { .. } => err.to_string(),
        };
        Self::new(err.op(), err.code(), message)
    }
}
