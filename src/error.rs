//! Error types for the ndi-bridge library.

use thiserror::Error;

use crate::handle::HandleKind;

/// The main error type for NDI bridge operations.
///
/// Every native status is translated into one of these variants before it reaches
/// the caller. Use [`Error::kind`] to branch on the coarse category.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend failed to initialize.
    ///
    /// This typically occurs when the NDI SDK is not installed or cannot be loaded.
    #[error("Failed to initialize the NDI runtime: {0}")]
    InitializationFailed(String),

    /// Malformed or missing fields in an options object or frame descriptor.
    ///
    /// Always raised synchronously, before any work is dispatched to a worker.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The native layer refused to create a handle.
    #[error("{0}")]
    CreateFailed(String),

    /// No frame of the requested kind arrived within the timeout.
    #[error("{0}")]
    TimedOut(String),

    /// The native layer reported a transport error.
    #[error("{0}")]
    ConnectionLost(String),

    /// A captured frame claimed a kind but carried no usable payload.
    #[error("{0}")]
    NotVideo(String),

    /// The handle was already destroyed.
    #[error("{0} has been destroyed")]
    Destroyed(HandleKind),

    /// The handle cannot be destroyed while another handle depends on it.
    #[error("{0}")]
    HandleInUse(String),

    /// The worker running a blocking call panicked or was cancelled.
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

/// Coarse error categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Runtime,
    InvalidArguments,
    CreateFailed,
    TimedOut,
    ConnectionLost,
    NotVideo,
    Destroyed,
    InUse,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InitializationFailed(_) | Error::TaskFailed(_) => ErrorKind::Runtime,
            Error::InvalidArguments(_) => ErrorKind::InvalidArguments,
            Error::CreateFailed(_) => ErrorKind::CreateFailed,
            Error::TimedOut(_) => ErrorKind::TimedOut,
            Error::ConnectionLost(_) => ErrorKind::ConnectionLost,
            Error::NotVideo(_) => ErrorKind::NotVideo,
            Error::Destroyed(_) => ErrorKind::Destroyed,
            Error::HandleInUse(_) => ErrorKind::InUse,
        }
    }

    /// `true` for the retryable "nothing arrived yet" outcome.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::TimedOut(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            Error::TimedOut("x".into()).kind(),
            ErrorKind::TimedOut
        );
        assert_eq!(
            Error::Destroyed(HandleKind::Receiver).kind(),
            ErrorKind::Destroyed
        );
        assert_eq!(
            Error::HandleInUse("busy".into()).kind(),
            ErrorKind::InUse
        );
    }

    #[test]
    fn destroyed_message_names_the_handle() {
        let msg = Error::Destroyed(HandleKind::FrameSync).to_string();
        assert_eq!(msg, "FrameSync has been destroyed");
    }
}
