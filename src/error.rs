use thiserror::Error;

use crate::protocol::ErrorShape;
use crate::session::tokens::Token;

/// Errors raised by the privileged session and propagated to the untrusted
/// side as `{name, message}` rejections.
///
/// Expected transient conditions (a file moved out from under a handle, a
/// path that is not a regular file) are part of normal branching and are
/// converted into typed response values or descriptor-level errors by the
/// handlers; everything that still reaches the pipe as an `Err` rejects the
/// request.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The caller presented a token it was never given. Precondition
    /// violation; never retried.
    #[error("unknown token {0}")]
    UnknownToken(Token),

    #[error("no such file: {0}")]
    NotFound(String),

    #[error("not a regular file: {0}")]
    NotAFile(String),

    /// A directory-bound operation was requested with no launch directory.
    #[error("no launch directory bound")]
    NoLaunchDirectory,

    /// Hard refusal of a zero-byte overwrite. Accepting it would destroy
    /// the existing file content.
    #[error("refusing to write zero bytes")]
    EmptyWrite,

    /// The mirror-side capability set does not allow this operation.
    #[error("operation not permitted on this file")]
    NotCapable,

    /// A message arrived in the wrong direction, or a reply had the wrong
    /// shape for the request.
    #[error("unexpected message")]
    UnexpectedMessage,

    #[error("message pipe closed")]
    PipeClosed,

    /// A rejection received from the peer end of the pipe.
    #[error("{}: {}", .0.name, .0.message)]
    Rejected(ErrorShape),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Stable name used on the wire and in descriptor `error` fields.
    pub fn name(&self) -> &str {
        match self {
            SessionError::UnknownToken(_) => "UnknownToken",
            SessionError::NotFound(_) => "NotFound",
            SessionError::NotAFile(_) => "NotAFile",
            SessionError::NoLaunchDirectory => "NoLaunchDirectory",
            SessionError::EmptyWrite => "EmptyWrite",
            SessionError::NotCapable => "NotCapable",
            SessionError::UnexpectedMessage => "UnexpectedMessage",
            SessionError::PipeClosed => "PipeClosed",
            SessionError::Rejected(shape) => &shape.name,
            SessionError::Io(_) => "Io",
        }
    }

    /// Whether this is an expected condition (logged at `warn!`) rather
    /// than one worth the crash-sink boundary (`error!`).
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            SessionError::NotFound(_)
                | SessionError::NotAFile(_)
                | SessionError::EmptyWrite
                | SessionError::NotCapable
                | SessionError::NoLaunchDirectory
        )
    }
}

impl From<&SessionError> for ErrorShape {
    fn from(err: &SessionError) -> Self {
        ErrorShape {
            name: err.name().to_string(),
            message: err.to_string(),
        }
    }
}
