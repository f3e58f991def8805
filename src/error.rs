//! The protocol-level error taxonomy (spec §7).
//!
//! Follows the same manual-impl idiom as `transporter_codec::Error` rather
//! than reaching for `thiserror` — the codec crate this one depends on
//! doesn't use it either, and the taxonomy is small enough that the
//! boilerplate isn't worth a new dependency.

use std::fmt;

use codec::ErrorKind;

#[derive(Debug, Clone)]
pub enum Error {
    /// No reply arrived within the configured timeout.
    Timeout,
    /// An inbound `apply`/`get` referenced a handle id not in the table.
    UnknownHandle(u64),
    /// `path` resolved to nothing at some segment.
    PathNotFound(Vec<String>),
    /// Duplicate `create_module` for an (transport, namespace) pair.
    ScopeConflict(String),
    /// The session was released while this request was pending.
    SessionClosed,
    /// The remote function threw; carries its serialized message.
    Remote(String),
    /// Encode/decode failed.
    Codec(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out waiting for a reply"),
            Self::UnknownHandle(id) => write!(f, "unknown handle: {id}"),
            Self::PathNotFound(path) => write!(f, "path not found: {}", path.join(".")),
            Self::ScopeConflict(namespace) => write!(f, "scope conflict: {namespace}"),
            Self::SessionClosed => write!(f, "session closed"),
            Self::Remote(message) => write!(f, "remote error: {message}"),
            Self::Codec(reason) => write!(f, "codec error: {reason}"),
        }
    }
}

impl Error {
    /// The wire discriminator this error is reported as in an `error`
    /// message, and the one `ErrorKind::RemoteError`/others round-trip to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout => ErrorKind::TimeoutError,
            Self::UnknownHandle(_) => ErrorKind::UnknownHandle,
            Self::PathNotFound(_) => ErrorKind::PathNotFound,
            Self::ScopeConflict(_) => ErrorKind::ScopeConflict,
            Self::SessionClosed => ErrorKind::SessionClosed,
            Self::Remote(_) => ErrorKind::RemoteError,
            Self::Codec(_) => ErrorKind::CodecError,
        }
    }

    /// Reconstruct an `Error` received from the peer's `error` message.
    pub fn from_wire(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::TimeoutError => Self::Timeout,
            ErrorKind::UnknownHandle => Self::UnknownHandle(message.parse().unwrap_or(0)),
            ErrorKind::PathNotFound => Self::PathNotFound(
                message
                    .split('.')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            ErrorKind::ScopeConflict => Self::ScopeConflict(message),
            ErrorKind::SessionClosed => Self::SessionClosed,
            ErrorKind::RemoteError => Self::Remote(message),
            ErrorKind::CodecError => Self::Codec(message),
        }
    }
}

impl From<codec::Error> for Error {
    fn from(err: codec::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
