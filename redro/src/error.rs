//! Driver error types.
use std::borrow::Cow;

use crate::{
    protocol::{ProtocolError, ServerError},
    types::DecodeError,
};

/// A specialized [`Result`] type for driver operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible errors from the driver.
///
/// Server-reported errors keep their parsed field map in
/// [`Server`][Error::Server]; their taxonomy class is derived from the
/// SQLSTATE through [`kind`][Error::kind].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A non-fatal condition the caller may want to surface.
    #[error("warning: {0}")]
    Warning(Cow<'static, str>),
    /// Client side protocol or configuration failure: framing, missing
    /// credentials, unknown authentication method, TLS refusal.
    #[error("interface error: {0}")]
    Interface(Cow<'static, str>),
    /// The database ceased to operate as expected.
    #[error("operational error: {0}")]
    Operational(Cow<'static, str>),
    /// The driver reached a state it should not be able to reach.
    #[error("internal error: {0}")]
    Internal(Cow<'static, str>),
    /// Bad caller input: malformed values, empty query, transaction verb
    /// misuse.
    #[error("programming error: {0}")]
    Programming(Cow<'static, str>),
    /// A host value with no wire type mapping.
    #[error("type not supported: {0}")]
    NotSupported(Cow<'static, str>),
    /// Backend bytes the driver could not translate.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// A result column that did not decode.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// An `ErrorResponse` reported by the server.
    #[error(transparent)]
    Server(#[from] ServerError),
    /// Socket failure. The connection is unusable afterwards.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "tls")]
    #[error("tls error: {0}")]
    Tls(#[from] native_tls::Error),
}

/// The error taxonomy class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Warning,
    Interface,
    Database,
    Operational,
    Integrity,
    Internal,
    Programming,
    NotSupported,
}

impl Error {
    /// The taxonomy class of this error.
    ///
    /// Server errors map by SQLSTATE: `28000` is an interface error,
    /// `23505` an integrity error, everything else a programming error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Warning(_) => ErrorKind::Warning,
            Self::Interface(_) | Self::Protocol(_) | Self::Io(_) => ErrorKind::Interface,
            #[cfg(feature = "tls")]
            Self::Tls(_) => ErrorKind::Interface,
            Self::Operational(_) => ErrorKind::Operational,
            Self::Internal(_) | Self::Decode(_) => ErrorKind::Internal,
            Self::Programming(_) => ErrorKind::Programming,
            Self::NotSupported(_) => ErrorKind::NotSupported,
            Self::Server(e) => match e.code() {
                "28000" => ErrorKind::Interface,
                "23505" => ErrorKind::Integrity,
                _ => ErrorKind::Programming,
            },
        }
    }

    /// The parsed server error fields, when the error originated in an
    /// `ErrorResponse`.
    pub fn as_server(&self) -> Option<&ServerError> {
        match self {
            Self::Server(e) => Some(e),
            _ => None,
        }
    }
}
