//! Redshift Frontend and Backend Protocol
//!
//! The wire format is the PostgreSQL protocol version 3 with vendor
//! extensions (extended result metadata, a binary transfer protocol,
//! digest and identity-provider authentication requests).
//!
//! ## Messaging Overview
//!
//! All communication is through a stream of messages. The first byte of a
//! message identifies the message type, and the next four bytes specify the
//! length of the rest of the message (this length count includes itself,
//! but not the message-type byte). The remaining contents of the message are
//! determined by the message type.
//!
//! ```text
//! ┏━━━━┳━━━━━━━━━━━━━━━━━━━┳━━━━━━┓
//! ┃ Ty ┃       Length      ┃ Body ┃
//! ┣━━━━╋━━━━━━━━━━━━━━━━━━━╋━━━━━━┫
//! ┃ u8 ┃        u32        ┃ [u8] ┃
//! ┗━━━━┻━━━━━━━━━━━━━━━━━━━┻━━━━━━┛
//! ```
//!
//! For historical reasons, the very first messages sent by the client
//! (the startup message and the SSL request) have no initial
//! message-type byte.
//!
//! <https://www.postgresql.org/docs/17/protocol-overview.html>

pub mod frontend;
pub mod backend;

mod error;

pub use frontend::FrontendProtocol;
pub use backend::{BackendMessage, BackendProtocol};
pub use error::{ProtocolError, ServerError};

/// 32-bit wire type identifier.
///
/// The driver occasionally carries `-1` for "no type selected", hence
/// signed.
pub type Oid = i32;

/// The protocol version number sent in the startup message.
///
/// The most significant 16 bits are the major version number (3),
/// the least significant 16 bits are the minor version number (0).
pub const PROTOCOL_VERSION: i32 = 196_608;

/// The SSL request code, sent before startup to negotiate TLS.
pub const SSL_REQUEST_CODE: i32 = 80_877_103;

/// Per-column/parameter transfer format.
///
/// Data of a particular data type might be transmitted in any of several
/// different formats. The only supported formats are "text" and "binary".
/// Text has format code zero, and binary has format code one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Binary,
}

impl Format {
    /// Returns the on-wire format code.
    pub const fn format_code(self) -> i16 {
        match self {
            Format::Text => 0,
            Format::Binary => 1,
        }
    }
}

/// The transfer protocol requested from the server via the
/// `client_protocol_version` startup parameter.
///
/// The server reports the version it settled on through the
/// `server_protocol_version` parameter status. Anything above
/// [`BaseServer`][ClientProtocolVersion::BaseServer] changes the shape of
/// `RowDescription` and which types arrive in binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClientProtocolVersion {
    /// Plain PostgreSQL-compatible behavior.
    BaseServer,
    /// `RowDescription` additionally carries schema/table/column/catalog
    /// names and the column flag word.
    ExtendedResultMetadata,
    /// Extended metadata plus binary transfer for numeric, temporal,
    /// geography and common array types.
    BinaryProtocol,
}

impl ClientProtocolVersion {
    pub(crate) const fn as_i32(self) -> i32 {
        match self {
            Self::BaseServer => 0,
            Self::ExtendedResultMetadata => 1,
            Self::BinaryProtocol => 2,
        }
    }

    pub(crate) const fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::BaseServer),
            1 => Some(Self::ExtendedResultMetadata),
            2 => Some(Self::BinaryProtocol),
            _ => None,
        }
    }

    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::BaseServer => "BASE_SERVER",
            Self::ExtendedResultMetadata => "EXTENDED_RESULT_METADATA",
            Self::BinaryProtocol => "BINARY",
        }
    }
}
