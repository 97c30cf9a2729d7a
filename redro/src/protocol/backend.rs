//! Backend Messages
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use bytes::{Buf, Bytes};

use super::ProtocolError;
use crate::ext::BytesExt;

/// A type that can be decoded from a backend message.
pub trait BackendProtocol: Sized {
    /// Try decode given bytes into message.
    ///
    /// Note that `body` is only the main body, **excluding** message type
    /// and length.
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError>;
}

/// Backend messages.
pub enum BackendMessage {
    /// Identifies the message as an authentication request.
    Authentication(Authentication),
    /// Identifies the message as cancellation key data.
    BackendKeyData(BackendKeyData),
    /// Identifies the message as a Bind-complete indicator.
    BindComplete(BindComplete),
    /// Identifies the message as a Close-complete indicator.
    CloseComplete(CloseComplete),
    /// Identifies the message as a command-completed response.
    CommandComplete(CommandComplete),
    /// Identifies the message as COPY data.
    CopyData(CopyData),
    /// Identifies the message as a COPY-complete indicator.
    CopyDone(CopyDone),
    /// Identifies the message as a Start Copy In response.
    CopyInResponse(CopyInResponse),
    /// Identifies the message as a Start Copy Out response.
    CopyOutResponse(CopyOutResponse),
    /// Identifies the message as a data row.
    DataRow(DataRow),
    /// Identifies the message as a response to an empty query string.
    EmptyQueryResponse(EmptyQueryResponse),
    /// Identifies the message as an error.
    ErrorResponse(ErrorResponse),
    /// Identifies the message as a no-data indicator.
    NoData(NoData),
    /// Identifies the message as a notice.
    NoticeResponse(NoticeResponse),
    /// Identifies the message as a notification response.
    NotificationResponse(NotificationResponse),
    /// Identifies the message as a parameter description.
    ParameterDescription(ParameterDescription),
    /// Identifies the message as a run-time parameter status report.
    ParameterStatus(ParameterStatus),
    /// Identifies the message as a Parse-complete indicator.
    ParseComplete(ParseComplete),
    /// Identifies the message as a portal-suspended indicator.
    PortalSuspended(PortalSuspended),
    /// ReadyForQuery is sent whenever the backend is ready for a new query
    /// cycle.
    ReadyForQuery(ReadyForQuery),
    /// Identifies the message as a row description.
    RowDescription(RowDescription),
}

macro_rules! match_backend {
    ($($name:ident,)*) => {
        impl BackendMessage {
            /// Returns the message type.
            pub const fn msgtype(&self) -> u8 {
                match self {
                    $(Self::$name(_) => $name::MSGTYPE,)*
                }
            }

            /// Get message name from message type.
            ///
            /// Returns `"Unknown"` for unknown message type.
            pub const fn message_name(msgtype: u8) -> &'static str {
                match msgtype {
                    $($name::MSGTYPE => stringify!($name),)*
                    _ => "Unknown",
                }
            }
        }
        impl BackendProtocol for BackendMessage {
            fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
                let message = match msgtype {
                    $($name::MSGTYPE => Self::$name(<$name as BackendProtocol>::decode(msgtype, body)?),)*
                    _ => return Err(ProtocolError::unknown(msgtype)),
                };
                Ok(message)
            }
        }
    };
}

match_backend! {
    Authentication,
    BackendKeyData,
    BindComplete,
    CloseComplete,
    CommandComplete,
    CopyData,
    CopyDone,
    CopyInResponse,
    CopyOutResponse,
    DataRow,
    EmptyQueryResponse,
    ErrorResponse,
    NoData,
    NoticeResponse,
    NotificationResponse,
    ParameterDescription,
    ParameterStatus,
    ParseComplete,
    PortalSuspended,
    ReadyForQuery,
    RowDescription,
}

macro_rules! assert_msgtype {
    ($typ:ident) => {
        if Self::MSGTYPE != $typ {
            return Err(ProtocolError::unexpected(Self::MSGTYPE, $typ));
        }
    };
}

macro_rules! msgtype {
    ($me:ident,$ty:literal) => {
        impl $me {
            #[doc = concat!("`", stringify!($ty), "`")]
            pub const MSGTYPE: u8 = $ty;
        }
    };
}

/// Identifies the message as an authentication request.
///
/// The 4-byte sub-code selects the authentication flow. Beyond the
/// standard PostgreSQL codes, the server may request an extensible salted
/// digest (13) or a web identity token (14).
#[derive(Debug)]
pub enum Authentication {
    /// Specifies that the authentication was successful.
    Ok,
    /// Specifies that a clear-text password is required.
    CleartextPassword,
    /// Specifies that an MD5-encrypted password is required.
    MD5Password {
        /// The salt to use when encrypting the password.
        salt: [u8; 4],
    },
    /// Specifies that SASL authentication is required.
    Sasl {
        /// The message body is a list of SASL authentication mechanisms,
        /// in the server's order of preference.
        ///
        /// A zero byte is required as terminator after the last
        /// authentication mechanism name.
        mechanisms: Bytes,
    },
    /// Specifies that this message contains a SASL challenge.
    SaslContinue {
        /// SASL data, specific to the SASL mechanism being used.
        data: Bytes,
    },
    /// Specifies that SASL authentication has completed.
    SaslFinal {
        /// SASL outcome "additional data", specific to the SASL mechanism
        /// being used.
        data: Bytes,
    },
    /// Specifies that an extensible digest response is required.
    Digest {
        /// Index into the digest algorithm table. Only SHA256 is defined.
        algorithm: i32,
        /// The salt to mix into the password hash.
        salt: Bytes,
        /// The server nonce to mix into the digest.
        server_nonce: Bytes,
    },
    /// Specifies that a web identity token is required, for native
    /// identity-provider integration.
    IdpToken,
    /// A standard authentication code the driver does not implement
    /// (kerberos, crypt, SCM credential, GSSAPI, SSPI).
    Unsupported(i32),
    /// An authentication code outside the known set.
    Unknown(i32),
}

msgtype!(Authentication, b'R');

impl BackendProtocol for Authentication {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        let auth = match body.get_i32() {
            0 => Self::Ok,
            3 => Self::CleartextPassword,
            5 => Self::MD5Password { salt: body.get_u32().to_be_bytes() },
            10 => Self::Sasl { mechanisms: body },
            11 => Self::SaslContinue { data: body },
            12 => Self::SaslFinal { data: body },
            13 => {
                let algorithm = body.get_i32();
                let salt_len = body.get_i32() as usize;
                let salt = body.split_to(salt_len);
                let server_nonce_len = body.get_i32() as usize;
                let server_nonce = body.split_to(server_nonce_len);
                Self::Digest { algorithm, salt, server_nonce }
            }
            14 => Self::IdpToken,
            code @ (2 | 4 | 6 | 7 | 8 | 9) => Self::Unsupported(code),
            code => Self::Unknown(code),
        };
        Ok(auth)
    }
}

/// Identifies the message as cancellation key data.
///
/// The frontend must save these values if it wishes to be able to issue
/// CancelRequest messages later.
pub struct BackendKeyData {
    /// The process ID of this backend.
    pub process_id: i32,
    /// The secret key of this backend.
    pub secret_key: i32,
}

msgtype!(BackendKeyData, b'K');

impl BackendProtocol for BackendKeyData {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            process_id: body.get_i32(),
            secret_key: body.get_i32(),
        })
    }
}

/// Identifies the message as a command-completed response.
#[derive(Debug)]
pub struct CommandComplete {
    /// The command tag. This is usually a single word that identifies which
    /// SQL command was completed, followed for some commands by the number
    /// of rows affected.
    pub tag: String,
}

msgtype!(CommandComplete, b'C');

impl BackendProtocol for CommandComplete {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { tag: body.get_nul_string()? })
    }
}

/// Identifies the message as COPY data.
pub struct CopyData {
    /// Data that forms part of a COPY data stream.
    ///
    /// Messages sent from the backend will always correspond to single data
    /// rows.
    pub data: Bytes,
}

msgtype!(CopyData, b'd');

impl BackendProtocol for CopyData {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { data: body })
    }
}

/// Identifies the message as a Start Copy In response.
///
/// The frontend must now send copy-in data.
#[derive(Debug)]
pub struct CopyInResponse {
    /// 0 indicates the overall COPY format is textual, 1 binary.
    pub is_binary: u8,
    /// The number of columns in the data to be copied.
    pub num_columns: i16,
}

msgtype!(CopyInResponse, b'G');

impl BackendProtocol for CopyInResponse {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            is_binary: body.get_u8(),
            num_columns: body.get_i16(),
        })
    }
}

/// Identifies the message as a Start Copy Out response.
///
/// This message will be followed by copy-out data.
#[derive(Debug)]
pub struct CopyOutResponse {
    /// 0 indicates the overall COPY format is textual, 1 binary.
    pub is_binary: u8,
    /// The number of columns in the data to be copied.
    pub num_columns: i16,
}

msgtype!(CopyOutResponse, b'H');

impl BackendProtocol for CopyOutResponse {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            is_binary: body.get_u8(),
            num_columns: body.get_i16(),
        })
    }
}

/// Identifies the message as a data row.
pub struct DataRow {
    /// Raw row buffer.
    ///
    /// - `Int16` The number of column values that follow (possibly zero).
    ///
    /// Next, the following pair of fields appear for each column:
    ///
    /// - `Int32` The length of the column value, in bytes (this count does
    ///   not include itself). Can be zero. As a special case, -1 indicates
    ///   a NULL column value. No value bytes follow in the NULL case.
    /// - `Byte[n]` The value of the column, in the format indicated by the
    ///   associated format code.
    pub body: Bytes,
}

msgtype!(DataRow, b'D');

impl BackendProtocol for DataRow {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message as an error.
pub struct ErrorResponse {
    /// Raw message body.
    ///
    /// The message body consists of one or more identified fields, followed
    /// by a zero byte as a terminator. Fields can appear in any order. For
    /// each field there is a one byte field code followed by a nul
    /// terminated string value.
    pub body: Bytes,
}

msgtype!(ErrorResponse, b'E');

impl BackendProtocol for ErrorResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message as a notice.
///
/// Same body shape as [`ErrorResponse`].
pub struct NoticeResponse {
    /// Raw message body.
    pub body: Bytes,
}

msgtype!(NoticeResponse, b'N');

impl BackendProtocol for NoticeResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message as a notification response.
///
/// Sent if this connection receives a NOTIFY that it was listening for.
#[derive(Debug)]
pub struct NotificationResponse {
    /// The process ID of the notifying backend process.
    pub process_id: i32,
    /// The name of the condition that the notify has been raised on.
    pub condition: String,
}

msgtype!(NotificationResponse, b'A');

impl BackendProtocol for NotificationResponse {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            process_id: body.get_i32(),
            condition: body.get_nul_string()?,
        })
    }
}

/// Identifies the message as a parameter description.
#[derive(Debug)]
pub struct ParameterDescription {
    /// The number of parameters used by the statement (can be zero).
    pub param_len: u16,
    /// Raw buffer of `Int32` parameter data type object IDs.
    pub oids: Bytes,
}

msgtype!(ParameterDescription, b't');

impl BackendProtocol for ParameterDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            param_len: body.get_u16(),
            oids: body,
        })
    }
}

/// Identifies the message as a run-time parameter status report.
#[derive(Debug)]
pub struct ParameterStatus {
    /// The name of the run-time parameter being reported.
    pub name: String,
    /// The current value of the parameter.
    pub value: String,
}

msgtype!(ParameterStatus, b'S');

impl BackendProtocol for ParameterStatus {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            name: body.get_nul_string()?,
            value: body.get_nul_string()?,
        })
    }
}

/// ReadyForQuery is sent whenever the backend is ready for a new query
/// cycle.
pub struct ReadyForQuery {
    /// Current backend transaction status indicator.
    ///
    /// Possible values are 'I' if idle (not in a transaction block);
    /// 'T' if in a transaction block; or 'E' if in a failed transaction
    /// block (queries will be rejected until block is ended).
    pub tx_status: u8,
}

msgtype!(ReadyForQuery, b'Z');

impl BackendProtocol for ReadyForQuery {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { tx_status: body.get_u8() })
    }
}

/// Identifies the message as a row description.
pub struct RowDescription {
    /// Raw message body.
    ///
    /// - `Int16` Specifies the number of fields in a row (can be zero).
    ///
    /// For each field, there is the following:
    ///
    /// - `String` The field name.
    /// - `Int32` If the field can be identified as a column of a specific
    ///   table, the object ID of the table; otherwise zero.
    /// - `Int16` If the field can be identified as a column of a specific
    ///   table, the attribute number of the column; otherwise zero.
    /// - `Int32` The object ID of the field's data type.
    /// - `Int16` The data type size. Negative values denote variable-width
    ///   types.
    /// - `Int32` The type modifier. The meaning of the modifier is
    ///   type-specific.
    /// - `Int16` The format code being used for the field.
    ///
    /// Under the extended-result-metadata protocol each field additionally
    /// carries four nul terminated strings (schema, table, column, catalog)
    /// and an `Int16` flag word (nullable, autoincrement, read only,
    /// searchable).
    pub body: Bytes,
}

msgtype!(RowDescription, b'T');

impl BackendProtocol for RowDescription {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

macro_rules! unit_msg {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name;

        msgtype!($name, $ty);

        impl BackendProtocol for $name {
            fn decode(msgtype: u8, _: Bytes) -> Result<Self, ProtocolError> {
                if $name::MSGTYPE != msgtype {
                    return Err(ProtocolError::unexpected(Self::MSGTYPE, msgtype));
                }
                Ok(Self)
            }
        }
    )*};
}

unit_msg! {
    /// Identifies the message as a Bind-complete indicator.
    struct BindComplete, b'2';

    /// Identifies the message as a Close-complete indicator.
    struct CloseComplete, b'3';

    /// Identifies the message as a COPY-complete indicator.
    struct CopyDone, b'c';

    /// Identifies the message as a response to an empty query string.
    ///
    /// This substitutes for CommandComplete.
    struct EmptyQueryResponse, b'I';

    /// Identifies the message as a no-data indicator.
    struct NoData, b'n';

    /// Identifies the message as a Parse-complete indicator.
    struct ParseComplete, b'1';

    /// Identifies the message as a portal-suspended indicator.
    ///
    /// Note this only appears if an Execute message's row-count limit was
    /// reached.
    struct PortalSuspended, b's';
}

impl std::fmt::Debug for BackendKeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendKeyData")
            .field("process_id", &self.process_id)
            .field("secret_key", &"<REDACTED>")
            .finish()
    }
}

impl std::fmt::Debug for ReadyForQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyForQuery")
            .field("tx_status", &match self.tx_status {
                b'I' => "Idle(I)",
                b'T' => "Transaction(T)",
                b'E' => "FailedTx(E)",
                _ => "unknown",
            })
            .finish()
    }
}
