//! Frontend Messages
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use bytes::{BufMut, BytesMut};

use super::{Oid, PROTOCOL_VERSION};
use crate::ext::{BufMutExt, StrExt, UsizeExt};

/// Write a frontend message to `buf`.
pub fn write<F: FrontendProtocol>(msg: F, buf: &mut BytesMut) {
    // msgtype + length
    const PREFIX: usize = 1 + 4;

    let size_hint = msg.size_hint();
    buf.reserve(PREFIX + size_hint as usize);

    let offset = buf.len();
    buf.put_u8(F::MSGTYPE);
    buf.put_u32(4 + size_hint);

    msg.encode(&mut *buf);

    assert_eq!(
        buf.len() - offset,
        PREFIX + size_hint as usize,
        "frontend message body size not equal to size hint"
    );
}

/// A type which can be encoded into a frontend message.
pub trait FrontendProtocol {
    /// Message type.
    const MSGTYPE: u8;

    /// Size of the main body.
    ///
    /// Note that this is **only** the size of the main body as opposed to
    /// the actual wire message which includes the length itself.
    fn size_hint(&self) -> u32;

    /// Write the main body of the message.
    ///
    /// The length of the body written must be equal to the length returned
    /// by [`size_hint`][FrontendProtocol::size_hint].
    fn encode(self, buf: impl BufMut);
}

macro_rules! size_of {
    ($self:tt.$field:ident) => {
        u32::try_from(size_of_val(&$self.$field)).expect("data type size too large for protocol")
    };
}

/// The startup message.
///
/// For historical reasons, the very first message sent by the client has no
/// initial message-type byte, thus [`Startup`] does not implement
/// [`FrontendProtocol`]. To write it, use [`Startup::write`].
///
/// Beyond the standard parameters, the driver reports its requested
/// transfer protocol, its own version and the client platform, and the
/// identity-provider plugin parameters when one is configured.
#[derive(Debug)]
pub struct Startup<'a> {
    /// The database user name to connect as.
    ///
    /// Omitted under native identity-provider auth, where the server
    /// derives the user from the token.
    pub user: Option<&'a str>,
    /// The database to connect to. Defaults to the user name.
    pub database: Option<&'a str>,
    /// Reported application name, if any.
    pub application_name: Option<&'a str>,
    /// Used to connect in streaming replication mode, where a small set of
    /// replication commands can be issued instead of SQL statements.
    ///
    /// Value can be true, false, or database, and the default is false.
    pub replication: Option<&'a str>,
    /// The requested transfer protocol, as decimal text.
    pub client_protocol_version: &'a str,
    /// Driver name and version.
    pub driver_version: &'a str,
    /// Client platform description.
    pub os_version: &'a str,
    /// Class path of the credential-provider plugin, when used.
    pub plugin_name: Option<&'a str>,
    /// Identity provider type for native IdP integration.
    pub idp_type: Option<&'a str>,
    /// Native auth provider name.
    pub provider_name: Option<&'a str>,
}

impl Startup<'_> {
    pub fn write(self, buf: &mut BytesMut) {
        let offset = buf.len();

        // Length of message contents in bytes, including self.
        // reserve 4 bytes for length
        buf.put_u32(0);
        buf.put_i32(PROTOCOL_VERSION);

        // The protocol version number is followed by one or more pairs of
        // parameter name and value strings.

        let pairs = [
            ("user", self.user),
            ("database", self.database),
            ("application_name", self.application_name),
            ("replication", self.replication),
            ("client_protocol_version", Some(self.client_protocol_version)),
            ("driver_version", Some(self.driver_version)),
            ("os_version", Some(self.os_version)),
            ("plugin_name", self.plugin_name),
            ("idp_type", self.idp_type),
            ("provider_name", self.provider_name),
        ];

        for (key, value) in pairs {
            if let Some(value) = value {
                buf.put_nul_string(key);
                buf.put_nul_string(value);
            }
        }

        // A zero byte is required as a terminator after the last
        // name/value pair.
        buf.put_u8(b'\0');

        // write the length
        let mut written_buf = &mut buf[offset..];
        written_buf.put_u32(written_buf.len().to_u32());
    }
}

/// Identifies the message as a password response.
///
/// The payload is the password, possibly encrypted, nul terminated.
pub struct PasswordMessage<'a> {
    /// The password (encrypted, if requested).
    pub password: &'a [u8],
}

impl FrontendProtocol for PasswordMessage<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> u32 {
        self.password.len().to_u32() + 1
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put(self.password);
        buf.put_u8(b'\0');
    }
}

/// Identifies the message as an initial SASL response.
pub struct SaslInitialResponse<'a> {
    /// Name of the selected SASL authentication mechanism.
    pub mechanism: &'a str,
    /// SASL mechanism specific "Initial Client Response".
    pub data: &'a [u8],
}

impl FrontendProtocol for SaslInitialResponse<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> u32 {
        self.mechanism.nul_string_len() + 4 + self.data.len().to_u32()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.mechanism);
        buf.put_i32(self.data.len() as i32);
        buf.put(self.data);
    }
}

/// Identifies the message as a SASL response.
pub struct SaslResponse<'a> {
    /// SASL mechanism specific message data.
    pub data: &'a [u8],
}

impl FrontendProtocol for SaslResponse<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> u32 {
        self.data.len().to_u32()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put(self.data);
    }
}

/// Identifies the message as an extensible digest response.
///
/// Answers the digest challenge with the salted hash and the client nonce
/// that was mixed into it.
pub struct DigestResponse<'a> {
    /// The computed digest.
    pub digest: &'a [u8],
    /// The client nonce, decimal milliseconds since the unix epoch.
    pub client_nonce: &'a [u8],
}

impl FrontendProtocol for DigestResponse<'_> {
    const MSGTYPE: u8 = b'd';

    fn size_hint(&self) -> u32 {
        4 + self.digest.len().to_u32() + 4 + self.client_nonce.len().to_u32()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_i32(self.digest.len() as i32);
        buf.put(self.digest);
        buf.put_i32(self.client_nonce.len() as i32);
        buf.put(self.client_nonce);
    }
}

/// Identifies the message as a web identity token response, for native
/// identity-provider integration.
pub struct IdpTokenResponse<'a> {
    /// The preconfigured web identity token, verbatim.
    pub token: &'a str,
}

impl FrontendProtocol for IdpTokenResponse<'_> {
    const MSGTYPE: u8 = b'i';

    fn size_hint(&self) -> u32 {
        self.token.len().to_u32()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put(self.token.as_bytes());
    }
}

/// Identifies the message as a Parse command.
pub struct Parse<'a, I> {
    /// Prepared statement name (an empty string selects the unnamed
    /// prepared statement).
    pub prepare_name: &'a str,
    /// The query string to be parsed.
    pub sql: &'a str,
    /// The number of parameter data types specified (can be zero).
    ///
    /// Note that this is not an indication of the number of parameters that
    /// might appear in the query string, only the number that the frontend
    /// wants to prespecify types for.
    pub oids_len: u16,
    /// Specifies the object ID of the parameter data type.
    ///
    /// Placing a zero here is equivalent to leaving the type unspecified.
    pub oids: I,
}

impl<I> FrontendProtocol for Parse<'_, I>
where
    I: IntoIterator<Item = Oid>,
{
    const MSGTYPE: u8 = b'P';

    fn size_hint(&self) -> u32 {
        self.prepare_name.nul_string_len()
            + self.sql.nul_string_len()
            + size_of!(self.oids_len)
            + self.oids_len as u32 * size_of::<Oid>() as u32
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.prepare_name);
        buf.put_nul_string(self.sql);
        buf.put_u16(self.oids_len);
        for oid in self.oids {
            buf.put_i32(oid);
        }
    }
}

/// Identifies the message as a Bind command.
///
/// The body is prebuilt by the extended-query driver: the statement keeps
/// its portal/name/format prefix and result-format suffix as precomputed
/// blobs, and only the argument values are spliced in per execution.
pub struct Bind<'a> {
    /// The complete message body.
    pub body: &'a [u8],
}

impl FrontendProtocol for Bind<'_> {
    const MSGTYPE: u8 = b'B';

    fn size_hint(&self) -> u32 {
        self.body.len().to_u32()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put(self.body);
    }
}

// Describe and Close share one wire shape: a target kind byte followed
// by the target's name.
macro_rules! target_msg {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
        $(#[$doc])*
        pub struct $name<'a> {
            /// `b'S'` targets a prepared statement, `b'P'` a portal.
            pub kind: u8,
            /// Name of the target. Empty means the unnamed one.
            pub name: &'a str,
        }

        impl FrontendProtocol for $name<'_> {
            const MSGTYPE: u8 = $ty;

            fn size_hint(&self) -> u32 {
                size_of!(self.kind) + self.name.nul_string_len()
            }

            fn encode(self, mut buf: impl BufMut) {
                buf.put_u8(self.kind);
                buf.put_nul_string(self.name);
            }
        }
    )*};
}

target_msg! {
    /// Asks the server to release a prepared statement or portal.
    ///
    /// The driver issues this during cache eviction and invalidation;
    /// the server confirms with CloseComplete.
    struct Close, b'C';

    /// Asks for the shape of a prepared statement or portal.
    ///
    /// For a statement the server answers with ParameterDescription
    /// followed by RowDescription, or NoData when nothing comes back.
    struct Describe, b'D';
}

/// Runs a bound portal.
///
/// This driver only ever executes the unnamed portal with no row limit,
/// so the whole result set arrives ahead of the next Sync.
pub struct Execute<'a> {
    /// Portal to run. Empty means the unnamed one.
    pub portal: &'a str,
    /// Stop after this many rows; zero lifts the limit. A truncated
    /// portal reports PortalSuspended instead of completing.
    pub row_limit: u32,
}

impl FrontendProtocol for Execute<'_> {
    const MSGTYPE: u8 = b'E';

    fn size_hint(&self) -> u32 {
        self.portal.nul_string_len() + size_of!(self.row_limit)
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.portal);
        buf.put_u32(self.row_limit);
    }
}

/// Identifies the message as COPY data.
pub struct CopyData<'a> {
    /// Data that forms part of a COPY data stream.
    ///
    /// Messages sent by frontends may divide the data stream arbitrarily.
    pub data: &'a [u8],
}

impl FrontendProtocol for CopyData<'_> {
    const MSGTYPE: u8 = b'd';

    fn size_hint(&self) -> u32 {
        self.data.len().to_u32()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put(self.data);
    }
}

macro_rules! unit_msg {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
        $(#[$doc])*
        pub struct $name;

        impl FrontendProtocol for $name {
            const MSGTYPE: u8 = $ty;

            fn size_hint(&self) -> u32 { 0 }

            fn encode(self, _: impl BufMut) { }
        }
    )*};
}

unit_msg! {
    /// Identifies the message as a COPY-complete indicator.
    struct CopyDone, b'c';

    /// Identifies the message as a Flush command.
    struct Flush, b'H';

    /// Identifies the message as a Sync command.
    struct Sync, b'S';

    /// Identifies the message as a termination.
    struct Terminate, b'X';
}
