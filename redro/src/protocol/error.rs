//! Protocol level errors.
use bytes::{Buf, Bytes};

use crate::ext::BytesExt;

/// An error when translating a buffer from the backend.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unexpected message type {found:?}, expected {expect:?}")]
    Unexpected { expect: char, found: char },
    #[error("unknown message type {0:?}")]
    Unknown(char),
    #[error("message {found:?} not expected during {phase}")]
    UnexpectedPhase { found: char, phase: &'static str },
    #[error("backend string is not nul terminated")]
    MissingNul,
    #[error("backend sent non utf8 string: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl ProtocolError {
    pub(crate) fn unknown(found: u8) -> ProtocolError {
        Self::Unknown(found as char)
    }

    pub(crate) fn unexpected(expect: u8, found: u8) -> ProtocolError {
        Self::Unexpected { expect: expect as char, found: found as char }
    }

    pub(crate) fn unexpected_phase(found: u8, phase: &'static str) -> ProtocolError {
        Self::UnexpectedPhase { found: found as char, phase }
    }

    pub(crate) fn missing_nul() -> ProtocolError {
        Self::MissingNul
    }
}

// ErrorResponse and NoticeResponse field codes.
// Both `S` (localized, historical) and `V` (non localized) severities are
// kept as independent keys.
pub(crate) const RESPONSE_SEVERITY: u8 = b'S';
pub(crate) const RESPONSE_SEVERITY_NONLOCALIZED: u8 = b'V';
pub(crate) const RESPONSE_CODE: u8 = b'C';
pub(crate) const RESPONSE_MSG: u8 = b'M';
pub(crate) const RESPONSE_DETAIL: u8 = b'D';
pub(crate) const RESPONSE_HINT: u8 = b'H';
pub(crate) const RESPONSE_POSITION: u8 = b'P';

/// A parsed `ErrorResponse` (or `NoticeResponse`) field map.
///
/// <https://www.postgresql.org/docs/current/protocol-error-fields.html>
#[derive(Clone, Default)]
pub struct ServerError {
    fields: Vec<(u8, String)>,
}

impl ServerError {
    /// Parse the raw message body.
    ///
    /// Fields of unrecognized type are kept verbatim, frontends should
    /// silently ignore them.
    pub(crate) fn parse(mut body: Bytes) -> Result<Self, ProtocolError> {
        let mut fields = Vec::new();
        while body.has_remaining() {
            let code = body.get_u8();
            if code == 0 {
                break;
            }
            fields.push((code, body.get_nul_string()?));
        }
        Ok(Self { fields })
    }

    fn field(&self, code: u8) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, v)| v.as_str())
    }

    /// Localized severity (the historical `S` field).
    pub fn severity(&self) -> Option<&str> {
        self.field(RESPONSE_SEVERITY)
    }

    /// Non localized severity (the newer `V` field).
    pub fn severity_nonlocalized(&self) -> Option<&str> {
        self.field(RESPONSE_SEVERITY_NONLOCALIZED)
    }

    /// The SQLSTATE code. Always present in conforming servers.
    pub fn code(&self) -> &str {
        self.field(RESPONSE_CODE).unwrap_or_default()
    }

    /// The primary human-readable error message. Always present in
    /// conforming servers.
    pub fn message(&self) -> &str {
        self.field(RESPONSE_MSG).unwrap_or_default()
    }

    /// Secondary error message carrying more detail.
    pub fn detail(&self) -> Option<&str> {
        self.field(RESPONSE_DETAIL)
    }

    /// Suggestion what to do about the problem.
    pub fn hint(&self) -> Option<&str> {
        self.field(RESPONSE_HINT)
    }

    /// Error cursor position as an index into the original query string.
    pub fn position(&self) -> Option<&str> {
        self.field(RESPONSE_POSITION)
    }

    /// All fields in arrival order.
    pub fn fields(&self) -> impl Iterator<Item = (u8, &str)> {
        self.fields.iter().map(|(c, v)| (*c, v.as_str()))
    }
}

impl std::error::Error for ServerError { }

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = self
            .severity_nonlocalized()
            .or_else(|| self.severity())
            .unwrap_or("ERROR");
        write!(f, "{severity}: {} ({})", self.message(), self.code())
    }
}

impl std::fmt::Debug for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_map();
        for (code, value) in self.fields() {
            dbg.key(&(code as char)).value(&value);
        }
        dbg.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_fields() {
        let body = Bytes::from_static(b"SERROR\0VERROR\0C28000\0Mpassword authentication failed\0\0");
        let err = ServerError::parse(body).unwrap();
        assert_eq!(err.severity(), Some("ERROR"));
        assert_eq!(err.severity_nonlocalized(), Some("ERROR"));
        assert_eq!(err.code(), "28000");
        assert_eq!(err.message(), "password authentication failed");
        assert_eq!(err.detail(), None);
    }

    #[test]
    fn severity_keys_are_independent() {
        let body = Bytes::from_static(b"SFEHLER\0VERROR\0C42601\0Mboom\0\0");
        let err = ServerError::parse(body).unwrap();
        assert_eq!(err.severity(), Some("FEHLER"));
        assert_eq!(err.severity_nonlocalized(), Some("ERROR"));
    }
}
