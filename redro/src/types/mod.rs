//! Host value model and the per-type wire codecs.
//!
//! Two registries drive value conversion, mirroring the two directions of
//! the protocol:
//!
//! - **Decoders by OID** ([`CodecTable`]): which decoder and wire format a
//!   result column uses. The table depends on the negotiated transfer
//!   protocol and is rebuilt whenever the server settles on a different
//!   protocol version.
//! - **Encoders by host value** ([`inspect`]): which OID, format code and
//!   encoder a bound parameter uses.
use std::collections::HashMap;

use crate::{
    error::Error,
    protocol::{ClientProtocolVersion, Format, Oid},
};

pub(crate) mod array;
pub(crate) mod datetime;
pub(crate) mod numeric;
pub mod oid;

/// A host value bound as a query parameter or decoded from a result
/// column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// Any integer. The wire width (SMALLINT/INTEGER/BIGINT/NUMERIC) is
    /// selected by magnitude at bind time.
    Int(i128),
    Float(f64),
    /// An arbitrary precision decimal, kept as its text rendition.
    Numeric(String),
    Text(String),
    /// Raw bytes, transferred as VARBYTE hex.
    Bytes(Vec<u8>),
    Date(time::Date),
    Time(time::Time),
    TimeTz(time::Time, time::UtcOffset),
    Timestamp(time::PrimitiveDateTime),
    TimestampTz(time::OffsetDateTime),
    Array(Vec<Value>),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Value {
            fn from($pat: $ty) -> Self {
                $body
            }
        }
    };
}

from!(<bool>v => Self::Bool(v));
from!(<i16>v => Self::Int(v.into()));
from!(<i32>v => Self::Int(v.into()));
from!(<i64>v => Self::Int(v.into()));
from!(<i128>v => Self::Int(v));
from!(<f64>v => Self::Float(v));
from!(<&str>v => Self::Text(v.into()));
from!(<String>v => Self::Text(v));
from!(<Vec<u8>>v => Self::Bytes(v));
from!(<time::Date>v => Self::Date(v));
from!(<time::Time>v => Self::Time(v));
from!(<time::PrimitiveDateTime>v => Self::Timestamp(v));
from!(<time::OffsetDateTime>v => Self::TimestampTz(v));
from!(<Vec<Value>>v => Self::Array(v));

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// An error when decoding a result column.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("non utf8 text value")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed {0} value")]
    Malformed(&'static str),
}

/// Per-OID result column decoder.
///
/// One tag per distinct wire representation; the active
/// OID → decoder mapping lives in [`CodecTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decoder {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Text,
    NumericText,
    /// Sign, weight, dscale and base-10000 digit groups. Additionally
    /// consults the column type modifier for the display scale.
    NumericBinary,
    DateText,
    /// Days since 2000-01-01.
    DateBinary,
    TimeText,
    /// Microseconds since midnight.
    TimeBinary,
    /// Microseconds since midnight plus a 4-byte zone offset suffix.
    TimeTzBinary,
    TimestampText,
    TimestampTzText,
    /// Raw geography bytes, surfaced as their hex rendition.
    GeographyHex,
    /// VARBYTE arrives hex encoded in a text-format column.
    VarbyteHex,
    ArrayBinary,
    IntArrayText,
    FloatArrayText,
    StrArrayText,
}

impl Decoder {
    pub(crate) fn decode(self, buf: &[u8], type_modifier: i32) -> Result<Value, DecodeError> {
        match self {
            Self::Bool => match buf {
                [0] => Ok(Value::Bool(false)),
                [_] => Ok(Value::Bool(true)),
                _ => Err(DecodeError::Malformed("bool")),
            },
            Self::Int2 => Ok(Value::Int(i16::from_be_bytes(fixed(buf, "int2")?).into())),
            Self::Int4 => Ok(Value::Int(i32::from_be_bytes(fixed(buf, "int4")?).into())),
            Self::Int8 => Ok(Value::Int(i64::from_be_bytes(fixed(buf, "int8")?).into())),
            Self::Float4 => Ok(Value::Float(f32::from_be_bytes(fixed(buf, "float4")?).into())),
            Self::Float8 => Ok(Value::Float(f64::from_be_bytes(fixed(buf, "float8")?))),
            Self::Text => Ok(Value::Text(std::str::from_utf8(buf)?.into())),
            Self::NumericText => Ok(Value::Numeric(std::str::from_utf8(buf)?.into())),
            Self::NumericBinary => numeric::decode_binary(buf, type_modifier),
            Self::DateText => datetime::decode_date_text(std::str::from_utf8(buf)?),
            Self::DateBinary => datetime::decode_date_binary(buf),
            Self::TimeText => datetime::decode_time_text(std::str::from_utf8(buf)?),
            Self::TimeBinary => datetime::decode_time_binary(buf),
            Self::TimeTzBinary => datetime::decode_timetz_binary(buf),
            Self::TimestampText => datetime::decode_timestamp_text(std::str::from_utf8(buf)?),
            Self::TimestampTzText => datetime::decode_timestamptz_text(std::str::from_utf8(buf)?),
            Self::GeographyHex => Ok(Value::Text(hex_encode(buf))),
            Self::VarbyteHex => Ok(Value::Bytes(hex_decode(std::str::from_utf8(buf)?)?)),
            Self::ArrayBinary => array::decode_binary(buf),
            Self::IntArrayText => array::decode_text(std::str::from_utf8(buf)?, array::TextElem::Int),
            Self::FloatArrayText => array::decode_text(std::str::from_utf8(buf)?, array::TextElem::Float),
            Self::StrArrayText => array::decode_text(std::str::from_utf8(buf)?, array::TextElem::Str),
        }
    }
}

fn fixed<const N: usize>(buf: &[u8], what: &'static str) -> Result<[u8; N], DecodeError> {
    buf.try_into().map_err(|_| DecodeError::Malformed(what))
}

pub(crate) fn hex_encode(buf: &[u8]) -> String {
    let mut out = String::with_capacity(buf.len() * 2);
    for b in buf {
        out.push(char::from_digit((b >> 4) as u32, 16).unwrap());
        out.push(char::from_digit((b & 0xf) as u32, 16).unwrap());
    }
    out
}

pub(crate) fn hex_decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    let text = text.as_bytes();
    if text.len() % 2 != 0 {
        return Err(DecodeError::Malformed("varbyte"));
    }
    let digit = |b: u8| {
        (b as char)
            .to_digit(16)
            .map(|d| d as u8)
            .ok_or(DecodeError::Malformed("varbyte"))
    };
    text.chunks_exact(2)
        .map(|pair| Ok(digit(pair[0])? << 4 | digit(pair[1])?))
        .collect()
}

/// The active OID → decoder mapping.
///
/// Under the binary transfer protocol NUMERIC, DATE, TIME, GEOGRAPHY and
/// the common array types switch to binary decoders; under the text
/// protocols they fall back to text parsers. The rest of the table is
/// protocol independent.
#[derive(Debug)]
pub(crate) struct CodecTable {
    map: HashMap<Oid, (Format, Decoder)>,
}

impl CodecTable {
    pub(crate) fn new(protocol: ClientProtocolVersion) -> Self {
        use Decoder as D;
        use Format::{Binary, Text};

        let mut map = HashMap::from([
            (oid::BOOLEAN, (Binary, D::Bool)),
            (oid::NAME, (Text, D::Text)),
            (oid::BIGINT, (Binary, D::Int8)),
            (oid::SMALLINT, (Binary, D::Int2)),
            (oid::INTEGER, (Binary, D::Int4)),
            (oid::TEXT, (Text, D::Text)),
            (oid::OID, (Binary, D::Int4)),
            (oid::REAL, (Binary, D::Float4)),
            (oid::DOUBLE_PRECISION, (Binary, D::Float8)),
            (oid::UNKNOWN, (Text, D::Text)),
            (oid::BPCHAR, (Text, D::Text)),
            (oid::VARCHAR, (Text, D::Text)),
            (oid::TIMESTAMP, (Text, D::TimestampText)),
            (oid::TIMESTAMPTZ, (Text, D::TimestampTzText)),
            // TIMETZ is transferred binary under every protocol version.
            (oid::TIMETZ, (Binary, D::TimeTzBinary)),
            (oid::GEOMETRY, (Text, D::Text)),
            (oid::SUPER, (Text, D::Text)),
            // VARBYTE arrives as hex in a text-format column under every
            // protocol version.
            (oid::VARBYTE, (Text, D::VarbyteHex)),
        ]);

        if protocol >= ClientProtocolVersion::BinaryProtocol {
            map.extend([
                (oid::NUMERIC, (Binary, D::NumericBinary)),
                (oid::DATE, (Binary, D::DateBinary)),
                (oid::GEOGRAPHY, (Binary, D::GeographyHex)),
                (oid::TIME, (Binary, D::TimeBinary)),
                (oid::CHAR_ARRAY, (Binary, D::ArrayBinary)),
                (oid::SMALLINT_ARRAY, (Binary, D::ArrayBinary)),
                (oid::INTEGER_ARRAY, (Binary, D::ArrayBinary)),
                (oid::TEXT_ARRAY, (Binary, D::ArrayBinary)),
                (oid::VARCHAR_ARRAY, (Binary, D::ArrayBinary)),
                (oid::REAL_ARRAY, (Binary, D::ArrayBinary)),
                (oid::OID_ARRAY, (Binary, D::ArrayBinary)),
                (oid::ACLITEM_ARRAY, (Binary, D::ArrayBinary)),
            ]);
        } else {
            map.extend([
                (oid::NUMERIC, (Text, D::NumericText)),
                (oid::DATE, (Text, D::DateText)),
                (oid::GEOGRAPHY, (Text, D::Text)),
                (oid::TIME, (Text, D::TimeText)),
                (oid::CHAR_ARRAY, (Text, D::StrArrayText)),
                (oid::SMALLINT_ARRAY, (Text, D::IntArrayText)),
                (oid::INTEGER_ARRAY, (Text, D::IntArrayText)),
                (oid::TEXT_ARRAY, (Text, D::StrArrayText)),
                (oid::VARCHAR_ARRAY, (Text, D::StrArrayText)),
                (oid::REAL_ARRAY, (Text, D::FloatArrayText)),
                (oid::OID_ARRAY, (Text, D::IntArrayText)),
                (oid::ACLITEM_ARRAY, (Text, D::StrArrayText)),
            ]);
        }

        Self { map }
    }

    /// Format and decoder for a result column.
    ///
    /// Unknown type OIDs fall back to the text decoder, surfacing the
    /// column verbatim.
    pub(crate) fn lookup(&self, oid: Oid) -> (Format, Decoder) {
        self.map
            .get(&oid)
            .copied()
            .unwrap_or((Format::Text, Decoder::Text))
    }
}

// Wire integer bounds, exclusive on both ends.
pub(crate) const MIN_INT2: i128 = -(1 << 15);
pub(crate) const MAX_INT2: i128 = 1 << 15;
pub(crate) const MIN_INT4: i128 = -(1 << 31);
pub(crate) const MAX_INT4: i128 = 1 << 31;
pub(crate) const MIN_INT8: i128 = -(1 << 63);
pub(crate) const MAX_INT8: i128 = 1 << 63;

/// Attempted to encode a value through an encoder selected for a
/// different host type.
pub(crate) struct EncodeMismatch;

/// A scalar parameter encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScalarEncoder {
    Bool,
    Int2,
    Int4,
    Int8,
    Float8,
    /// Integers too wide for BIGINT and decimals, as text.
    NumericText,
    Text,
    VarbyteHex,
    DateText,
    TimeText,
    TimeTzText,
    TimestampText,
    TimestampTzText,
    /// The NULL literal parameter, which carries no bytes at all.
    Null,
}

impl ScalarEncoder {
    pub(crate) fn encode(self, value: &Value) -> Result<Vec<u8>, EncodeMismatch> {
        match (self, value) {
            (Self::Bool, Value::Bool(v)) => Ok(vec![*v as u8]),
            (Self::Int2, Value::Int(v)) => Ok((*v as i16).to_be_bytes().into()),
            (Self::Int4, Value::Int(v)) => Ok((*v as i32).to_be_bytes().into()),
            (Self::Int8, Value::Int(v)) => Ok((*v as i64).to_be_bytes().into()),
            (Self::Float8, Value::Float(v)) => Ok(v.to_be_bytes().into()),
            (Self::NumericText, Value::Int(v)) => Ok(v.to_string().into_bytes()),
            (Self::NumericText, Value::Numeric(v)) => Ok(v.clone().into_bytes()),
            (Self::Text, Value::Text(v)) => Ok(v.clone().into_bytes()),
            (Self::VarbyteHex, Value::Bytes(v)) => Ok(hex_encode(v).into_bytes()),
            (Self::DateText, Value::Date(v)) => Ok(datetime::encode_date(*v).into_bytes()),
            (Self::TimeText, Value::Time(v)) => Ok(datetime::encode_time(*v).into_bytes()),
            (Self::TimeTzText, Value::TimeTz(t, o)) => {
                Ok(datetime::encode_timetz(*t, *o).into_bytes())
            }
            (Self::TimestampText, Value::Timestamp(v)) => {
                Ok(datetime::encode_timestamp(*v).into_bytes())
            }
            (Self::TimestampTzText, Value::TimestampTz(v)) => {
                Ok(datetime::encode_timestamptz(*v).into_bytes())
            }
            _ => Err(EncodeMismatch),
        }
    }
}

/// A parameter encoder, scalar or array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Encoder {
    Scalar(ScalarEncoder),
    /// Binary array format: dimensions, has-null flag, element OID, then
    /// length prefixed elements in row-major order.
    ArrayBinary {
        element_oid: Oid,
        element: ScalarEncoder,
    },
    /// Text array format: `{...}` with `NULL` literals.
    ArrayText { element: ScalarEncoder },
}

impl Encoder {
    /// Encode a parameter value. `None` stands for the wire NULL (-1
    /// length, no bytes).
    pub(crate) fn encode(self, value: &Value) -> Result<Option<Vec<u8>>, Error> {
        if matches!(value, Value::Null) {
            return Ok(None);
        }
        match self {
            Self::Scalar(enc) => match enc.encode(value) {
                Ok(buf) => Ok(Some(buf)),
                Err(EncodeMismatch) => Err(Error::Internal(
                    "parameter value does not match its inspected type".into(),
                )),
            },
            Self::ArrayBinary { element_oid, element } => match value {
                Value::Array(values) => {
                    array::encode_binary(values, element_oid, element).map(Some)
                }
                _ => Err(Error::Internal(
                    "parameter value does not match its inspected type".into(),
                )),
            },
            Self::ArrayText { element } => match value {
                Value::Array(values) => array::encode_text(values, element).map(Some),
                _ => Err(Error::Internal(
                    "parameter value does not match its inspected type".into(),
                )),
            },
        }
    }
}

/// A bound parameter: wire OID, format code, and the encoder producing its
/// bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Param {
    pub(crate) oid: Oid,
    pub(crate) format: Format,
    pub(crate) encoder: Encoder,
}

/// Select `(oid, format, encoder)` for a host value.
///
/// Integers pick the narrowest of SMALLINT/INTEGER/BIGINT that contains
/// the value, overflowing into NUMERIC. Datetimes dispatch on zone
/// presence. Sequences go through the array inspector.
pub(crate) fn inspect(value: &Value) -> Result<Param, Error> {
    use Format::{Binary, Text};
    use ScalarEncoder as S;

    let param = |oid, format, encoder| Param { oid, format, encoder: Encoder::Scalar(encoder) };

    Ok(match value {
        Value::Null => param(-1, Text, S::Null),
        Value::Bool(_) => param(oid::BOOLEAN, Binary, S::Bool),
        Value::Int(v) => inspect_int(*v),
        Value::Float(_) => param(oid::DOUBLE_PRECISION, Binary, S::Float8),
        Value::Numeric(_) => param(oid::NUMERIC, Text, S::NumericText),
        Value::Text(_) => param(oid::VARCHAR, Text, S::Text),
        Value::Bytes(_) => param(oid::VARBYTE, Text, S::VarbyteHex),
        Value::Date(_) => param(oid::DATE, Text, S::DateText),
        Value::Time(_) => param(oid::TIME, Text, S::TimeText),
        Value::TimeTz(..) => param(oid::TIMETZ, Text, S::TimeTzText),
        Value::Timestamp(_) => param(oid::TIMESTAMP, Text, S::TimestampText),
        Value::TimestampTz(_) => param(oid::TIMESTAMPTZ, Text, S::TimestampTzText),
        Value::Array(values) => array::inspect(values)?,
    })
}

pub(crate) fn inspect_int(value: i128) -> Param {
    use ScalarEncoder as S;

    let (oid, format, encoder) = if MIN_INT2 < value && value < MAX_INT2 {
        (oid::SMALLINT, Format::Binary, S::Int2)
    } else if MIN_INT4 < value && value < MAX_INT4 {
        (oid::INTEGER, Format::Binary, S::Int4)
    } else if MIN_INT8 < value && value < MAX_INT8 {
        (oid::BIGINT, Format::Binary, S::Int8)
    } else {
        (oid::NUMERIC, Format::Text, S::NumericText)
    };
    Param { oid, format, encoder: Encoder::Scalar(encoder) }
}
