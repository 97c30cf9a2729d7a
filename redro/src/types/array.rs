//! Array inspection and the two array wire formats.
//!
//! Binary arrays carry dimension count, has-null flag, element OID, then
//! per dimension (length, lower-bound=1), then null-or-(length, bytes) per
//! element in row-major order. Text arrays are `{...}` literals with
//! `NULL` markers.
use bytes::{Buf, BufMut};

use super::{
    DecodeError, Encoder, Param, ScalarEncoder, Value,
    MAX_INT2, MAX_INT4, MAX_INT8, MIN_INT2, MIN_INT4, MIN_INT8,
    oid,
};
use crate::{error::Error, protocol::{Format, Oid}};

fn not_homogeneous() -> Error {
    Error::Programming("array elements not homogeneous".into())
}

fn dimensions_not_consistent() -> Error {
    Error::Programming("array dimensions not consistent".into())
}

/// Iterate leaf values (including nulls) in row-major order.
fn flatten<'v>(values: &'v [Value], out: &mut Vec<&'v Value>) {
    for value in values {
        match value {
            Value::Array(inner) => flatten(inner, out),
            other => out.push(other),
        }
    }
}

/// Lengths of the inner dimensions, verifying every sibling list agrees.
///
/// The outermost length is not included, callers prepend it.
fn check_dimensions(values: &[Value]) -> Result<Vec<i32>, Error> {
    let Some(first) = values.first() else {
        return Ok(Vec::new());
    };

    if let Value::Array(first_inner) = first {
        let req_len = first_inner.len();
        let req_inner = check_dimensions(first_inner)?;
        for value in values {
            let Value::Array(inner) = value else {
                return Err(dimensions_not_consistent());
            };
            if inner.len() != req_len || check_dimensions(inner)? != req_inner {
                return Err(dimensions_not_consistent());
            }
        }
        let mut dims = Vec::with_capacity(req_inner.len() + 1);
        dims.push(req_len as i32);
        dims.extend(req_inner);
        return Ok(dims);
    }

    // no nesting at this level, so none of the siblings may nest either
    if values.iter().any(|v| matches!(v, Value::Array(_))) {
        return Err(dimensions_not_consistent());
    }
    Ok(Vec::new())
}

/// Select `(array_oid, format, encoder)` for a sequence value.
///
/// Empty (or all-null) arrays default to TEXT[] binary. Integer arrays
/// pick the narrowest width containing every non-null element. Other
/// element types follow the scalar inspection of the first non-null
/// element, strings collapsing to TEXT to ride the binary format, which
/// avoids escaping text in array literals.
pub(crate) fn inspect(values: &[Value]) -> Result<Param, Error> {
    let mut leaves = Vec::new();
    flatten(values, &mut leaves);

    let Some(first) = leaves.iter().find(|v| !matches!(v, Value::Null)) else {
        return Ok(Param {
            oid: oid::TEXT_ARRAY,
            format: Format::Binary,
            encoder: Encoder::ArrayBinary { element_oid: oid::TEXT, element: ScalarEncoder::Text },
        });
    };

    if matches!(first, Value::Int(_)) {
        let (mut int2_ok, mut int4_ok, mut int8_ok) = (true, true, true);
        for leaf in &leaves {
            let v = match leaf {
                Value::Null => continue,
                Value::Int(v) => *v,
                _ => return Err(not_homogeneous()),
            };
            if MIN_INT2 < v && v < MAX_INT2 {
                continue;
            }
            int2_ok = false;
            if MIN_INT4 < v && v < MAX_INT4 {
                continue;
            }
            int4_ok = false;
            if MIN_INT8 < v && v < MAX_INT8 {
                continue;
            }
            int8_ok = false;
        }
        let (array_oid, element_oid, element) = if int2_ok {
            (oid::SMALLINT_ARRAY, oid::SMALLINT, ScalarEncoder::Int2)
        } else if int4_ok {
            (oid::INTEGER_ARRAY, oid::INTEGER, ScalarEncoder::Int4)
        } else if int8_ok {
            (oid::BIGINT_ARRAY, oid::BIGINT, ScalarEncoder::Int8)
        } else {
            return Err(Error::NotSupported("numeric not supported as array contents".into()));
        };
        return Ok(Param {
            oid: array_oid,
            format: Format::Binary,
            encoder: Encoder::ArrayBinary { element_oid, element },
        });
    }

    let scalar = super::inspect(first)?;
    let Encoder::Scalar(element) = scalar.encoder else {
        return Err(Error::NotSupported("nested sequence not supported as array contents".into()));
    };
    let (mut element_oid, mut format, mut element) = (scalar.oid, scalar.format, element);

    // unknown or string elements ride the binary TEXT[] format
    if matches!(element_oid, oid::UNKNOWN | oid::VARCHAR | oid::TEXT) {
        element_oid = oid::TEXT;
        format = Format::Binary;
        element = ScalarEncoder::Text;
    }

    let Some(array_oid) = oid::array_oid_of(element_oid) else {
        return Err(Error::NotSupported(
            format!("oid {element_oid} not supported as array contents").into(),
        ));
    };

    let encoder = match format {
        Format::Binary => Encoder::ArrayBinary { element_oid, element },
        Format::Text => Encoder::ArrayText { element },
    };
    Ok(Param { oid: array_oid, format, encoder })
}

/// Binary array format.
///
/// Runs the dimensional consistency check and refuses elements that do
/// not encode through the selected element encoder, both before any wire
/// bytes are produced for the statement.
pub(crate) fn encode_binary(
    values: &[Value],
    element_oid: Oid,
    element: ScalarEncoder,
) -> Result<Vec<u8>, Error> {
    let mut dims = vec![values.len() as i32];
    dims.extend(check_dimensions(values)?);

    let mut leaves = Vec::new();
    flatten(values, &mut leaves);
    let has_null = leaves.iter().any(|v| matches!(v, Value::Null));

    let mut buf = Vec::new();
    buf.put_i32(dims.len() as i32);
    buf.put_i32(has_null as i32);
    buf.put_i32(element_oid);
    for dim in dims {
        buf.put_i32(dim);
        buf.put_i32(1); // lower bound
    }
    for leaf in leaves {
        match leaf {
            Value::Null => buf.put_i32(-1),
            value => {
                let encoded = element.encode(value).map_err(|_| not_homogeneous())?;
                buf.put_i32(encoded.len() as i32);
                buf.put(&encoded[..]);
            }
        }
    }
    Ok(buf)
}

/// Text array format, `{...}` with `NULL` literals.
pub(crate) fn encode_text(values: &[Value], element: ScalarEncoder) -> Result<Vec<u8>, Error> {
    check_dimensions(values)?;

    fn render(values: &[Value], element: ScalarEncoder, out: &mut String) -> Result<(), Error> {
        out.push('{');
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            match value {
                Value::Array(inner) => render(inner, element, out)?,
                Value::Null => out.push_str("NULL"),
                value => {
                    let encoded = element.encode(value).map_err(|_| not_homogeneous())?;
                    out.push_str(std::str::from_utf8(&encoded).expect("text encoders emit utf8"));
                }
            }
        }
        out.push('}');
        Ok(())
    }

    let mut out = String::new();
    render(values, element, &mut out)?;
    Ok(out.into_bytes())
}

/// Decode the binary array format into a nested [`Value::Array`].
pub(crate) fn decode_binary(mut buf: &[u8]) -> Result<Value, DecodeError> {
    let malformed = || DecodeError::Malformed("array");

    if buf.remaining() < 12 {
        return Err(malformed());
    }
    let ndims = buf.get_i32();
    let _has_null = buf.get_i32();
    let element_oid = buf.get_i32();

    if !(0..=16).contains(&ndims) {
        return Err(malformed());
    }
    let mut dims = Vec::with_capacity(ndims as usize);
    for _ in 0..ndims {
        if buf.remaining() < 8 {
            return Err(malformed());
        }
        let len = buf.get_i32();
        let _lower_bound = buf.get_i32();
        if len < 0 {
            return Err(malformed());
        }
        dims.push(len as usize);
    }

    let total = dims.iter().product::<usize>();
    let mut leaves = Vec::with_capacity(if ndims == 0 { 0 } else { total });
    if ndims != 0 {
        for _ in 0..total {
            if buf.remaining() < 4 {
                return Err(malformed());
            }
            let len = buf.get_i32();
            if len == -1 {
                leaves.push(Value::Null);
                continue;
            }
            let len = len as usize;
            if buf.remaining() < len {
                return Err(malformed());
            }
            leaves.push(decode_element(&buf[..len], element_oid)?);
            buf.advance(len);
        }
    }

    let mut iter = leaves.into_iter();
    Ok(nest(&mut iter, &dims))
}

fn decode_element(buf: &[u8], element_oid: Oid) -> Result<Value, DecodeError> {
    use super::Decoder as D;
    let decoder = match element_oid {
        oid::BOOLEAN => D::Bool,
        oid::SMALLINT => D::Int2,
        oid::INTEGER | oid::OID => D::Int4,
        oid::BIGINT => D::Int8,
        oid::REAL => D::Float4,
        oid::DOUBLE_PRECISION => D::Float8,
        oid::NUMERIC => D::NumericBinary,
        oid::DATE => D::DateBinary,
        _ => D::Text,
    };
    decoder.decode(buf, -1)
}

/// Rebuild the nested list structure from row-major leaves.
fn nest(leaves: &mut std::vec::IntoIter<Value>, dims: &[usize]) -> Value {
    match dims {
        [] => Value::Array(Vec::new()),
        [len] => Value::Array(leaves.by_ref().take(*len).collect()),
        [len, rest @ ..] => Value::Array((0..*len).map(|_| nest(leaves, rest)).collect()),
    }
}

/// Parse element type for the text array formats.
#[derive(Clone, Copy)]
pub(crate) enum TextElem {
    Int,
    Float,
    Str,
}

/// Decode a `{...}` text array literal.
pub(crate) fn decode_text(text: &str, elem: TextElem) -> Result<Value, DecodeError> {
    let malformed = || DecodeError::Malformed("array");
    let bytes = text.as_bytes();
    let mut pos = 0usize;

    fn parse_list(
        bytes: &[u8],
        pos: &mut usize,
        elem: TextElem,
    ) -> Result<Value, DecodeError> {
        let malformed = || DecodeError::Malformed("array");
        if bytes.get(*pos) != Some(&b'{') {
            return Err(malformed());
        }
        *pos += 1;
        let mut values = Vec::new();
        loop {
            match bytes.get(*pos) {
                Some(b'}') => {
                    *pos += 1;
                    return Ok(Value::Array(values));
                }
                Some(b',') if !values.is_empty() => *pos += 1,
                Some(_) if values.is_empty() => {}
                _ => return Err(malformed()),
            }
            match bytes.get(*pos) {
                Some(b'{') => values.push(parse_list(bytes, pos, elem)?),
                Some(b'"') => {
                    *pos += 1;
                    let mut item = String::new();
                    loop {
                        match bytes.get(*pos) {
                            Some(b'"') => {
                                *pos += 1;
                                break;
                            }
                            Some(b'\\') => {
                                let escaped = *bytes.get(*pos + 1).ok_or_else(malformed)?;
                                item.push(escaped as char);
                                *pos += 2;
                            }
                            Some(c) => {
                                item.push(*c as char);
                                *pos += 1;
                            }
                            None => return Err(malformed()),
                        }
                    }
                    values.push(Value::Text(item));
                }
                Some(_) => {
                    let start = *pos;
                    while !matches!(bytes.get(*pos), Some(b',' | b'}') | None) {
                        *pos += 1;
                    }
                    let token = std::str::from_utf8(&bytes[start..*pos])
                        .expect("ascii delimited slice of utf8 input");
                    values.push(parse_token(token, elem)?);
                }
                None => return Err(malformed()),
            }
        }
    }

    fn parse_token(token: &str, elem: TextElem) -> Result<Value, DecodeError> {
        if token == "NULL" {
            return Ok(Value::Null);
        }
        match elem {
            TextElem::Int => token
                .parse::<i128>()
                .map(Value::Int)
                .map_err(|_| DecodeError::Malformed("array")),
            TextElem::Float => token
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| DecodeError::Malformed("array")),
            TextElem::Str => Ok(Value::Text(token.into())),
        }
    }

    let value = parse_list(bytes, &mut pos, elem)?;
    if pos != bytes.len() {
        return Err(malformed());
    }
    Ok(value)
}

#[cfg(test)]
mod test {
    use super::*;

    fn ints(values: &[i32]) -> Vec<Value> {
        values.iter().map(|v| Value::Int((*v).into())).collect()
    }

    #[test]
    fn narrow_int_matrix_is_int2_array() {
        let value = vec![
            Value::Array(ints(&[1, 2])),
            Value::Array(ints(&[3, 4])),
        ];
        let param = inspect(&value).unwrap();
        assert_eq!(param.oid, oid::SMALLINT_ARRAY);
        assert_eq!(param.format, Format::Binary);

        let Encoder::ArrayBinary { element_oid, element } = param.encoder else { panic!() };
        assert_eq!(element_oid, oid::SMALLINT);

        let buf = encode_binary(&value, element_oid, element).unwrap();
        let mut head = &buf[..];
        assert_eq!(head.get_i32(), 2); // dimensions
        assert_eq!(head.get_i32(), 0); // has_null
        assert_eq!(head.get_i32(), oid::SMALLINT);
        assert_eq!((head.get_i32(), head.get_i32()), (2, 1));
        assert_eq!((head.get_i32(), head.get_i32()), (2, 1));
    }

    #[test]
    fn int_width_widens_per_element() {
        let param = inspect(&ints(&[1, 40_000])).unwrap();
        assert_eq!(param.oid, oid::INTEGER_ARRAY);

        let param = inspect(&[Value::Int(1), Value::Int(1 << 40)]).unwrap();
        assert_eq!(param.oid, oid::BIGINT_ARRAY);
    }

    #[test]
    fn empty_array_defaults_to_text() {
        let param = inspect(&[]).unwrap();
        assert_eq!(param.oid, oid::TEXT_ARRAY);
        assert_eq!(param.format, Format::Binary);
    }

    #[test]
    fn binary_round_trip_preserves_structure() {
        let value = vec![
            Value::Array(vec![Value::Int(1), Value::Null]),
            Value::Array(vec![Value::Int(3), Value::Int(4)]),
        ];
        let Param { encoder: Encoder::ArrayBinary { element_oid, element }, .. } =
            inspect(&value).unwrap()
        else {
            panic!()
        };
        let buf = encode_binary(&value, element_oid, element).unwrap();
        assert_eq!(decode_binary(&buf).unwrap(), Value::Array(value));
    }

    #[test]
    fn ragged_array_is_rejected() {
        let value = vec![
            Value::Array(ints(&[1, 2])),
            Value::Array(ints(&[3])),
        ];
        let Param { encoder: Encoder::ArrayBinary { element_oid, element }, .. } =
            inspect(&value).unwrap()
        else {
            panic!()
        };
        let err = encode_binary(&value, element_oid, element).unwrap_err();
        assert!(err.to_string().contains("dimensions not consistent"), "{err}");
    }

    #[test]
    fn mixed_element_types_are_rejected() {
        let err = inspect(&[Value::Int(1), Value::Text("two".into())]).unwrap_err();
        assert!(err.to_string().contains("not homogeneous"), "{err}");

        let err = encode_binary(
            &[Value::Text("a".into()), Value::Bool(true)],
            oid::TEXT,
            ScalarEncoder::Text,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not homogeneous"), "{err}");
    }

    #[test]
    fn date_array_uses_text_format() {
        let date = time::Date::from_julian_day(2_451_545).unwrap();
        let value = vec![Value::Date(date), Value::Null];
        let param = inspect(&value).unwrap();
        assert_eq!(param.oid, oid::DATE_ARRAY);
        assert_eq!(param.format, Format::Text);

        let Encoder::ArrayText { element } = param.encoder else { panic!() };
        let buf = encode_text(&value, element).unwrap();
        assert_eq!(buf, b"{2000-01-01,NULL}");
    }

    #[test]
    fn text_array_literals_parse() {
        assert_eq!(
            decode_text("{1,2,NULL}", TextElem::Int).unwrap(),
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Null]),
        );
        assert_eq!(
            decode_text("{{1.5},{2.5}}", TextElem::Float).unwrap(),
            Value::Array(vec![
                Value::Array(vec![Value::Float(1.5)]),
                Value::Array(vec![Value::Float(2.5)]),
            ]),
        );
        assert_eq!(
            decode_text(r#"{plain,"qu\"oted",NULL}"#, TextElem::Str).unwrap(),
            Value::Array(vec![
                Value::Text("plain".into()),
                Value::Text("qu\"oted".into()),
                Value::Null,
            ]),
        );
        assert!(decode_text("{1,", TextElem::Int).is_err());
    }
}
