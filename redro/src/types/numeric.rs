//! NUMERIC wire codec.
//!
//! The binary representation is sign, weight, display scale, and a
//! sequence of base-10000 digit groups. Values are surfaced as their text
//! rendition, arbitrary precision decimals have no loss-free native host
//! type.
use super::{DecodeError, Value};

const SIGN_POSITIVE: u16 = 0x0000;
const SIGN_NEGATIVE: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;

/// Decode the binary numeric format into its decimal text form.
///
/// The display scale prefers the column type modifier when one is present,
/// falling back to the dscale transmitted with the value.
pub(crate) fn decode_binary(buf: &[u8], type_modifier: i32) -> Result<Value, DecodeError> {
    let malformed = || DecodeError::Malformed("numeric");

    if buf.len() < 8 {
        return Err(malformed());
    }
    let word = |i: usize| u16::from_be_bytes([buf[i * 2], buf[i * 2 + 1]]);

    let ndigits = word(0) as usize;
    let weight = word(1) as i16 as i32;
    let sign = word(2);
    let dscale = word(3) as i32;

    if buf.len() < 8 + ndigits * 2 {
        return Err(malformed());
    }

    if sign == SIGN_NAN {
        return Ok(Value::Numeric("NaN".into()));
    }
    if sign != SIGN_POSITIVE && sign != SIGN_NEGATIVE {
        return Err(malformed());
    }

    let scale = if type_modifier >= 4 {
        (type_modifier - 4) & 0xFFFF
    } else {
        dscale
    };

    // Digit group i carries four decimal digits at weight `weight - i`;
    // group weight 0 is the ones..thousands position.
    let mut integral = String::new();
    let mut fraction = String::new();
    for i in 0..ndigits {
        let group = word(4 + i);
        if group > 9999 {
            return Err(malformed());
        }
        let group_weight = weight - i as i32;
        let text = format!("{group:04}");
        if group_weight >= 0 {
            integral.push_str(&text);
        } else {
            // leading fractional groups absent from the wire are zero
            let offset = ((-group_weight - 1) * 4) as usize;
            while fraction.len() < offset {
                fraction.push('0');
            }
            fraction.push_str(&text);
        }
    }

    // The wire omits trailing zero groups of the integral part.
    let last_weight = weight - (ndigits as i32 - 1);
    if last_weight > 0 {
        for _ in 0..last_weight * 4 {
            integral.push('0');
        }
    }

    let mut integral = integral.trim_start_matches('0').to_string();
    if integral.is_empty() {
        integral.push('0');
    }

    // Render with exactly `scale` fractional digits.
    let scale = scale.max(0) as usize;
    if fraction.len() < scale {
        fraction.extend(std::iter::repeat_n('0', scale - fraction.len()));
    } else {
        fraction.truncate(scale);
    }

    let mut out = String::new();
    if sign == SIGN_NEGATIVE {
        out.push('-');
    }
    out.push_str(&integral);
    if !fraction.is_empty() {
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(Value::Numeric(out))
}

#[cfg(test)]
mod test {
    use super::*;

    fn decode(hex: &str) -> String {
        let buf = crate::types::hex_decode(hex).unwrap();
        match decode_binary(&buf, -1).unwrap() {
            Value::Numeric(s) => s,
            v => panic!("expected numeric, got {v:?}"),
        }
    }

    #[test]
    fn simple_fraction() {
        // 2 groups, weight 0, positive, dscale 2: 1234 5600
        assert_eq!(decode("000200000000000204d215e0"), "1234.56");
    }

    #[test]
    fn negative_small_fraction() {
        // 1 group, weight -1, negative, dscale 5: 0007
        assert_eq!(decode("0001ffff400000050007"), "-0.00070");
    }

    #[test]
    fn wide_integral() {
        // 3 groups, weight 1, positive, dscale 1
        assert_eq!(decode("000300010000000104d2162e2328"), "12345678.9");
    }

    #[test]
    fn omitted_trailing_groups() {
        // 1 group, weight 1, positive, dscale 0: 0003 => 30000
        assert_eq!(decode("00010001000000000003"), "30000");
    }

    #[test]
    fn nan() {
        assert_eq!(decode("00000000c0000000"), "NaN");
    }

    #[test]
    fn type_modifier_controls_scale() {
        // typmod for NUMERIC(10, 4) is ((10 << 16) | 4) + 4
        let buf = crate::types::hex_decode("000200000000000204d215e0").unwrap();
        let typmod = (10 << 16) | (4 + 4);
        match decode_binary(&buf, typmod).unwrap() {
            Value::Numeric(s) => assert_eq!(s, "1234.5600"),
            v => panic!("expected numeric, got {v:?}"),
        }
    }
}
