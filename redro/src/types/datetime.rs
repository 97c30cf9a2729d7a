//! Temporal wire codecs.
//!
//! Binary dates are days since 2000-01-01, binary times are microseconds
//! since midnight, TIMETZ carries a 4-byte zone offset suffix (seconds
//! west of UTC). Timestamps are transferred as text.
use time::{
    Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset,
    format_description::{BorrowedFormatItem as I, Component as C, modifier},
};

use super::{DecodeError, Value};

/// 2000-01-01, the wire epoch.
const PG_EPOCH: Date = {
    // source: `from_julian_day` docs
    match Date::from_julian_day(2_451_545) {
        Ok(ok) => ok,
        Err(_) => panic!("julian day of 2000-01-01 is in range"),
    }
};

const DATE: &[I<'_>] = &[
    I::Component(C::Year(modifier::Year::default())),
    I::Literal(b"-"),
    I::Component(C::Month(modifier::Month::default())),
    I::Literal(b"-"),
    I::Component(C::Day(modifier::Day::default())),
];

const SUBSECOND: &[I<'_>] = &[
    I::Literal(b"."),
    I::Component(C::Subsecond(modifier::Subsecond::default())),
];

const TIME: &[I<'_>] = &[
    I::Component(C::Hour(modifier::Hour::default())),
    I::Literal(b":"),
    I::Component(C::Minute(modifier::Minute::default())),
    I::Literal(b":"),
    I::Component(C::Second(modifier::Second::default())),
    I::Optional(&I::Compound(SUBSECOND)),
];

const TIMESTAMP: &[I<'_>] = &[
    I::Compound(DATE),
    I::Literal(b" "),
    I::Compound(TIME),
];

const OFFSET_MINUTE: &[I<'_>] = &[
    I::Literal(b":"),
    I::Component(C::OffsetMinute(modifier::OffsetMinute::default())),
];

const TIMESTAMPTZ: &[I<'_>] = &[
    I::Compound(TIMESTAMP),
    I::Component(C::OffsetHour(modifier::OffsetHour::default())),
    I::Optional(&I::Compound(OFFSET_MINUTE)),
];

pub(crate) fn decode_date_text(text: &str) -> Result<Value, DecodeError> {
    Date::parse(text, DATE)
        .map(Value::Date)
        .map_err(|_| DecodeError::Malformed("date"))
}

pub(crate) fn decode_date_binary(buf: &[u8]) -> Result<Value, DecodeError> {
    let days = i32::from_be_bytes(super::fixed(buf, "date")?);
    PG_EPOCH
        .to_julian_day()
        .checked_add(days)
        .map(Date::from_julian_day)
        .and_then(Result::ok)
        .map(Value::Date)
        .ok_or(DecodeError::Malformed("date"))
}

pub(crate) fn decode_time_text(text: &str) -> Result<Value, DecodeError> {
    Time::parse(text, TIME)
        .map(Value::Time)
        .map_err(|_| DecodeError::Malformed("time"))
}

fn micros_to_time(micros: i64) -> Result<Time, DecodeError> {
    if !(0..86_400_000_000).contains(&micros) {
        return Err(DecodeError::Malformed("time"));
    }
    Ok(Time::MIDNIGHT + Duration::microseconds(micros))
}

pub(crate) fn decode_time_binary(buf: &[u8]) -> Result<Value, DecodeError> {
    let micros = i64::from_be_bytes(super::fixed(buf, "time")?);
    micros_to_time(micros).map(Value::Time)
}

pub(crate) fn decode_timetz_binary(buf: &[u8]) -> Result<Value, DecodeError> {
    let raw: [u8; 12] = super::fixed(buf, "timetz")?;
    let micros = i64::from_be_bytes(raw[..8].try_into().unwrap());
    // seconds west of UTC on the wire, east-positive in the host value
    let zone = i32::from_be_bytes(raw[8..].try_into().unwrap());
    let offset = UtcOffset::from_whole_seconds(-zone).map_err(|_| DecodeError::Malformed("timetz"))?;
    Ok(Value::TimeTz(micros_to_time(micros)?, offset))
}

pub(crate) fn decode_timestamp_text(text: &str) -> Result<Value, DecodeError> {
    PrimitiveDateTime::parse(text, TIMESTAMP)
        .map(Value::Timestamp)
        .map_err(|_| DecodeError::Malformed("timestamp"))
}

pub(crate) fn decode_timestamptz_text(text: &str) -> Result<Value, DecodeError> {
    OffsetDateTime::parse(text, TIMESTAMPTZ)
        .map(Value::TimestampTz)
        .map_err(|_| DecodeError::Malformed("timestamptz"))
}

pub(crate) fn encode_date(date: Date) -> String {
    date.format(DATE).expect("format is statically known")
}

pub(crate) fn encode_time(time: Time) -> String {
    let (h, m, s, us) = time.as_hms_micro();
    format!("{h:02}:{m:02}:{s:02}.{us:06}")
}

fn render_offset(offset: UtcOffset) -> String {
    let total = offset.whole_seconds();
    let (sign, total) = if total < 0 { ('-', -total) } else { ('+', total) };
    format!("{sign}{:02}:{:02}", total / 3600, total % 3600 / 60)
}

pub(crate) fn encode_timetz(time: Time, offset: UtcOffset) -> String {
    format!("{}{}", encode_time(time), render_offset(offset))
}

pub(crate) fn encode_timestamp(ts: PrimitiveDateTime) -> String {
    format!("{} {}", encode_date(ts.date()), encode_time(ts.time()))
}

pub(crate) fn encode_timestamptz(ts: OffsetDateTime) -> String {
    format!(
        "{} {}{}",
        encode_date(ts.date()),
        encode_time(ts.time()),
        render_offset(ts.offset()),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use time::Month;

    #[test]
    fn date_binary_is_days_since_2000() {
        assert_eq!(
            decode_date_binary(&0i32.to_be_bytes()).unwrap(),
            Value::Date(Date::from_calendar_date(2000, Month::January, 1).unwrap()),
        );
        assert_eq!(
            decode_date_binary(&366i32.to_be_bytes()).unwrap(),
            Value::Date(Date::from_calendar_date(2001, Month::January, 1).unwrap()),
        );
        assert_eq!(
            decode_date_binary(&(-1i32).to_be_bytes()).unwrap(),
            Value::Date(Date::from_calendar_date(1999, Month::December, 31).unwrap()),
        );
    }

    #[test]
    fn time_binary_is_micros_since_midnight() {
        let micros: i64 = ((13 * 3600 + 30 * 60 + 5) * 1_000_000) + 123_456;
        assert_eq!(
            decode_time_binary(&micros.to_be_bytes()).unwrap(),
            Value::Time(Time::from_hms_micro(13, 30, 5, 123_456).unwrap()),
        );
        assert!(decode_time_binary(&(-1i64).to_be_bytes()).is_err());
    }

    #[test]
    fn timetz_binary_carries_zone_suffix() {
        let micros: i64 = 3600 * 1_000_000;
        let mut buf = micros.to_be_bytes().to_vec();
        // 18000 seconds west of UTC == -05:00
        buf.extend_from_slice(&18_000i32.to_be_bytes());
        assert_eq!(
            decode_timetz_binary(&buf).unwrap(),
            Value::TimeTz(
                Time::from_hms(1, 0, 0).unwrap(),
                UtcOffset::from_hms(-5, 0, 0).unwrap(),
            ),
        );
    }

    #[test]
    fn timestamp_text_round_trip() {
        let Value::Timestamp(ts) = decode_timestamp_text("2022-03-04 05:06:07.000008").unwrap()
        else {
            panic!()
        };
        assert_eq!(encode_timestamp(ts), "2022-03-04 05:06:07.000008");

        // subseconds are optional on the wire
        assert!(decode_timestamp_text("2022-03-04 05:06:07").is_ok());
    }

    #[test]
    fn timestamptz_text_parses_short_offset() {
        let Value::TimestampTz(ts) = decode_timestamptz_text("2022-03-04 05:06:07+00").unwrap()
        else {
            panic!()
        };
        assert_eq!(ts.offset(), UtcOffset::UTC);
        assert_eq!(encode_timestamptz(ts), "2022-03-04 05:06:07.000000+00:00");
    }
}
