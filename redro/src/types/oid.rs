//! Wire type object identifiers.
//!
//! The subset of the server catalog the driver encodes or decodes,
//! including the Redshift-specific types (GEOMETRY, GEOGRAPHY, SUPER,
//! VARBYTE).
use crate::protocol::Oid;

pub const BOOLEAN: Oid = 16;
pub const BYTEA: Oid = 17;
pub const NAME: Oid = 19;
pub const BIGINT: Oid = 20;
pub const SMALLINT: Oid = 21;
pub const INTEGER: Oid = 23;
pub const TEXT: Oid = 25;
pub const OID: Oid = 26;
pub const REAL: Oid = 700;
pub const DOUBLE_PRECISION: Oid = 701;
/// The "unknown" pseudo type. Sent in Parse for parameters whose type the
/// driver leaves to the server.
pub const UNKNOWN: Oid = 705;
pub const BOOLEAN_ARRAY: Oid = 1000;
pub const CHAR_ARRAY: Oid = 1002;
pub const SMALLINT_ARRAY: Oid = 1005;
pub const INTEGER_ARRAY: Oid = 1007;
pub const TEXT_ARRAY: Oid = 1009;
pub const VARCHAR_ARRAY: Oid = 1015;
pub const BIGINT_ARRAY: Oid = 1016;
pub const REAL_ARRAY: Oid = 1021;
pub const DOUBLE_PRECISION_ARRAY: Oid = 1022;
pub const OID_ARRAY: Oid = 1028;
pub const ACLITEM_ARRAY: Oid = 1034;
pub const BPCHAR: Oid = 1042;
pub const VARCHAR: Oid = 1043;
pub const DATE: Oid = 1082;
pub const TIME: Oid = 1083;
pub const TIMESTAMP: Oid = 1114;
pub const TIMESTAMP_ARRAY: Oid = 1115;
pub const DATE_ARRAY: Oid = 1182;
pub const TIMESTAMPTZ: Oid = 1184;
pub const TIMESTAMPTZ_ARRAY: Oid = 1185;
pub const NUMERIC_ARRAY: Oid = 1231;
pub const TIMETZ: Oid = 1266;
pub const NUMERIC: Oid = 1700;
pub const GEOMETRY: Oid = 3000;
pub const GEOGRAPHY: Oid = 3001;
pub const SUPER: Oid = 4000;
pub const VARBYTE: Oid = 6551;

/// Map an element type to its array type.
pub(crate) const fn array_oid_of(element: Oid) -> Option<Oid> {
    Some(match element {
        BOOLEAN => BOOLEAN_ARRAY,
        SMALLINT => SMALLINT_ARRAY,
        INTEGER => INTEGER_ARRAY,
        BIGINT => BIGINT_ARRAY,
        REAL => REAL_ARRAY,
        DOUBLE_PRECISION => DOUBLE_PRECISION_ARRAY,
        TEXT => TEXT_ARRAY,
        VARCHAR => VARCHAR_ARRAY,
        NUMERIC => NUMERIC_ARRAY,
        DATE => DATE_ARRAY,
        TIMESTAMP => TIMESTAMP_ARRAY,
        TIMESTAMPTZ => TIMESTAMPTZ_ARRAY,
        _ => return None,
    })
}
