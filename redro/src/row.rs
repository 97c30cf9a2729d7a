//! Result column metadata and row decoding.
use bytes::{Buf, Bytes};

use crate::{
    ext::BytesExt,
    protocol::{Format, Oid, ProtocolError},
    types::{CodecTable, DecodeError, Decoder, Value},
};

/// Metadata for one result column, as described by `RowDescription`.
///
/// Under the extended-result-metadata protocol each field additionally
/// carries source names and the column flag word. The decoder for the
/// column is bound from the active codec table at Describe time.
#[derive(Debug, Clone)]
pub struct FieldDescription {
    pub label: String,
    pub table_oid: i32,
    pub column_attrnum: i16,
    pub type_oid: Oid,
    pub type_size: i16,
    pub type_modifier: i32,
    pub format_code: i16,

    // extended result metadata
    pub schema_name: Option<String>,
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    pub catalog_name: Option<String>,
    pub nullable: bool,
    pub autoincrement: bool,
    pub read_only: bool,
    pub searchable: bool,

    pub(crate) decoder: Decoder,
    pub(crate) decoder_format: Format,
}

/// Parse a `RowDescription` body, binding decoders from `codecs`.
pub(crate) fn parse_row_description(
    mut body: Bytes,
    extended_metadata: bool,
    codecs: &CodecTable,
) -> Result<Vec<FieldDescription>, ProtocolError> {
    let count = body.get_u16();
    let mut fields = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let label = body.get_nul_string()?;
        let table_oid = body.get_i32();
        let column_attrnum = body.get_i16();
        let type_oid = body.get_i32();
        let type_size = body.get_i16();
        let type_modifier = body.get_i32();
        let format_code = body.get_i16();

        let mut field = FieldDescription {
            label,
            table_oid,
            column_attrnum,
            type_oid,
            type_size,
            type_modifier,
            format_code,
            schema_name: None,
            table_name: None,
            column_name: None,
            catalog_name: None,
            nullable: false,
            autoincrement: false,
            read_only: false,
            searchable: false,
            decoder: Decoder::Text,
            decoder_format: Format::Text,
        };

        if extended_metadata {
            field.schema_name = Some(body.get_nul_string()?);
            field.table_name = Some(body.get_nul_string()?);
            field.column_name = Some(body.get_nul_string()?);
            field.catalog_name = Some(body.get_nul_string()?);

            let flags = body.get_u16();
            field.nullable = flags & 0x1 != 0;
            field.autoincrement = (flags >> 4) & 0x1 != 0;
            field.read_only = (flags >> 8) & 0x1 != 0;
            field.searchable = (flags >> 12) & 0x1 != 0;
        }

        let (format, decoder) = codecs.lookup(field.type_oid);
        field.decoder = decoder;
        field.decoder_format = format;

        fields.push(field);
    }

    Ok(fields)
}

/// Decode a `DataRow` body against the bound row description.
///
/// The leading field count is ignored, the row description drives the
/// walk. A length of -1 denotes NULL.
pub(crate) fn decode_data_row(
    mut body: Bytes,
    fields: &[FieldDescription],
) -> Result<Vec<Value>, DecodeError> {
    let _count = body.get_u16();
    let mut row = Vec::with_capacity(fields.len());

    for field in fields {
        if body.remaining() < 4 {
            return Err(DecodeError::Malformed("data row"));
        }
        let len = body.get_i32();
        if len == -1 {
            row.push(Value::Null);
            continue;
        }
        let len = len as usize;
        if body.remaining() < len {
            return Err(DecodeError::Malformed("data row"));
        }
        let buf = body.split_to(len);
        row.push(field.decoder.decode(&buf, field.type_modifier)?);
    }

    Ok(row)
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::{ext::BufMutExt, protocol::ClientProtocolVersion, types::oid};

    fn plain_field(buf: &mut BytesMut, label: &str, type_oid: Oid) {
        buf.put_nul_string(label);
        buf.put_i32(0);
        buf.put_i16(0);
        buf.put_i32(type_oid);
        buf.put_i16(-1);
        buf.put_i32(-1);
        buf.put_i16(0);
    }

    #[test]
    fn parses_base_description() {
        let mut buf = BytesMut::new();
        buf.put_u16(2);
        plain_field(&mut buf, "id", oid::INTEGER);
        plain_field(&mut buf, "name", oid::VARCHAR);

        let codecs = CodecTable::new(ClientProtocolVersion::BaseServer);
        let fields = parse_row_description(buf.freeze(), false, &codecs).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].label, "id");
        assert_eq!(fields[0].decoder, Decoder::Int4);
        assert_eq!(fields[0].decoder_format, Format::Binary);
        assert_eq!(fields[1].decoder, Decoder::Text);
        assert!(fields[1].schema_name.is_none());
    }

    #[test]
    fn parses_extended_metadata() {
        let mut buf = BytesMut::new();
        buf.put_u16(1);
        plain_field(&mut buf, "id", oid::INTEGER);
        buf.put_nul_string("public");
        buf.put_nul_string("users");
        buf.put_nul_string("id");
        buf.put_nul_string("dev");
        buf.put_u16(0x0011); // nullable + autoincrement

        let codecs = CodecTable::new(ClientProtocolVersion::ExtendedResultMetadata);
        let fields = parse_row_description(buf.freeze(), true, &codecs).unwrap();
        let field = &fields[0];
        assert_eq!(field.schema_name.as_ref().unwrap(), "public");
        assert_eq!(field.table_name.as_ref().unwrap(), "users");
        assert_eq!(field.catalog_name.as_ref().unwrap(), "dev");
        assert!(field.nullable);
        assert!(field.autoincrement);
        assert!(!field.read_only);
        assert!(!field.searchable);
    }

    #[test]
    fn decodes_rows_with_nulls() {
        let mut desc = BytesMut::new();
        desc.put_u16(2);
        plain_field(&mut desc, "a", oid::INTEGER);
        plain_field(&mut desc, "b", oid::VARCHAR);
        let codecs = CodecTable::new(ClientProtocolVersion::BaseServer);
        let fields = parse_row_description(desc.freeze(), false, &codecs).unwrap();

        let mut row = BytesMut::new();
        row.put_u16(2);
        row.put_i32(4);
        row.put_i32(7);
        row.put_i32(-1);

        let values = decode_data_row(row.freeze(), &fields).unwrap();
        assert_eq!(values, vec![Value::Int(7), Value::Null]);
    }
}
