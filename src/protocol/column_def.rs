use crate::error::Result;
use crate::io::{Buf, BufExt};
use crate::protocol::{FieldFlags, TypeId};

/// Column-definition packet (§4.B).
#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub catalog: Box<str>,
    pub schema: Box<str>,
    pub table_alias: Box<str>,
    pub table: Box<str>,
    pub column_alias: Box<str>,
    pub column: Box<str>,
    pub char_set: u16,
    pub max_size: u32,
    pub type_id: TypeId,
    pub flags: FieldFlags,
    pub decimals: u8,
}

impl ColumnDefinition {
    /// The name applications see: the alias if present, else the
    /// underlying column name.
    pub fn name(&self) -> &str {
        if self.column_alias.is_empty() {
            &self.column
        } else {
            &self.column_alias
        }
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        let catalog = buf.get_str_lenenc()?.into();
        let schema = buf.get_str_lenenc()?.into();
        let table_alias = buf.get_str_lenenc()?.into();
        let table = buf.get_str_lenenc()?.into();
        let column_alias = buf.get_str_lenenc()?.into();
        let column = buf.get_str_lenenc()?.into();

        // length of the fixed-length fields that follow, always 0x0c
        buf.get_uint_lenenc()?;

        let char_set = buf.get_u16()?;
        let max_size = buf.get_u32()?;
        let type_id = TypeId(buf.get_u8()?);
        let flags = FieldFlags::from_bits_truncate(buf.get_u16()?);
        let decimals = buf.get_u8()?;

        Ok(ColumnDefinition {
            catalog,
            schema,
            table_alias,
            table,
            column_alias,
            column,
            char_set,
            max_size,
            type_id,
            flags,
            decimals,
        })
    }
}
