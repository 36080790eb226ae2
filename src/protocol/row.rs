use crate::error::Result;
use crate::io::{Buf, BufExt};

const NULL_MARKER: u8 = 0xFB;

/// One text-protocol row: an ordered list of per-column optional byte
/// sequences, with a NULL marker distinguishable from an empty string
/// (§3 "Row buffer").
#[derive(Debug, Clone)]
pub struct TextRow {
    pub columns: Vec<Option<Box<[u8]>>>,
}

impl TextRow {
    pub fn decode(mut buf: &[u8], column_count: usize) -> Result<Self> {
        let mut columns = Vec::with_capacity(column_count);

        for _ in 0..column_count {
            if buf.first() == Some(&NULL_MARKER) {
                buf.advance(1)?;
                columns.push(None);
            } else {
                let bytes = buf.get_bytes_lenenc()?;
                columns.push(Some(bytes.into()));
            }
        }

        Ok(TextRow { columns })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::BufMutExt;

    #[test]
    fn it_decodes_a_row_with_a_null_column() {
        let mut buf = Vec::new();
        buf.put_str_lenenc("1");
        buf.put_u8(NULL_MARKER);

        let row = TextRow::decode(&buf, 2).unwrap();
        assert_eq!(row.columns[0].as_deref(), Some(b"1".as_slice()));
        assert_eq!(row.columns[1], None);
    }

    #[test]
    fn it_distinguishes_null_from_empty_string() {
        let mut buf = Vec::new();
        buf.put_str_lenenc("");
        let row = TextRow::decode(&buf, 1).unwrap();
        assert_eq!(row.columns[0].as_deref(), Some(b"".as_slice()));
    }
}
