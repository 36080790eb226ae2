use crate::error::Result;
use crate::io::BufExt;

/// The length-encoded integer that opens a text result-set (§4.B "Text
/// Result-Set").
#[derive(Debug)]
pub struct ColumnCount {
    pub columns: u64,
}

impl ColumnCount {
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        Ok(ColumnCount {
            columns: buf.get_uint_lenenc()?,
        })
    }
}
