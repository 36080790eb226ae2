use crate::error::{protocol_err, Result};
use crate::io::{Buf, BufExt};
use crate::protocol::ServerStatus;

pub const HEADER: u8 = 0x00;

/// `OKPacket` (§4.B). Classified as lead byte `0x00` with payload length
/// >= 7 (the codec distinguishes it from a too-short lenenc-int header that
/// also happens to start with 0x00).
#[derive(Debug, Clone)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status: ServerStatus,
    pub warnings: u16,
}

impl OkPacket {
    pub fn matches(payload: &[u8]) -> bool {
        payload.first() == Some(&HEADER) && payload.len() >= 7
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != HEADER {
            return Err(protocol_err!(
                "expected OkPacket (0x00), got 0x{:02X}",
                header
            ));
        }

        let affected_rows = buf.get_uint_lenenc()?;
        let last_insert_id = buf.get_uint_lenenc()?;
        let status = ServerStatus::from_bits_truncate(buf.get_u16()?);
        let warnings = buf.get_u16()?;

        Ok(OkPacket {
            affected_rows,
            last_insert_id,
            status,
            warnings,
        })
    }
}
