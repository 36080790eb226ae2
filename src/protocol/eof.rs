use crate::error::{protocol_err, Result};
use crate::io::Buf;
use crate::protocol::ServerStatus;

pub const HEADER: u8 = 0xFE;

/// `EOFPacket` (§4.B): the legacy result-set terminator used when
/// `DEPRECATE_EOF` was negotiated off, which this core always requires
/// (§6 "Required OFF").
#[derive(Debug, Clone)]
pub struct EofPacket {
    pub warnings: u16,
    pub status: ServerStatus,
}

impl EofPacket {
    pub fn matches(payload: &[u8]) -> bool {
        payload.first() == Some(&HEADER) && payload.len() < 9
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != HEADER {
            return Err(protocol_err!(
                "expected EofPacket (0xFE), got 0x{:02X}",
                header
            ));
        }

        let warnings = buf.get_u16()?;
        let status = ServerStatus::from_bits_truncate(buf.get_u16()?);

        Ok(EofPacket { warnings, status })
    }
}
