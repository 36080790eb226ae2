use crate::error::{protocol_err, Error, Result};
use crate::io::Buf;
use crate::protocol::Capabilities;

pub const HEADER: u8 = 0xFF;

/// `ErrPacket` (§4.B). Fatal for the current command only; the channel it
/// arrives on stays `Ready` afterward.
#[derive(Debug)]
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: Box<str>,
    pub error_message: Box<str>,
}

impl ErrPacket {
    pub fn decode(mut buf: &[u8], capabilities: Capabilities) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != HEADER {
            return Err(protocol_err!(
                "expected ErrPacket (0xFF), got 0x{:02X}",
                header
            ));
        }

        let error_code = buf.get_u16()?;

        let sql_state = if capabilities.contains(Capabilities::PROTOCOL_41) {
            buf.advance(1)?; // '#' marker
            buf.get_str(5)?.into()
        } else {
            "".into()
        };

        let error_message = buf.rest_str()?.into();

        Ok(ErrPacket {
            error_code,
            sql_state,
            error_message,
        })
    }

    pub fn into_error(self) -> Error {
        Error::from_err_packet(self.error_code, self.sql_state, self.error_message)
    }
}
