use crate::error::{protocol_err, Result};
use crate::io::Packet;
use crate::protocol::{eof, err, ok, Capabilities, ErrPacket, EofPacket, OkPacket};

pub const LOCAL_INFILE_HEADER: u8 = 0xFB;

/// A response packet classified by its lead byte, the priority order from
/// §4.B "Classification rules".
#[derive(Debug)]
pub enum ResponsePacket {
    Error(ErrPacket),
    Ok(OkPacket),
    Eof,
    LocalInfile,
    /// Not one of the well-known envelopes; the caller (a `Command`) decides
    /// what it means in context (column count, column definition, row).
    Other,
}

impl ResponsePacket {
    pub fn classify(packet: &Packet, capabilities: Capabilities) -> Result<Self> {
        let payload = &*packet.payload;

        match payload.first() {
            Some(&err::HEADER) => Ok(ResponsePacket::Error(ErrPacket::decode(
                payload,
                capabilities,
            )?)),
            Some(&ok::HEADER) if OkPacket::matches(payload) => {
                Ok(ResponsePacket::Ok(OkPacket::decode(payload)?))
            }
            Some(&eof::HEADER) if EofPacket::matches(payload) => Ok(ResponsePacket::Eof),
            Some(&LOCAL_INFILE_HEADER) => Ok(ResponsePacket::LocalInfile),
            Some(_) => Ok(ResponsePacket::Other),
            None => Err(protocol_err!("received an empty packet payload")),
        }
    }
}
