//! Packet codec: the wire primitives (§4.A) and packet framing used by
//! everything above it.

mod buf;
mod buf_mut;
mod packet;

pub use buf::{width_of_lenenc, Buf, BufExt};
pub use buf_mut::BufMutExt;
pub use packet::{Packet, PacketReader, PacketWriter, SequenceCounter, MAX_PAYLOAD_LEN};
