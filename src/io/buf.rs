use byteorder::{ByteOrder, LittleEndian};

use crate::error::{protocol_err, Result};

/// Bounds-checked reads over a packet payload. Unlike raw slice indexing,
/// every accessor returns `Err(Error::UnexpectedError(..))` on a truncated
/// buffer instead of panicking -- a malformed or malicious server must never
/// be able to crash the reader thread.
pub trait Buf<'a> {
    fn advance(&mut self, cnt: usize) -> Result<()>;

    fn get_u8(&mut self) -> Result<u8>;

    fn get_u16(&mut self) -> Result<u16>;

    fn get_u24(&mut self) -> Result<u32>;

    fn get_u32(&mut self) -> Result<u32>;

    fn get_u64(&mut self) -> Result<u64>;

    fn get_bytes(&mut self, len: usize) -> Result<&'a [u8]>;

    fn get_str(&mut self, len: usize) -> Result<&'a str>;

    fn get_str_nul(&mut self) -> Result<&'a str>;

    fn get_bytes_nul(&mut self) -> Result<&'a [u8]>;

    fn rest(&mut self) -> Result<&'a [u8]>;

    fn rest_str(&mut self) -> Result<&'a str>;
}

fn need(buf: &[u8], n: usize) -> Result<()> {
    if buf.len() < n {
        return Err(protocol_err!(
            "unexpected end of packet: needed {} bytes, had {}",
            n,
            buf.len()
        ));
    }
    Ok(())
}

impl<'a> Buf<'a> for &'a [u8] {
    fn advance(&mut self, cnt: usize) -> Result<()> {
        need(self, cnt)?;
        *self = &self[cnt..];
        Ok(())
    }

    fn get_u8(&mut self) -> Result<u8> {
        need(self, 1)?;
        let val = self[0];
        *self = &self[1..];
        Ok(val)
    }

    fn get_u16(&mut self) -> Result<u16> {
        need(self, 2)?;
        let val = LittleEndian::read_u16(self);
        *self = &self[2..];
        Ok(val)
    }

    fn get_u24(&mut self) -> Result<u32> {
        need(self, 3)?;
        let val = LittleEndian::read_u24(self);
        *self = &self[3..];
        Ok(val)
    }

    fn get_u32(&mut self) -> Result<u32> {
        need(self, 4)?;
        let val = LittleEndian::read_u32(self);
        *self = &self[4..];
        Ok(val)
    }

    fn get_u64(&mut self) -> Result<u64> {
        need(self, 8)?;
        let val = LittleEndian::read_u64(self);
        *self = &self[8..];
        Ok(val)
    }

    fn get_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        need(self, len)?;
        let (head, tail) = self.split_at(len);
        *self = tail;
        Ok(head)
    }

    fn get_str(&mut self, len: usize) -> Result<&'a str> {
        let bytes = self.get_bytes(len)?;
        std::str::from_utf8(bytes)
            .map_err(|_| protocol_err!("invalid utf-8 in packet payload"))
    }

    fn get_str_nul(&mut self) -> Result<&'a str> {
        let bytes = self.get_bytes_nul()?;
        std::str::from_utf8(bytes)
            .map_err(|_| protocol_err!("invalid utf-8 in nul-terminated string"))
    }

    fn get_bytes_nul(&mut self) -> Result<&'a [u8]> {
        let nul = self
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| protocol_err!("missing nul terminator in packet payload"))?;
        let bytes = self.get_bytes(nul)?;
        self.advance(1)?;
        Ok(bytes)
    }

    fn rest(&mut self) -> Result<&'a [u8]> {
        let all = *self;
        *self = &[];
        Ok(all)
    }

    fn rest_str(&mut self) -> Result<&'a str> {
        let bytes = self.rest()?;
        std::str::from_utf8(bytes)
            .map_err(|_| protocol_err!("invalid utf-8 in packet payload"))
    }
}

/// Length-encoded primitives, the one MySQL-specific extension over plain
/// fixed-width reads. §4.A.
pub trait BufExt<'a> {
    /// Reads a length-encoded integer. The two reserved lead bytes (`0xFB`,
    /// `0xFF`) are rejected explicitly rather than silently truncated or
    /// interpreted as NULL -- NULL detection for row values happens one
    /// layer up, against the raw lead byte, before this is ever called.
    fn get_uint_lenenc(&mut self) -> Result<u64>;

    fn get_str_lenenc(&mut self) -> Result<&'a str>;

    fn get_bytes_lenenc(&mut self) -> Result<&'a [u8]>;
}

/// Number of bytes `encode_uint_lenenc` will use to represent `value`: 1, 3,
/// 4, or 9, matching Testable Property 2.
pub fn width_of_lenenc(value: u64) -> usize {
    if value < 251 {
        1
    } else if value < 65_536 {
        3
    } else if value < 16_777_216 {
        4
    } else {
        9
    }
}

impl<'a> BufExt<'a> for &'a [u8] {
    fn get_uint_lenenc(&mut self) -> Result<u64> {
        match self.get_u8()? {
            0xFB | 0xFF => Err(protocol_err!(
                "reserved lead byte (0xFB/0xFF) encountered in length-encoded integer position"
            )),
            0xFC => Ok(u64::from(self.get_u16()?)),
            0xFD => Ok(u64::from(self.get_u24()?)),
            0xFE => self.get_u64(),
            value => Ok(u64::from(value)),
        }
    }

    fn get_str_lenenc(&mut self) -> Result<&'a str> {
        let len = self.get_uint_lenenc()?;
        self.get_str(len as usize)
    }

    fn get_bytes_lenenc(&mut self) -> Result<&'a [u8]> {
        let len = self.get_uint_lenenc()?;
        self.get_bytes(len as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_reads_fixed_width_integers() {
        let data: &[u8] = &[0x2A, 0x01, 0x00, 0x02, 0x00, 0x00];
        let mut buf = data;
        assert_eq!(buf.get_u8().unwrap(), 0x2A);
        assert_eq!(buf.get_u16().unwrap(), 1);
        assert_eq!(buf.get_u24().unwrap(), 2);
    }

    #[test]
    fn it_rejects_truncated_reads_instead_of_panicking() {
        let data: &[u8] = &[0x01];
        let mut buf = data;
        assert!(buf.get_u32().is_err());
    }

    #[test]
    fn it_reads_nul_terminated_strings() {
        let data: &[u8] = b"hello\x00world";
        let mut buf = data;
        assert_eq!(buf.get_str_nul().unwrap(), "hello");
        assert_eq!(buf.rest_str().unwrap(), "world");
    }

    #[test]
    fn lenenc_width_matches_boundary_table() {
        assert_eq!(width_of_lenenc(0), 1);
        assert_eq!(width_of_lenenc(250), 1);
        assert_eq!(width_of_lenenc(251), 3);
        assert_eq!(width_of_lenenc(65_535), 3);
        assert_eq!(width_of_lenenc(65_536), 4);
        assert_eq!(width_of_lenenc(16_777_215), 4);
        assert_eq!(width_of_lenenc(16_777_216), 9);
        assert_eq!(width_of_lenenc(u64::MAX), 9);
    }

    #[test]
    fn lenenc_int_round_trips_boundary_values() {
        for &value in &[0u64, 250, 251, 65_535, 65_536, 16_777_215, 16_777_216, (1u64 << 63) - 1] {
            let mut buf = Vec::new();
            crate::io::BufMutExt::put_uint_lenenc(&mut buf, value);
            let mut slice = buf.as_slice();
            assert_eq!(slice.get_uint_lenenc().unwrap(), value);
        }
    }

    #[test]
    fn lenenc_int_rejects_reserved_lead_bytes() {
        let mut buf: &[u8] = &[0xFF];
        assert!(buf.get_uint_lenenc().is_err());

        let mut buf: &[u8] = &[0xFB];
        assert!(buf.get_uint_lenenc().is_err());
    }
}
