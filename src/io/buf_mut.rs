use byteorder::{ByteOrder, LittleEndian};

use super::buf::width_of_lenenc;

/// Write-side counterpart of [`super::buf::Buf`]/[`super::buf::BufExt`].
/// Infallible: `Vec<u8>` always has room to grow.
pub trait BufMutExt {
    fn put_u8(&mut self, value: u8);

    fn put_u16(&mut self, value: u16);

    fn put_u24(&mut self, value: u32);

    fn put_u32(&mut self, value: u32);

    fn put_u64(&mut self, value: u64);

    fn put_bytes(&mut self, bytes: &[u8]);

    fn put_str(&mut self, s: &str);

    fn put_str_nul(&mut self, s: &str);

    fn put_uint_lenenc(&mut self, value: u64);

    fn put_bytes_lenenc(&mut self, bytes: &[u8]);

    fn put_str_lenenc(&mut self, s: &str);
}

impl BufMutExt for Vec<u8> {
    fn put_u8(&mut self, value: u8) {
        self.push(value);
    }

    fn put_u16(&mut self, value: u16) {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, value);
        self.extend_from_slice(&buf);
    }

    fn put_u24(&mut self, value: u32) {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.extend_from_slice(&buf[..3]);
    }

    fn put_u32(&mut self, value: u32) {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.extend_from_slice(&buf);
    }

    fn put_u64(&mut self, value: u64) {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, value);
        self.extend_from_slice(&buf);
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }

    fn put_str(&mut self, s: &str) {
        self.extend_from_slice(s.as_bytes());
    }

    fn put_str_nul(&mut self, s: &str) {
        self.extend_from_slice(s.as_bytes());
        self.push(0);
    }

    fn put_uint_lenenc(&mut self, value: u64) {
        match width_of_lenenc(value) {
            1 => self.put_u8(value as u8),
            3 => {
                self.put_u8(0xFC);
                self.put_u16(value as u16);
            }
            4 => {
                self.put_u8(0xFD);
                self.put_u24(value as u32);
            }
            _ => {
                self.put_u8(0xFE);
                self.put_u64(value);
            }
        }
    }

    fn put_bytes_lenenc(&mut self, bytes: &[u8]) {
        self.put_uint_lenenc(bytes.len() as u64);
        self.put_bytes(bytes);
    }

    fn put_str_lenenc(&mut self, s: &str) {
        self.put_bytes_lenenc(s.as_bytes());
    }
}
