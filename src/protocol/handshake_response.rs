use crate::io::BufMutExt;
use crate::protocol::Capabilities;

/// Handshake Response 41, client -> server (§4.B). Encoded with a resolved
/// capability set, never the raw desired set (§4.D "Handshake detail").
#[derive(Debug)]
pub struct HandshakeResponse41<'a> {
    pub capabilities: Capabilities,
    pub max_packet_size: u32,
    pub charset: u8,
    pub username: &'a str,
    pub auth_response: &'a [u8],
    pub database: Option<&'a str>,
    pub auth_plugin_name: &'a str,
    pub connect_attrs: &'a [(&'a str, &'a str)],
}

impl HandshakeResponse41<'_> {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.put_u32(self.capabilities.bits());
        buf.put_u32(self.max_packet_size);
        buf.put_u8(self.charset);
        buf.put_bytes(&[0u8; 23]);

        buf.put_str_nul(self.username);

        if self.capabilities.contains(Capabilities::PLUGIN_AUTH_LENENC_CLIENT_DATA) {
            buf.put_bytes_lenenc(self.auth_response);
        } else {
            buf.put_u8(self.auth_response.len() as u8);
            buf.put_bytes(self.auth_response);
        }

        if self.capabilities.contains(Capabilities::CONNECT_WITH_DB) {
            buf.put_str_nul(self.database.unwrap_or(""));
        }

        if self.capabilities.contains(Capabilities::PLUGIN_AUTH) {
            buf.put_str_nul(self.auth_plugin_name);
        }

        if self.capabilities.contains(Capabilities::CONNECT_ATTRS) {
            let mut attrs_buf = Vec::new();
            for (key, value) in self.connect_attrs {
                attrs_buf.put_str_lenenc(key);
                attrs_buf.put_str_lenenc(value);
            }
            buf.put_bytes_lenenc(&attrs_buf);
        }
    }
}
