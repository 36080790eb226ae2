use crate::error::{protocol_err, Result};
use crate::io::{Buf, BufExt};
use crate::protocol::{AuthPlugin, Capabilities, ServerStatus};

/// Handshake V10, server -> client (§4.B).
#[derive(Debug)]
pub struct HandshakeV10 {
    pub protocol_version: u8,
    pub server_version: Box<str>,
    pub connection_id: u32,
    pub auth_seed: Vec<u8>,
    pub server_capabilities: Capabilities,
    pub server_default_charset: u8,
    pub status: ServerStatus,
    pub auth_plugin: AuthPlugin,
}

impl HandshakeV10 {
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        let protocol_version = buf.get_u8()?;
        if protocol_version != 10 {
            return Err(protocol_err!(
                "unsupported handshake protocol version {} (only 10 is supported)",
                protocol_version
            ));
        }

        let server_version = buf.get_str_nul()?.into();
        let connection_id = buf.get_u32()?;

        let mut seed = Vec::with_capacity(20);
        seed.extend_from_slice(buf.get_bytes(8)?);
        buf.advance(1)?; // filler

        let caps_low = buf.get_u16()?;
        let mut capabilities = Capabilities::from_bits_truncate(u32::from(caps_low));

        let server_default_charset = buf.get_u8()?;
        let status = ServerStatus::from_bits_truncate(buf.get_u16()?);

        let caps_high = buf.get_u16()?;
        capabilities |= Capabilities::from_bits_truncate((u32::from(caps_high)) << 16);

        let auth_plugin_data_len = if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            buf.get_u8()?
        } else {
            buf.advance(1)?;
            0
        };

        buf.advance(10)?; // reserved

        if capabilities.contains(Capabilities::SECURE_CONNECTION) {
            let remaining = ((auth_plugin_data_len as i32) - 8).max(13) as usize;
            // the last byte of the seed region is a NUL terminator, not seed data
            let bytes = buf.get_bytes(remaining)?;
            seed.extend_from_slice(&bytes[..bytes.len().saturating_sub(1)]);
        }

        let auth_plugin = if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            AuthPlugin::from_name(buf.get_str_nul()?)
        } else {
            AuthPlugin::Other
        };

        Ok(HandshakeV10 {
            protocol_version,
            server_version,
            connection_id,
            auth_seed: seed,
            server_capabilities: capabilities,
            server_default_charset,
            status,
            auth_plugin,
        })
    }
}
