use crate::protocol::Capabilities;

/// The facts established once, during the handshake, and fixed for the
/// lifetime of the channel (§4.D "Connection descriptor").
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    pub connection_id: u32,
    pub server_version: Box<str>,
    pub server_default_charset: u8,
    pub capabilities: Capabilities,
    pub session_charset: u8,
    pub database: Option<Box<str>>,
}
