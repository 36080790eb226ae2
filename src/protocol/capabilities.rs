// https://dev.mysql.com/doc/dev/mysql-server/latest/group__group__cs__capabilities__flags.html
bitflags::bitflags! {
    /// The 32-bit capability flag set negotiated at handshake (§3
    /// "Capability set"). Only the bits this core actually inspects are
    /// named; unrecognized bits still round-trip through `bits()`/
    /// `from_bits_truncate` untouched.
    pub struct Capabilities: u32 {
        const LONG_PASSWORD = 1;
        const FOUND_ROWS = 2;
        const LONG_FLAG = 4;
        const CONNECT_WITH_DB = 8;
        const NO_SCHEMA = 16;
        const COMPRESS = 32;
        const ODBC = 64;
        const LOCAL_FILES = 128;
        const IGNORE_SPACE = 256;
        const PROTOCOL_41 = 512;
        const INTERACTIVE = 1024;
        const SSL = 2048;
        const IGNORE_SIGPIPE = 4096;
        const TRANSACTIONS = 8192;
        const RESERVED2 = 16384;
        const SECURE_CONNECTION = 16384;
        const MULTI_STATEMENTS = 1 << 16;
        const MULTI_RESULTS = 1 << 17;
        const PS_MULTI_RESULTS = 1 << 18;
        const PLUGIN_AUTH = 1 << 19;
        const CONNECT_ATTRS = 1 << 20;
        const PLUGIN_AUTH_LENENC_CLIENT_DATA = 1 << 21;
        const CAN_HANDLE_EXPIRED_PASSWORDS = 1 << 22;
        const SESSION_TRACK = 1 << 23;
        const DEPRECATE_EOF = 1 << 24;
    }
}

impl Capabilities {
    /// The bits that MUST all be present in the server's advertised set, or
    /// handshake fails (§3, Testable Property 3). `SECURE_CONNECTION` and
    /// `RESERVED2` share bit 14, matching the spec's `SECURE_CONNECTION/
    /// RESERVED2` pairing.
    pub fn required() -> Capabilities {
        Capabilities::PROTOCOL_41 | Capabilities::PLUGIN_AUTH | Capabilities::SECURE_CONNECTION
    }

    /// Resolves the negotiated set for a handshake: the server's advertised
    /// bits ANDed with the client's desired bits, unioned with the required
    /// bits that are present on the server (since `REQUIRED` bits the client
    /// always wants regardless of its own desired set). Returns `None` if
    /// any `REQUIRED` bit is missing from the server's advertised set.
    pub fn resolve(server: Capabilities, desired: Capabilities) -> Option<Capabilities> {
        if !server.contains(Capabilities::required()) {
            return None;
        }
        Some(server & (desired | Capabilities::required()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_server_and_desired_union_required() {
        let server = Capabilities::required() | Capabilities::FOUND_ROWS | Capabilities::DEPRECATE_EOF;
        let desired = Capabilities::FOUND_ROWS;
        let resolved = Capabilities::resolve(server, desired).unwrap();
        assert!(resolved.contains(Capabilities::required()));
        assert!(resolved.contains(Capabilities::FOUND_ROWS));
        assert!(!resolved.contains(Capabilities::DEPRECATE_EOF));
    }

    #[test]
    fn resolve_fails_when_server_missing_a_required_bit() {
        let server = Capabilities::PROTOCOL_41 | Capabilities::PLUGIN_AUTH;
        let desired = Capabilities::empty();
        assert!(Capabilities::resolve(server, desired).is_none());
    }
}
