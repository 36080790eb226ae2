// https://dev.mysql.com/doc/dev/mysql-server/latest/mysql__com_8h.html
bitflags::bitflags! {
    /// The 16-bit server-status snapshot accompanying every OK/EOF packet
    /// (§3 "Server-status snapshot").
    pub struct ServerStatus: u16 {
        const AUTOCOMMIT = 2;
        const IN_TRANSACTION = 1;
        const MORE_RESULTS_EXISTS = 8;
        const NO_GOOD_INDEX_USED = 16;
        const NO_INDEX_USED = 32;
        const CURSOR_EXISTS = 64;
        const LAST_ROW_SENT = 128;
        const DB_DROPPED = 256;
        const NO_BACKSLASH_ESCAPES = 512;
        const METADATA_CHANGED = 1024;
        const QUERY_WAS_SLOW = 2048;
        const PS_OUT_PARAMS = 4096;
        const IN_READONLY_TRANSACTION = 8192;
        const SESSION_STATE_CHANGED = 16384;
    }
}
