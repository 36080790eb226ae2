// https://dev.mysql.com/doc/dev/mysql-server/latest/group__group__cs__column__definition__flags.html
bitflags::bitflags! {
    /// Column-definition flags (§4.B "Column definition").
    pub struct FieldFlags: u16 {
        const NOT_NULL = 1;
        const PRIMARY_KEY = 2;
        const UNIQUE_KEY = 4;
        const MULTIPLE_KEY = 8;
        const BLOB = 16;
        const UNSIGNED = 32;
        const ZEROFILL = 64;
        const BINARY = 128;
        const ENUM = 256;
        const AUTO_INCREMENT = 512;
        const TIMESTAMP = 1024;
        const SET = 2048;
    }
}
