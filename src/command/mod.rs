//! Command abstraction (§4.C): a uniform request/response contract that the
//! connection channel drives without knowing the specifics of any one
//! command variant.

mod init_db;
mod kill;
mod ping;
mod query;
mod quit;

pub use init_db::InitDatabaseCommand;
pub use kill::KillCommand;
pub use ping::PingCommand;
pub use query::QueryCommand;
pub use quit::QuitCommand;

use crate::error::Result;
use crate::io::Packet;
use crate::protocol::{ColumnDefinition, ServerStatus, TextRow};

/// What a command produced once its completion predicate fired. A server
/// `ErrPacket` never reaches here -- it surfaces as `Err` from `finish`.
#[derive(Debug)]
pub enum Outcome {
    /// A non-SELECT command completed: DDL, DML, `PING`, `KILL`, `USE`.
    Done {
        affected_rows: u64,
        last_insert_id: u64,
        status: ServerStatus,
    },
    /// A SELECT-shaped command completed with a fully materialized result
    /// set (§3 "Row buffer": streaming is a non-goal).
    ResultSet {
        columns: Vec<ColumnDefinition>,
        rows: Vec<TextRow>,
        status: ServerStatus,
    },
    /// `QuitCommand`: the request was flushed and the server will not
    /// respond at all. The channel transitions straight to `Closed`.
    Quit,
}

/// Implemented by every command variant named in §4.C. A channel installs
/// exactly one non-completed command at a time (§3 "Command" invariant) and
/// drives it by calling `accept` for every inbound packet in arrival order.
pub trait Command: Send {
    /// The request payload (including its leading command-code byte) to
    /// write as the single outbound packet.
    fn request(&self) -> Vec<u8>;

    /// Feed one inbound packet to the command's completion predicate.
    /// Returns `Ok(true)` the instant the command becomes terminal; any
    /// packet delivered after that is a protocol error the channel must
    /// treat as fatal. Returns `Err` on a protocol-level decode failure
    /// (this also breaks the channel) -- a server `ErrPacket` is not such a
    /// failure; it is recorded and surfaced later from `finish`.
    fn accept(&mut self, packet: &Packet) -> Result<bool>;

    /// Consumes the command once `accept` has returned `Ok(true)`,
    /// producing either its outcome or the `MysqlError`/`DuplicateEntryForKey`
    /// recorded from a server `ErrPacket`.
    fn finish(self: Box<Self>) -> Result<Outcome>;
}

/// `COM_QUERY` = 0x03, `COM_QUIT` = 0x01, `COM_INIT_DB` = 0x02,
/// `COM_PING` = 0x0E. Named here since every command module references at
/// least one.
pub mod op {
    pub const QUIT: u8 = 0x01;
    pub const INIT_DB: u8 = 0x02;
    pub const QUERY: u8 = 0x03;
    pub const PING: u8 = 0x0E;
}
