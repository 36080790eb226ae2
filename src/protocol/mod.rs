//! Typed views over packet payloads (§4.B).

mod auth;
mod capabilities;
mod classify;
mod column_def;
mod column_count;
pub(crate) mod eof;
pub(crate) mod err;
mod field;
mod handshake;
mod handshake_response;
pub(crate) mod ok;
mod row;
mod status;
mod type_id;

pub use auth::{scramble_native_password, AuthPlugin};
pub use capabilities::Capabilities;
pub use classify::{ResponsePacket, LOCAL_INFILE_HEADER};
pub use column_count::ColumnCount;
pub use column_def::ColumnDefinition;
pub use eof::EofPacket;
pub use err::ErrPacket;
pub use field::FieldFlags;
pub use handshake::HandshakeV10;
pub use handshake_response::HandshakeResponse41;
pub use ok::OkPacket;
pub use row::TextRow;
pub use status::ServerStatus;
pub use type_id::TypeId;
