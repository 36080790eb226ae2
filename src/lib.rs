//! A blocking, thread-based MySQL wire-protocol engine and connection pool.
//!
//! This crate implements the text subset of the MySQL Client/Server
//! Protocol (5.5+) and the bounded connection pool that multiplexes callers
//! over it: packet framing and wire primitives ([`io`]), typed protocol
//! messages ([`protocol`]), the command abstraction that drives a single
//! request/response exchange ([`command`]), the per-connection channel
//! that owns a socket and a background reader thread ([`channel`]), and the
//! pool that leases channels out, sweeps leaked ones, and cancels timed-out
//! queries with an out-of-band `KILL` ([`pool`]).
//!
//! Prepared statements, TLS, authentication plugins other than
//! `mysql_native_password`, and multi-statement/multi-result responses are
//! out of scope; callers requesting them receive
//! [`Error::UnsupportedFeature`].

pub mod channel;
pub mod command;
pub mod config;
pub mod counters;
pub mod error;
pub mod io;
pub mod pool;
pub mod protocol;

pub use channel::Channel;
pub use command::{Command, Outcome};
pub use config::{ChannelConfig, PoolConfig};
pub use counters::Counters;
pub use error::{Error, Result};
pub use pool::{Lease, Pool};
