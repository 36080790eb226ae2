//! Error and Result types.

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::io;

/// A specialized `Result` type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The taxonomy from the error-handling design: every failure a caller can
/// observe falls into exactly one of these kinds.
#[derive(Debug)]
pub enum Error {
    /// The server returned an `ErrPacket` for the current command. The channel
    /// that produced this error stays `Ready`.
    MysqlError {
        code: u16,
        sql_state: Box<str>,
        message: Box<str>,
    },

    /// The channel is broken, the pool is closed, or a command was abandoned
    /// mid-wait. Never leaves the issuing channel in a usable state.
    IllegalState(Box<str>),

    /// The deadline elapsed before the command's completion predicate fired.
    Timeout,

    /// The caller supplied a malformed parameter (bad index, bad SQL, bad
    /// connection string). No channel side effect.
    InvalidParameter(Box<str>),

    /// Result traversal violated an invariant: bad column index, a type
    /// mismatch, or similar caller-facing misuse of a materialized result set.
    ResultSetError(Box<str>),

    /// Anything else: a protocol desync, an unparseable packet, an assertion
    /// that should be unreachable given a well-behaved server. The owning
    /// channel is broken.
    UnexpectedError(Box<str>),

    /// Soft error: a command's wall-clock time exceeded the configured slow
    /// query threshold. Observational only; never returned to a caller as a
    /// hard failure, only emitted as a counter/event.
    SlowExecution,

    /// The server rejected the statement with a duplicate-key violation
    /// (MySQL error code 1062).
    DuplicateEntryForKey { message: Box<str> },

    /// The caller asked for functionality this core does not implement
    /// (prepared statements, LOCAL INFILE, multi-statements, SSL, ...). The
    /// request was well-formed; the core simply declines.
    UnsupportedFeature(&'static str),

    /// Low-level I/O failure on the connection's socket.
    Io(io::Error),

    /// Connection string failed to parse as a URL.
    UrlParse(url::ParseError),
}

impl Error {
    pub(crate) fn protocol(message: impl Into<Box<str>>) -> Self {
        Error::UnexpectedError(message.into())
    }

    pub(crate) fn illegal_state(message: impl Into<Box<str>>) -> Self {
        Error::IllegalState(message.into())
    }

    /// Classify a server `ErrPacket` into either `DuplicateEntryForKey` (code
    /// 1062) or the general `MysqlError` kind (§9 Open Questions: SQL-state
    /// `23000` is shared with other integrity violations, so the code is the
    /// only reliable discriminant).
    pub(crate) fn from_err_packet(code: u16, sql_state: Box<str>, message: Box<str>) -> Self {
        if code == 1062 {
            Error::DuplicateEntryForKey { message }
        } else {
            Error::MysqlError {
                code,
                sql_state,
                message,
            }
        }
    }

    /// True if this error kind means the connection it came from is no
    /// longer usable and must be dropped from the pool.
    pub fn breaks_channel(&self) -> bool {
        matches!(
            self,
            Error::IllegalState(_) | Error::UnexpectedError(_) | Error::Io(_) | Error::Timeout
        )
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(error) => Some(error),
            Error::UrlParse(error) => Some(error),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MysqlError {
                code,
                sql_state,
                message,
            } => write!(f, "{} ({}): {}", code, sql_state, message),

            Error::IllegalState(message) => write!(f, "illegal state: {}", message),

            Error::Timeout => f.write_str("timed out waiting for command completion"),

            Error::InvalidParameter(message) => write!(f, "invalid parameter: {}", message),

            Error::ResultSetError(message) => write!(f, "result set error: {}", message),

            Error::UnexpectedError(message) => write!(f, "unexpected protocol error: {}", message),

            Error::SlowExecution => f.write_str("query exceeded the slow-execution threshold"),

            Error::DuplicateEntryForKey { message } => {
                write!(f, "duplicate entry for key: {}", message)
            }

            Error::UnsupportedFeature(feature) => {
                write!(f, "unsupported feature: {}", feature)
            }

            Error::Io(error) => write!(f, "{}", error),

            Error::UrlParse(error) => write!(f, "{}", error),
        }
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<io::ErrorKind> for Error {
    #[inline]
    fn from(err: io::ErrorKind) -> Self {
        Error::Io(err.into())
    }
}

impl From<url::ParseError> for Error {
    #[inline]
    fn from(err: url::ParseError) -> Self {
        Error::UrlParse(err)
    }
}

/// Shorthand for building a protocol-desync error with a formatted message.
/// Used at every decode/framing call site across `io`, `protocol`, `command`,
/// and `channel` instead of spelling out `Error::protocol(format!(...))`.
macro_rules! protocol_err {
    ($($arg:tt)*) => {
        $crate::error::Error::protocol(format!($($arg)*))
    };
}

pub(crate) use protocol_err;
