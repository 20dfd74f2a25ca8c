//! Decoder for the `pgoutput` logical-decoding message stream.
//!
//! Each message starts with a single-byte tag identifying its kind, followed
//! by a fixed or length-prefixed payload. This module turns those bytes into
//! the typed [`Message`] variants the coordinator operates on; it does not
//! know anything about transactions, tables, or destinations.

pub mod begin;
pub mod commit;
pub mod delete;
pub mod insert;
pub mod relation;
pub mod status_update;
pub mod truncate;
pub mod tuple_data;
pub mod update;

pub use begin::Begin;
pub use commit::Commit;
pub use delete::Delete;
pub use insert::Insert;
pub use relation::{Column, Relation};
pub use status_update::{KeepAlive, StatusUpdate};
pub use truncate::Truncate;
pub use tuple_data::{Cell, TupleData};
pub use update::Update;

use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("expected tag '{expected}', got '{got}'")]
    UnexpectedTag { expected: char, got: char },

    #[error("unexpected end of message")]
    Eof,

    #[error("message is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("unknown logical message tag '{0}'")]
    UnknownMessage(char),

    #[error("unknown tuple data column kind '{0}'")]
    UnknownColumnKind(char),
}

/// Decode a type from the tail of a `pgoutput` message.
pub trait FromBytes: Sized {
    fn from_bytes(bytes: Bytes) -> Result<Self, Error>;
}

/// Encode a type into the body of a message we send back to the source
/// (only feedback/status messages flow this direction).
pub trait ToBytes {
    fn to_bytes(&self) -> Result<Bytes, Error>;
}

/// Assert the next byte of `$bytes` equals the tag `$c`, consuming it.
macro_rules! code {
    ($bytes:expr, $c:expr) => {{
        use bytes::Buf;
        if !$bytes.has_remaining() {
            return Err($crate::wire::Error::Eof);
        }
        let got = $bytes.get_u8() as char;
        if got != $c {
            return Err($crate::wire::Error::UnexpectedTag {
                expected: $c,
                got,
            });
        }
    }};
}
pub(crate) use code;

/// Read a null-terminated string out of `bytes`, advancing past the
/// terminator.
pub(crate) fn c_string_buf(bytes: &mut Bytes) -> Result<String, Error> {
    use bytes::Buf;
    let mut raw = Vec::new();
    loop {
        if !bytes.has_remaining() {
            return Err(Error::Eof);
        }
        let b = bytes.get_u8();
        if b == 0 {
            break;
        }
        raw.push(b);
    }
    Ok(std::str::from_utf8(&raw)?.to_string())
}

/// One decoded `pgoutput` message, tagged with the LSN the stream consumer
/// observed it at (the `XLogData` wrapper's `wal_start`, not a field of the
/// message body itself).
#[derive(Debug, Clone)]
pub enum Message {
    Relation(Relation),
    Begin(Begin),
    Commit(Commit),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Truncate(Truncate),
    /// `O` — replication origin. Passed through as a no-op.
    Origin,
    /// `Y` — composite/enum type announcement. Passed through as a no-op.
    Type,
}

impl FromBytes for Message {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        use bytes::Buf;
        if !bytes.has_remaining() {
            return Err(Error::Eof);
        }
        let tag = bytes[0] as char;
        Ok(match tag {
            'R' => Self::Relation(Relation::from_bytes(bytes)?),
            'B' => Self::Begin(Begin::from_bytes(bytes)?),
            'C' => Self::Commit(Commit::from_bytes(bytes)?),
            'I' => Self::Insert(Insert::from_bytes(bytes)?),
            'U' => Self::Update(Update::from_bytes(bytes)?),
            'D' => Self::Delete(Delete::from_bytes(bytes)?),
            'T' => Self::Truncate(Truncate::from_bytes(bytes)?),
            'O' => {
                bytes.advance(1);
                Self::Origin
            }
            'Y' => {
                bytes.advance(1);
                Self::Type
            }
            c => return Err(Error::UnknownMessage(c)),
        })
    }
}
