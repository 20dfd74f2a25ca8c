//! Unwraps the `CopyBoth` byte stream into `XLogData`/keepalive frames and
//! decodes the `pgoutput` message carried inside each `XLogData` frame.

use async_trait::async_trait;
use bytes::{Buf, Bytes};

use crate::error::Error;
use crate::lsn::Lsn;
use crate::source::ReplicationStream as RawStream;
use crate::wire::{self, FromBytes, KeepAlive, Message, StatusUpdate, ToBytes};

/// One frame off the replication stream, with the server's start-of-WAL
/// position already peeled out of the `XLogData` envelope.
pub enum Frame {
    Data { wal_start: Lsn, message: Message },
    KeepAlive(KeepAlive),
}

/// The coordinator's view of the replication connection: read the next
/// frame, report progress back. A trait rather than a concrete type so
/// tests can drive the coordinator against an in-memory stand-in instead of
/// a live `CopyBoth` duplex.
#[async_trait]
pub trait StreamSource: Send {
    async fn recv(&mut self) -> Result<Option<Frame>, Error>;
    async fn send_status(&mut self, lsn: Lsn, system_clock: i64, reply: bool) -> Result<(), Error>;
}

/// Wraps the raw `CopyBoth` duplex, presenting typed frames instead of bare
/// `CopyData` bytes.
pub struct StreamConsumer {
    raw: RawStream,
}

impl StreamConsumer {
    pub fn new(raw: RawStream) -> Self {
        Self { raw }
    }

    /// Read and decode the next frame. `None` means the source closed the
    /// stream.
    async fn recv_inner(&mut self) -> Result<Option<Frame>, Error> {
        let Some(mut bytes) = self.raw.recv().await? else {
            return Ok(None);
        };

        if !bytes.has_remaining() {
            return Err(Error::Decode(wire::Error::Eof));
        }

        let tag = bytes[0] as char;
        match tag {
            'w' => {
                bytes.advance(1);
                if bytes.remaining() < 16 {
                    return Err(Error::Decode(wire::Error::Eof));
                }
                let wal_start = bytes.get_i64() as u64;
                let _wal_end = bytes.get_i64();
                let message = Message::from_bytes(bytes)?;
                Ok(Some(Frame::Data {
                    wal_start: Lsn::from_u64(wal_start),
                    message,
                }))
            }
            'k' => Ok(Some(Frame::KeepAlive(KeepAlive::from_bytes(bytes)?))),
            c => Err(Error::Decode(wire::Error::UnknownMessage(c))),
        }
    }

    /// Report `lsn` as written/flushed/applied. `reply` requests an
    /// immediate keepalive back, used when replying to a keepalive that
    /// asked for one.
    async fn send_status_inner(&mut self, lsn: Lsn, system_clock: i64, reply: bool) -> Result<(), Error> {
        let mut update = StatusUpdate::at(lsn.as_u64() as i64, system_clock);
        update.reply = reply as u8;
        let payload = update.to_bytes()?;
        self.raw.send(payload).await
    }
}

#[async_trait]
impl StreamSource for StreamConsumer {
    async fn recv(&mut self) -> Result<Option<Frame>, Error> {
        self.recv_inner().await
    }

    async fn send_status(&mut self, lsn: Lsn, system_clock: i64, reply: bool) -> Result<(), Error> {
        self.send_status_inner(lsn, system_clock, reply).await
    }
}
