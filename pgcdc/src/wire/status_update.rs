use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{code, Error, FromBytes, ToBytes};

/// Sent by the source between `XLogData` messages to let us know it's still
/// alive, and optionally that it wants an immediate status reply.
#[derive(Debug, Clone)]
pub struct KeepAlive {
    pub wal_end: i64,
    pub system_clock: i64,
    pub reply: u8,
}

impl KeepAlive {
    pub fn reply_requested(&self) -> bool {
        self.reply == 1
    }
}

impl FromBytes for KeepAlive {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'k');
        if bytes.remaining() < 17 {
            return Err(Error::Eof);
        }
        Ok(Self {
            wal_end: bytes.get_i64(),
            system_clock: bytes.get_i64(),
            reply: bytes.get_u8(),
        })
    }
}

/// Sent by us to report how far we've applied/flushed/written the stream so
/// the source can recycle WAL segments it no longer needs to retain.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub last_written: i64,
    pub last_flushed: i64,
    pub last_applied: i64,
    pub system_clock: i64,
    pub reply: u8,
}

impl StatusUpdate {
    /// Build a status update reporting `lsn` as fully written, flushed, and
    /// applied. The coordinator only advances the watermark once a commit's
    /// batches are durably flushed, so all three fields carry the same
    /// value.
    pub fn at(lsn: i64, system_clock: i64) -> Self {
        Self {
            last_written: lsn,
            last_flushed: lsn,
            last_applied: lsn,
            system_clock,
            reply: 0,
        }
    }
}

impl ToBytes for StatusUpdate {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut payload = BytesMut::new();
        payload.put_u8(b'r');
        payload.put_i64(self.last_written);
        payload.put_i64(self.last_flushed);
        payload.put_i64(self.last_applied);
        payload.put_i64(self.system_clock);
        payload.put_u8(self.reply);

        Ok(payload.freeze())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_update_at_reports_same_lsn_for_all_three_fields() {
        let update = StatusUpdate::at(100, 4242);
        assert_eq!(update.last_written, 100);
        assert_eq!(update.last_flushed, 100);
        assert_eq!(update.last_applied, 100);
        assert_eq!(update.reply, 0);
    }

    #[test]
    fn status_update_encodes_tag_and_fields_in_order() {
        let update = StatusUpdate::at(256, 1);
        let bytes = update.to_bytes().unwrap();
        assert_eq!(bytes[0], b'r');
        assert_eq!(bytes.len(), 1 + 8 * 4 + 1);
    }

    #[test]
    fn keep_alive_reply_flag() {
        let mut buf = BytesMut::new();
        buf.put_u8(b'k');
        buf.put_i64(10);
        buf.put_i64(20);
        buf.put_u8(1);

        let ka = KeepAlive::from_bytes(buf.freeze()).unwrap();
        assert!(ka.reply_requested());
    }
}
