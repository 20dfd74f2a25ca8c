use bytes::{Buf, Bytes};

use super::{code, Error, FromBytes};

#[derive(Debug, Clone)]
pub struct Begin {
    /// LSN of the commit that will end this transaction.
    pub final_lsn: i64,
    pub commit_timestamp: i64,
    pub xid: i32,
}

impl FromBytes for Begin {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'B');
        if bytes.remaining() < 20 {
            return Err(Error::Eof);
        }
        Ok(Self {
            final_lsn: bytes.get_i64(),
            commit_timestamp: bytes.get_i64(),
            xid: bytes.get_i32(),
        })
    }
}
