use bytes::{Buf, Bytes};

use super::{code, Error, FromBytes};

#[derive(Debug, Clone)]
pub struct Commit {
    pub flags: i8,
    pub commit_lsn: i64,
    pub end_lsn: i64,
    pub commit_timestamp: i64,
}

impl FromBytes for Commit {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'C');
        if bytes.remaining() < 25 {
            return Err(Error::Eof);
        }
        Ok(Self {
            flags: bytes.get_i8(),
            commit_lsn: bytes.get_i64(),
            end_lsn: bytes.get_i64(),
            commit_timestamp: bytes.get_i64(),
        })
    }
}
