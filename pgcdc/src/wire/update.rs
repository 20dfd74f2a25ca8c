use bytes::{Buf, Bytes};

use super::{code, Error, FromBytes, TupleData};

#[derive(Debug, Clone)]
pub struct Update {
    pub oid: i32,
    /// Present when the source replica identity is `default` and the key
    /// columns changed. We require `full` identity for configured tables,
    /// so in practice this is always `None` for those.
    pub key: Option<TupleData>,
    /// Present when the source replica identity is `full`: the complete
    /// pre-image of the row before the update.
    pub old: Option<TupleData>,
    pub new: TupleData,
}

impl FromBytes for Update {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'U');
        if bytes.remaining() < 5 {
            return Err(Error::Eof);
        }
        let oid = bytes.get_i32();
        let identifier = bytes.get_u8() as char;

        let mut key = None;
        let mut old = None;

        let new = match identifier {
            'K' => {
                key = Some(TupleData::from_buffer(&mut bytes)?);
                code!(bytes, 'N');
                TupleData::from_buffer(&mut bytes)?
            }
            'O' => {
                old = Some(TupleData::from_buffer(&mut bytes)?);
                code!(bytes, 'N');
                TupleData::from_buffer(&mut bytes)?
            }
            'N' => TupleData::from_buffer(&mut bytes)?,
            c => {
                return Err(Error::UnexpectedTag {
                    expected: 'N',
                    got: c,
                })
            }
        };

        Ok(Self {
            oid,
            key,
            old,
            new,
        })
    }
}
