use bytes::{Buf, Bytes};

use super::{code, Error, FromBytes, TupleData};

#[derive(Debug, Clone)]
pub struct Delete {
    pub oid: i32,
    pub key: Option<TupleData>,
    pub old: Option<TupleData>,
}

impl Delete {
    /// The pre-image that survived decoding, whichever of `key`/`old` the
    /// source actually sent.
    pub fn key_non_null(&self) -> Option<&TupleData> {
        self.old.as_ref().or(self.key.as_ref())
    }
}

impl FromBytes for Delete {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'D');
        if bytes.remaining() < 5 {
            return Err(Error::Eof);
        }
        let oid = bytes.get_i32();
        let identifier = bytes.get_u8() as char;

        let (key, old) = match identifier {
            'K' => (Some(TupleData::from_buffer(&mut bytes)?), None),
            'O' => (None, Some(TupleData::from_buffer(&mut bytes)?)),
            c => {
                return Err(Error::UnexpectedTag {
                    expected: 'O',
                    got: c,
                })
            }
        };

        Ok(Self { oid, key, old })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::tuple_data::Cell;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn decodes_delete_with_old_image() {
        let mut buf = BytesMut::new();
        buf.put_u8(b'D');
        buf.put_i32(7);
        buf.put_u8(b'O');
        buf.put_i16(1);
        buf.put_u8(b't');
        buf.put_i32(1);
        buf.extend_from_slice(b"x");

        let delete = Delete::from_bytes(buf.freeze()).unwrap();
        assert_eq!(delete.oid, 7);
        assert_eq!(
            delete.key_non_null().unwrap().columns,
            vec![Cell::Text("x".into())]
        );
    }
}
