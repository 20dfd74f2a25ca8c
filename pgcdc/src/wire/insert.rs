use bytes::{Buf, Bytes};

use super::{code, Error, FromBytes, TupleData};

#[derive(Debug, Clone)]
pub struct Insert {
    pub oid: i32,
    pub new: TupleData,
}

impl FromBytes for Insert {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'I');
        if bytes.remaining() < 4 {
            return Err(Error::Eof);
        }
        let oid = bytes.get_i32();
        code!(bytes, 'N');
        let new = TupleData::from_buffer(&mut bytes)?;

        Ok(Self { oid, new })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::tuple_data::Cell;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn decodes_insert() {
        let mut buf = BytesMut::new();
        buf.put_u8(b'I');
        buf.put_i32(7);
        buf.put_u8(b'N');
        buf.put_i16(1);
        buf.put_u8(b't');
        buf.put_i32(1);
        buf.extend_from_slice(b"a");

        let insert = Insert::from_bytes(buf.freeze()).unwrap();
        assert_eq!(insert.oid, 7);
        assert_eq!(insert.new.columns, vec![Cell::Text("a".into())]);
    }
}
