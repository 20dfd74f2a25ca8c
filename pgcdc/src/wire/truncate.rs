use bytes::{Buf, Bytes};

use super::{code, Error, FromBytes};

#[derive(Debug, Clone)]
pub struct Truncate {
    pub options: i8,
    pub oids: Vec<i32>,
}

impl FromBytes for Truncate {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'T');
        if bytes.remaining() < 5 {
            return Err(Error::Eof);
        }
        let num_relations = bytes.get_i32();
        let options = bytes.get_i8();
        let mut oids = Vec::with_capacity(num_relations.max(0) as usize);
        for _ in 0..num_relations {
            oids.push(bytes.get_i32());
        }

        Ok(Self { options, oids })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn decodes_truncate_with_multiple_relations() {
        let mut buf = BytesMut::new();
        buf.put_u8(b'T');
        buf.put_i32(2);
        buf.put_i8(0);
        buf.put_i32(7);
        buf.put_i32(8);

        let truncate = Truncate::from_bytes(buf.freeze()).unwrap();
        assert_eq!(truncate.oids, vec![7, 8]);
    }
}
