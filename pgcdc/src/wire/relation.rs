use bytes::{Buf, Bytes};

use super::{c_string_buf, code, Error, FromBytes};

#[derive(Debug, Clone)]
pub struct Relation {
    pub oid: i32,
    pub namespace: String,
    pub name: String,
    pub replica_identity: i8,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub flag: i8,
    pub name: String,
    pub type_oid: i32,
    pub type_modifier: i32,
}

impl Column {
    /// Part of the source's replica identity (e.g. primary key).
    pub fn is_identity(&self) -> bool {
        self.flag & 1 == 1
    }
}

impl FromBytes for Relation {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'R');
        let oid = bytes.get_i32();
        let namespace = c_string_buf(&mut bytes)?;
        let name = c_string_buf(&mut bytes)?;
        let replica_identity = bytes.get_i8();
        let num_columns = bytes.get_i16();

        let mut columns = Vec::with_capacity(num_columns.max(0) as usize);
        for _ in 0..num_columns {
            let flag = bytes.get_i8();
            let name = c_string_buf(&mut bytes)?;
            let type_oid = bytes.get_i32();
            let type_modifier = bytes.get_i32();

            columns.push(Column {
                flag,
                name,
                type_oid,
                type_modifier,
            });
        }

        Ok(Self {
            oid,
            namespace,
            name,
            replica_identity,
            columns,
        })
    }
}
