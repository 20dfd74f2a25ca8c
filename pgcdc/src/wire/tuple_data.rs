use bytes::{Buf, Bytes};

use super::Error;

/// One column value as sent by `pgoutput`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Column value is SQL NULL.
    Null,
    /// The column is a TOASTed value that was not modified by this
    /// statement and was not fetched; the prior value must be reused.
    UnchangedToast,
    /// A text-encoded scalar value.
    Text(String),
}

impl Cell {
    pub fn is_unchanged_toast(&self) -> bool {
        matches!(self, Self::UnchangedToast)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// An ordered row of column values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TupleData {
    pub columns: Vec<Cell>,
}

impl TupleData {
    pub fn from_buffer(bytes: &mut Bytes) -> Result<Self, Error> {
        if bytes.remaining() < 2 {
            return Err(Error::Eof);
        }
        let num_columns = bytes.get_i16();
        let mut columns = Vec::with_capacity(num_columns.max(0) as usize);

        for _ in 0..num_columns {
            if !bytes.has_remaining() {
                return Err(Error::Eof);
            }
            let kind = bytes.get_u8() as char;
            let cell = match kind {
                'n' => Cell::Null,
                'u' => Cell::UnchangedToast,
                't' => {
                    if bytes.remaining() < 4 {
                        return Err(Error::Eof);
                    }
                    let len = bytes.get_i32() as usize;
                    if bytes.remaining() < len {
                        return Err(Error::Eof);
                    }
                    let raw = bytes.copy_to_bytes(len);
                    Cell::Text(std::str::from_utf8(&raw)?.to_string())
                }
                c => return Err(Error::UnknownColumnKind(c)),
            };
            columns.push(cell);
        }

        Ok(Self { columns })
    }
}

impl super::FromBytes for TupleData {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        Self::from_buffer(&mut bytes)
    }
}
