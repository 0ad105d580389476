use crate::client::requests::Promise;
use crate::common::cursor::{ReadCursor, WriteCursor};
use crate::common::traits::Serialize;
use crate::error::RequestError;
use crate::types::{Indexed, ReadRegistersRange, RegisterIterator};

pub(crate) struct ReadRegisters {
    request: ReadRegistersRange,
    promise: Promise<Vec<Indexed<u16>>>,
}

impl ReadRegisters {
    pub(crate) fn new(request: ReadRegistersRange, promise: Promise<Vec<Indexed<u16>>>) -> Self {
        Self { request, promise }
    }

    pub(crate) fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        self.request.inner.serialize(cursor)
    }

    pub(crate) fn failure(self, err: RequestError) {
        self.promise.failure(err)
    }

    pub(crate) fn handle_response(self, mut cursor: ReadCursor) {
        let result = Self::parse_registers_response(self.request, &mut cursor);
        self.promise.complete(result)
    }

    fn parse_registers_response(
        range: ReadRegistersRange,
        cursor: &mut ReadCursor,
    ) -> Result<Vec<Indexed<u16>>, RequestError> {
        // the byte count is validated by consuming all the remaining bytes
        cursor.read_u8()?;
        Ok(RegisterIterator::parse_all(range.get(), cursor)?.collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AduParseError;
    use crate::types::AddressRange;

    #[test]
    fn parses_register_response_into_indexed_values() {
        let range = AddressRange::try_from(0x1000, 2)
            .unwrap()
            .of_read_registers()
            .unwrap();
        let mut cursor = ReadCursor::new(&[0x04, 0x12, 0x34, 0x56, 0x78]);
        let values = ReadRegisters::parse_registers_response(range, &mut cursor).unwrap();
        assert_eq!(
            values,
            vec![Indexed::new(0x1000, 0x1234), Indexed::new(0x1001, 0x5678)]
        );
    }

    #[test]
    fn rejects_trailing_bytes() {
        let range = AddressRange::try_from(0, 1)
            .unwrap()
            .of_read_registers()
            .unwrap();
        let mut cursor = ReadCursor::new(&[0x02, 0xAA, 0xBB, 0xCC]);
        assert_eq!(
            ReadRegisters::parse_registers_response(range, &mut cursor),
            Err(AduParseError::TrailingBytes(1).into())
        );
    }
}
