use crate::client::requests::Promise;
use crate::common::cursor::{ReadCursor, WriteCursor};
use crate::common::traits::Serialize;
use crate::error::RequestError;
use crate::types::{Indexed, ReadWriteMultiple, RegisterIterator};

pub(crate) struct ReadWriteRegisters {
    request: ReadWriteMultiple,
    promise: Promise<Vec<Indexed<u16>>>,
}

impl ReadWriteRegisters {
    pub(crate) fn new(request: ReadWriteMultiple, promise: Promise<Vec<Indexed<u16>>>) -> Self {
        Self { request, promise }
    }

    pub(crate) fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        self.request.serialize(cursor)
    }

    pub(crate) fn failure(self, err: RequestError) {
        self.promise.failure(err)
    }

    pub(crate) fn handle_response(self, mut cursor: ReadCursor) {
        // the response carries only the registers of the read portion
        let result = Self::parse_response(self.request.read_range, &mut cursor);
        self.promise.complete(result)
    }

    fn parse_response(
        read_range: crate::types::AddressRange,
        cursor: &mut ReadCursor,
    ) -> Result<Vec<Indexed<u16>>, RequestError> {
        cursor.read_u8()?;
        Ok(RegisterIterator::parse_all(read_range, cursor)?.collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AddressRange;

    #[test]
    fn parses_read_portion_of_response() {
        let range = AddressRange::try_from(0, 2).unwrap();
        let mut cursor = ReadCursor::new(&[0x04, 0x00, 0x0A, 0x00, 0x0B]);
        assert_eq!(
            ReadWriteRegisters::parse_response(range, &mut cursor).unwrap(),
            vec![Indexed::new(0, 0x000A), Indexed::new(1, 0x000B)]
        );
    }
}
