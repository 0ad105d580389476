use crate::client::requests::Promise;
use crate::common::cursor::{ReadCursor, WriteCursor};
use crate::common::traits::Serialize;
use crate::error::RequestError;
use crate::types::{BitIterator, Indexed, ReadBitsRange};

pub(crate) struct ReadBits {
    request: ReadBitsRange,
    promise: Promise<Vec<Indexed<bool>>>,
}

impl ReadBits {
    pub(crate) fn new(request: ReadBitsRange, promise: Promise<Vec<Indexed<bool>>>) -> Self {
        Self { request, promise }
    }

    pub(crate) fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        self.request.inner.serialize(cursor)
    }

    pub(crate) fn failure(self, err: RequestError) {
        self.promise.failure(err)
    }

    pub(crate) fn handle_response(self, mut cursor: ReadCursor) {
        let result = Self::parse_bits_response(self.request, &mut cursor);
        self.promise.complete(result)
    }

    fn parse_bits_response(
        range: ReadBitsRange,
        cursor: &mut ReadCursor,
    ) -> Result<Vec<Indexed<bool>>, RequestError> {
        // the byte count is validated by consuming all the remaining bytes
        cursor.read_u8()?;
        Ok(BitIterator::parse_all(range.get(), cursor)?.collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AddressRange;

    #[test]
    fn parses_bit_response_into_indexed_values() {
        let range = AddressRange::try_from(4, 3).unwrap().of_read_bits().unwrap();
        let mut cursor = ReadCursor::new(&[0x01, 0x05]);
        let values = ReadBits::parse_bits_response(range, &mut cursor).unwrap();
        assert_eq!(
            values,
            vec![
                Indexed::new(4, true),
                Indexed::new(5, false),
                Indexed::new(6, true)
            ]
        );
    }

    #[test]
    fn rejects_truncated_bitmaps() {
        let range = AddressRange::try_from(0, 9).unwrap().of_read_bits().unwrap();
        let mut cursor = ReadCursor::new(&[0x02, 0xFF]);
        assert!(ReadBits::parse_bits_response(range, &mut cursor).is_err());
    }
}
