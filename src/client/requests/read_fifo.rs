use crate::client::requests::Promise;
use crate::common::cursor::{ReadCursor, WriteCursor};
use crate::error::{AduParseError, RequestError};

pub(crate) struct ReadFifo {
    address: u16,
    promise: Promise<Vec<u16>>,
}

impl ReadFifo {
    pub(crate) fn new(address: u16, promise: Promise<Vec<u16>>) -> Self {
        Self { address, promise }
    }

    pub(crate) fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        cursor.write_u16_be(self.address)?;
        Ok(())
    }

    pub(crate) fn failure(self, err: RequestError) {
        self.promise.failure(err)
    }

    pub(crate) fn handle_response(self, mut cursor: ReadCursor) {
        let result = Self::parse_response(&mut cursor);
        self.promise.complete(result)
    }

    fn parse_response(cursor: &mut ReadCursor) -> Result<Vec<u16>, RequestError> {
        // unlike every other response, the byte count here is 16-bit
        let byte_count = cursor.read_u16_be()?;
        let fifo_count = cursor.read_u16_be()?;

        if fifo_count > crate::constants::limits::MAX_FIFO_COUNT {
            return Err(AduParseError::FifoCountTooBig(fifo_count).into());
        }

        // the byte count covers the fifo count field and the registers
        if byte_count as usize != 2 + 2 * fifo_count as usize {
            return Err(AduParseError::InsufficientBytesForByteCount(
                byte_count as usize,
                2 + 2 * fifo_count as usize,
            )
            .into());
        }

        let mut values = Vec::with_capacity(fifo_count as usize);
        for _ in 0..fifo_count {
            values.push(cursor.read_u16_be()?);
        }
        cursor.expect_empty()?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fifo_response() {
        let mut cursor = ReadCursor::new(&[0x00, 0x06, 0x00, 0x02, 0x01, 0xB8, 0x12, 0x84]);
        assert_eq!(
            ReadFifo::parse_response(&mut cursor).unwrap(),
            vec![0x01B8, 0x1284]
        );
    }

    #[test]
    fn parses_empty_fifo_response() {
        let mut cursor = ReadCursor::new(&[0x00, 0x02, 0x00, 0x00]);
        assert_eq!(ReadFifo::parse_response(&mut cursor).unwrap(), Vec::<u16>::new());
    }

    #[test]
    fn rejects_fifo_count_over_31() {
        let mut cursor = ReadCursor::new(&[0x00, 0x42, 0x00, 0x20]);
        assert_eq!(
            ReadFifo::parse_response(&mut cursor),
            Err(AduParseError::FifoCountTooBig(32).into())
        );
    }

    #[test]
    fn rejects_inconsistent_byte_count() {
        let mut cursor = ReadCursor::new(&[0x00, 0x08, 0x00, 0x02, 0x01, 0xB8, 0x12, 0x84]);
        assert_eq!(
            ReadFifo::parse_response(&mut cursor),
            Err(AduParseError::InsufficientBytesForByteCount(8, 6).into())
        );
    }
}
