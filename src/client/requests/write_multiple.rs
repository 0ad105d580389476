use crate::client::requests::Promise;
use crate::common::cursor::{ReadCursor, WriteCursor};
use crate::common::traits::{Parse, Serialize};
use crate::error::{AduParseError, RequestError};
use crate::types::{AddressRange, WriteMultiple};

pub(crate) struct MultipleWrite<T>
where
    WriteMultiple<T>: Serialize,
{
    request: WriteMultiple<T>,
    promise: Promise<AddressRange>,
}

impl<T> MultipleWrite<T>
where
    WriteMultiple<T>: Serialize,
{
    pub(crate) fn new(request: WriteMultiple<T>, promise: Promise<AddressRange>) -> Self {
        Self { request, promise }
    }

    pub(crate) fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        self.request.serialize(cursor)
    }

    pub(crate) fn failure(self, err: RequestError) {
        self.promise.failure(err)
    }

    /// broadcast writes have no response, the echo is produced locally
    pub(crate) fn complete_broadcast(self) {
        let range = self.request.range;
        self.promise.complete(Ok(range))
    }

    pub(crate) fn handle_response(self, mut cursor: ReadCursor) {
        let result = Self::parse_echo(self.request.range, &mut cursor);
        self.promise.complete(result)
    }

    fn parse_echo(
        request: AddressRange,
        cursor: &mut ReadCursor,
    ) -> Result<AddressRange, RequestError> {
        let range = AddressRange::parse(cursor)?;
        cursor.expect_empty()?;
        if range != request {
            return Err(AduParseError::ReplyEchoMismatch.into());
        }
        Ok(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_echoed_range() {
        let range = AddressRange::try_from(1, 3).unwrap();
        let mut cursor = ReadCursor::new(&[0x00, 0x01, 0x00, 0x03]);
        assert_eq!(MultipleWrite::<u16>::parse_echo(range, &mut cursor), Ok(range));
    }

    #[test]
    fn rejects_quantity_mismatch() {
        let range = AddressRange::try_from(1, 3).unwrap();
        let mut cursor = ReadCursor::new(&[0x00, 0x01, 0x00, 0x02]);
        assert_eq!(
            MultipleWrite::<u16>::parse_echo(range, &mut cursor),
            Err(AduParseError::ReplyEchoMismatch.into())
        );
    }
}
