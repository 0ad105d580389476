use crate::client::requests::Promise;
use crate::common::cursor::{ReadCursor, WriteCursor};
use crate::common::traits::{Parse, Serialize};
use crate::error::{AduParseError, RequestError};

pub(crate) struct SingleWrite<T>
where
    T: Serialize + Parse + PartialEq + Copy,
{
    request: T,
    promise: Promise<T>,
}

impl<T> SingleWrite<T>
where
    T: Serialize + Parse + PartialEq + Copy,
{
    pub(crate) fn new(request: T, promise: Promise<T>) -> Self {
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
        let request = self.request;
        self.promise.complete(Ok(request))
    }

    pub(crate) fn handle_response(self, mut cursor: ReadCursor) {
        let result = Self::parse_echo(self.request, &mut cursor);
        self.promise.complete(result)
    }

    fn parse_echo(request: T, cursor: &mut ReadCursor) -> Result<T, RequestError> {
        let response = T::parse(cursor)?;
        cursor.expect_empty()?;
        if response != request {
            return Err(AduParseError::ReplyEchoMismatch.into());
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Indexed;

    #[test]
    fn accepts_exact_echo() {
        let mut cursor = ReadCursor::new(&[0x00, 0x01, 0xFF, 0x00]);
        let result = SingleWrite::parse_echo(Indexed::new(1, true), &mut cursor);
        assert_eq!(result.unwrap(), Indexed::new(1, true));
    }

    #[test]
    fn rejects_mismatched_echo() {
        let mut cursor = ReadCursor::new(&[0x00, 0x02, 0xFF, 0x00]);
        let result = SingleWrite::parse_echo(Indexed::new(1, true), &mut cursor);
        assert_eq!(result, Err(AduParseError::ReplyEchoMismatch.into()));
    }
}
