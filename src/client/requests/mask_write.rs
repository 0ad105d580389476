use crate::client::requests::Promise;
use crate::common::cursor::{ReadCursor, WriteCursor};
use crate::common::traits::{Parse, Serialize};
use crate::error::{AduParseError, RequestError};
use crate::types::MaskWrite;

pub(crate) struct MaskWriteRequest {
    request: MaskWrite,
    promise: Promise<MaskWrite>,
}

impl MaskWriteRequest {
    pub(crate) fn new(request: MaskWrite, promise: Promise<MaskWrite>) -> Self {
        Self { request, promise }
    }

    pub(crate) fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        self.request.serialize(cursor)
    }

    pub(crate) fn failure(self, err: RequestError) {
        self.promise.failure(err)
    }

    pub(crate) fn complete_broadcast(self) {
        let request = self.request;
        self.promise.complete(Ok(request))
    }

    pub(crate) fn handle_response(self, mut cursor: ReadCursor) {
        let result = Self::parse_echo(self.request, &mut cursor);
        self.promise.complete(result)
    }

    fn parse_echo(request: MaskWrite, cursor: &mut ReadCursor) -> Result<MaskWrite, RequestError> {
        let response = MaskWrite::parse(cursor)?;
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

    #[test]
    fn accepts_exact_echo() {
        let request = MaskWrite::new(0x0004, 0x00F2, 0x0025);
        let mut cursor = ReadCursor::new(&[0x00, 0x04, 0x00, 0xF2, 0x00, 0x25]);
        assert_eq!(
            MaskWriteRequest::parse_echo(request, &mut cursor),
            Ok(request)
        );
    }

    #[test]
    fn rejects_modified_or_mask() {
        let request = MaskWrite::new(0x0004, 0x00F2, 0x0025);
        let mut cursor = ReadCursor::new(&[0x00, 0x04, 0x00, 0xF2, 0x00, 0x26]);
        assert_eq!(
            MaskWriteRequest::parse_echo(request, &mut cursor),
            Err(AduParseError::ReplyEchoMismatch.into())
        );
    }
}
