use crate::client::requests::Promise;
use crate::common::cursor::{ReadCursor, WriteCursor};
use crate::constants::limits::{FILE_RECORD_REFERENCE_TYPE, MAX_FILE_RECORD_NUMBER};
use crate::error::{AduParseError, InvalidRequest, RequestError};
use crate::types::{FileRecord, RecordReference};

/// bytes per sub-request in a read file record request
const READ_SUB_REQUEST_LENGTH: usize = 7;

pub(crate) fn validate_read_request(refs: &[RecordReference]) -> Result<(), InvalidRequest> {
    if refs.is_empty() {
        return Err(InvalidRequest::InvalidFileRecord);
    }

    let total = 1 + refs.len() * READ_SUB_REQUEST_LENGTH;
    if total > crate::common::frame::constants::MAX_ADU_LENGTH - 1 {
        return Err(InvalidRequest::RequestTooBig(total));
    }

    for reference in refs {
        if reference.record > MAX_FILE_RECORD_NUMBER || reference.length == 0 {
            return Err(InvalidRequest::InvalidFileRecord);
        }
    }

    Ok(())
}

pub(crate) fn validate_write_request(records: &[FileRecord]) -> Result<(), InvalidRequest> {
    if records.is_empty() {
        return Err(InvalidRequest::InvalidFileRecord);
    }

    let total = 1 + records
        .iter()
        .map(|r| READ_SUB_REQUEST_LENGTH + 2 * r.data.len())
        .sum::<usize>();
    if total > crate::common::frame::constants::MAX_ADU_LENGTH - 1 {
        return Err(InvalidRequest::RequestTooBig(total));
    }

    for record in records {
        if record.record > MAX_FILE_RECORD_NUMBER
            || record.data.is_empty()
            || u16::try_from(record.data.len()).is_err()
        {
            return Err(InvalidRequest::InvalidFileRecord);
        }
    }

    Ok(())
}

pub(crate) struct FileRecordRead {
    requests: Vec<RecordReference>,
    promise: Promise<Vec<FileRecord>>,
}

impl FileRecordRead {
    pub(crate) fn new(requests: Vec<RecordReference>, promise: Promise<Vec<FileRecord>>) -> Self {
        Self { requests, promise }
    }

    pub(crate) fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        let byte_count = self.requests.len() * READ_SUB_REQUEST_LENGTH;
        cursor.write_u8(byte_count as u8)?;
        for reference in &self.requests {
            cursor.write_u8(FILE_RECORD_REFERENCE_TYPE)?;
            cursor.write_u16_be(reference.file)?;
            cursor.write_u16_be(reference.record)?;
            cursor.write_u16_be(reference.length)?;
        }
        Ok(())
    }

    pub(crate) fn failure(self, err: RequestError) {
        self.promise.failure(err)
    }

    pub(crate) fn handle_response(self, mut cursor: ReadCursor) {
        let result = Self::parse_response(&self.requests, &mut cursor);
        self.promise.complete(result)
    }

    fn parse_response(
        requests: &[RecordReference],
        cursor: &mut ReadCursor,
    ) -> Result<Vec<FileRecord>, RequestError> {
        // overall response byte count, validated by consuming everything
        cursor.read_u8()?;

        let mut records = Vec::with_capacity(requests.len());
        for reference in requests {
            let sub_length = cursor.read_u8()? as usize;
            let ref_type = cursor.read_u8()?;
            if ref_type != FILE_RECORD_REFERENCE_TYPE {
                return Err(AduParseError::UnknownReferenceType(ref_type).into());
            }

            // the sub-response length covers the reference type byte
            let data_bytes = sub_length
                .checked_sub(1)
                .ok_or(AduParseError::InsufficientBytes)?;
            if data_bytes != 2 * reference.length as usize {
                return Err(AduParseError::ReplyEchoMismatch.into());
            }

            let mut data = Vec::with_capacity(reference.length as usize);
            for _ in 0..reference.length {
                data.push(cursor.read_u16_be()?);
            }
            records.push(FileRecord::new(reference.file, reference.record, data));
        }
        cursor.expect_empty()?;
        Ok(records)
    }
}

pub(crate) struct FileRecordWrite {
    records: Vec<FileRecord>,
    promise: Promise<()>,
}

impl FileRecordWrite {
    pub(crate) fn new(records: Vec<FileRecord>, promise: Promise<()>) -> Self {
        Self { records, promise }
    }

    pub(crate) fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        let byte_count: usize = self
            .records
            .iter()
            .map(|r| READ_SUB_REQUEST_LENGTH + 2 * r.data.len())
            .sum();
        cursor.write_u8(byte_count as u8)?;
        for record in &self.records {
            cursor.write_u8(FILE_RECORD_REFERENCE_TYPE)?;
            cursor.write_u16_be(record.file)?;
            cursor.write_u16_be(record.record)?;
            cursor.write_u16_be(record.data.len() as u16)?;
            for word in &record.data {
                cursor.write_u16_be(*word)?;
            }
        }
        Ok(())
    }

    pub(crate) fn failure(self, err: RequestError) {
        self.promise.failure(err)
    }

    pub(crate) fn complete_broadcast(self) {
        self.promise.complete(Ok(()))
    }

    pub(crate) fn handle_response(self, mut cursor: ReadCursor) {
        let result = Self::parse_echo(&self.records, &mut cursor);
        self.promise.complete(result)
    }

    fn parse_echo(records: &[FileRecord], cursor: &mut ReadCursor) -> Result<(), RequestError> {
        cursor.read_u8()?;
        for record in records {
            let ref_type = cursor.read_u8()?;
            if ref_type != FILE_RECORD_REFERENCE_TYPE {
                return Err(AduParseError::UnknownReferenceType(ref_type).into());
            }
            let file = cursor.read_u16_be()?;
            let record_number = cursor.read_u16_be()?;
            let length = cursor.read_u16_be()?;
            if file != record.file
                || record_number != record.record
                || length as usize != record.data.len()
            {
                return Err(AduParseError::ReplyEchoMismatch.into());
            }
            for word in &record.data {
                if cursor.read_u16_be()? != *word {
                    return Err(AduParseError::ReplyEchoMismatch.into());
                }
            }
        }
        cursor.expect_empty()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_read_request_per_reference() {
        let request = FileRecordRead::new(
            vec![
                RecordReference::new(4, 1, 2),
                RecordReference::new(3, 9, 2),
            ],
            Promise::channel().0,
        );
        let mut buffer = [0u8; 32];
        let mut cursor = WriteCursor::new(&mut buffer);
        request.serialize(&mut cursor).unwrap();
        let end = cursor.position();
        assert_eq!(
            &buffer[..end],
            &[
                0x0E, // byte count
                0x06, 0x00, 0x04, 0x00, 0x01, 0x00, 0x02, // file 4, record 1, len 2
                0x06, 0x00, 0x03, 0x00, 0x09, 0x00, 0x02, // file 3, record 9, len 2
            ]
        );
    }

    #[test]
    fn parses_read_response_using_requested_lengths() {
        let requests = vec![RecordReference::new(4, 1, 2)];
        let mut cursor = ReadCursor::new(&[0x06, 0x05, 0x06, 0x0D, 0xFE, 0x00, 0x20]);
        let records = FileRecordRead::parse_response(&requests, &mut cursor).unwrap();
        assert_eq!(records, vec![FileRecord::new(4, 1, vec![0x0DFE, 0x0020])]);
    }

    #[test]
    fn rejects_bad_reference_type_in_response() {
        let requests = vec![RecordReference::new(4, 1, 1)];
        let mut cursor = ReadCursor::new(&[0x04, 0x03, 0x07, 0x0D, 0xFE]);
        assert_eq!(
            FileRecordRead::parse_response(&requests, &mut cursor),
            Err(AduParseError::UnknownReferenceType(0x07).into())
        );
    }

    #[test]
    fn validation_rejects_empty_and_oversize_requests() {
        assert_eq!(
            validate_read_request(&[]),
            Err(InvalidRequest::InvalidFileRecord)
        );
        let refs = vec![RecordReference::new(1, 0, 1); 40];
        assert!(matches!(
            validate_read_request(&refs),
            Err(InvalidRequest::RequestTooBig(_))
        ));
    }

    #[test]
    fn write_echo_round_trips() {
        let records = vec![FileRecord::new(4, 7, vec![0x06AF, 0x04BE])];
        let request = FileRecordWrite::new(records.clone(), Promise::channel().0);
        let mut buffer = [0u8; 32];
        let mut cursor = WriteCursor::new(&mut buffer);
        request.serialize(&mut cursor).unwrap();
        let end = cursor.position();

        let mut read = ReadCursor::new(&buffer[..end]);
        assert_eq!(FileRecordWrite::parse_echo(&records, &mut read), Ok(()));
    }
}
