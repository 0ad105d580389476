use crate::common::buffer::ReadBuffer;
use crate::common::cursor::WriteCursor;
use crate::common::frame::{
    write_pdu, FormattedFrame, Frame, FrameHeader, FunctionField,
};
use crate::common::function::FunctionCode;
use crate::common::traits::Serialize;
use crate::decode::{DecodeLevel, FrameDecodeLevel};
use crate::error::{FrameParseError, RequestError};
use crate::types::UnitId;

pub(crate) mod constants {
    pub(crate) const UNIT_ID_LENGTH: usize = 1;
    pub(crate) const FUNCTION_CODE_LENGTH: usize = 1;
    pub(crate) const CRC_LENGTH: usize = 2;
    pub(crate) const MAX_FRAME_LENGTH: usize =
        UNIT_ID_LENGTH + crate::common::frame::constants::MAX_ADU_LENGTH + CRC_LENGTH;
}

#[derive(Clone, Copy)]
enum ParserType {
    Request,
    Response,
}

#[derive(Clone, Copy)]
enum ParseState {
    Start,
    ReadFullBody(UnitId, usize),          // unit id, length of the rest
    ReadToOffsetForLength(UnitId, usize), // unit id, offset of the u8 byte count
    ReadToOffsetForLength16(UnitId, usize), // unit id, offset of the u16 byte count
}

#[derive(Clone, Copy)]
enum LengthMode {
    /// The body length is always the same (without the function code)
    Fixed(usize),
    /// You need to read X more bytes. The last byte contains the number of extra bytes to read after that
    Offset(usize),
    /// Same, but the count is carried in the last *two* bytes (read FIFO queue responses)
    Offset16(usize),
    /// Unknown function code, can't determine the size
    Unknown,
}

pub(crate) struct RtuParser {
    state: ParseState,
    parser_type: ParserType,
}

impl RtuParser {
    pub(crate) fn new_request_parser() -> Self {
        Self {
            state: ParseState::Start,
            parser_type: ParserType::Request,
        }
    }

    pub(crate) fn new_response_parser() -> Self {
        Self {
            state: ParseState::Start,
            parser_type: ParserType::Response,
        }
    }

    // Returns how to calculate the length of the body
    fn length_mode(&self, function_code: u8) -> LengthMode {
        // Check exception (only valid for responses)
        if matches!(self.parser_type, ParserType::Response) && function_code & 0x80 != 0 {
            return LengthMode::Fixed(1);
        }

        let function_code = match FunctionCode::get(function_code) {
            Some(code) => code,
            None => return LengthMode::Unknown,
        };

        match self.parser_type {
            ParserType::Request => match function_code {
                FunctionCode::ReadCoils => LengthMode::Fixed(4),
                FunctionCode::ReadDiscreteInputs => LengthMode::Fixed(4),
                FunctionCode::ReadHoldingRegisters => LengthMode::Fixed(4),
                FunctionCode::ReadInputRegisters => LengthMode::Fixed(4),
                FunctionCode::WriteSingleCoil => LengthMode::Fixed(4),
                FunctionCode::WriteSingleRegister => LengthMode::Fixed(4),
                FunctionCode::WriteMultipleCoils => LengthMode::Offset(5),
                FunctionCode::WriteMultipleRegisters => LengthMode::Offset(5),
                FunctionCode::MaskWriteRegister => LengthMode::Fixed(6),
                FunctionCode::ReadWriteMultipleRegisters => LengthMode::Offset(9),
                FunctionCode::ReadFifoQueue => LengthMode::Fixed(2),
                FunctionCode::ReadFileRecord => LengthMode::Offset(1),
                FunctionCode::WriteFileRecord => LengthMode::Offset(1),
            },
            ParserType::Response => match function_code {
                FunctionCode::ReadCoils => LengthMode::Offset(1),
                FunctionCode::ReadDiscreteInputs => LengthMode::Offset(1),
                FunctionCode::ReadHoldingRegisters => LengthMode::Offset(1),
                FunctionCode::ReadInputRegisters => LengthMode::Offset(1),
                FunctionCode::WriteSingleCoil => LengthMode::Fixed(4),
                FunctionCode::WriteSingleRegister => LengthMode::Fixed(4),
                FunctionCode::WriteMultipleCoils => LengthMode::Fixed(4),
                FunctionCode::WriteMultipleRegisters => LengthMode::Fixed(4),
                FunctionCode::MaskWriteRegister => LengthMode::Fixed(6),
                FunctionCode::ReadWriteMultipleRegisters => LengthMode::Offset(1),
                FunctionCode::ReadFifoQueue => LengthMode::Offset16(2),
                FunctionCode::ReadFileRecord => LengthMode::Offset(1),
                FunctionCode::WriteFileRecord => LengthMode::Offset(1),
            },
        }
    }

    pub(crate) fn parse(
        &mut self,
        cursor: &mut ReadBuffer,
        decode_level: FrameDecodeLevel,
    ) -> Result<Option<Frame>, RequestError> {
        match self.state {
            ParseState::Start => {
                if cursor.len() < 2 {
                    return Ok(None);
                }

                let unit_id = UnitId::new(cursor.read_u8()?);
                // don't consume the function code to avoid an unnecessary copy later on
                let raw_function_code = cursor.peek_at(0)?;

                self.state = match self.length_mode(raw_function_code) {
                    LengthMode::Fixed(length) => ParseState::ReadFullBody(unit_id, length),
                    LengthMode::Offset(offset) => {
                        ParseState::ReadToOffsetForLength(unit_id, offset)
                    }
                    LengthMode::Offset16(offset) => {
                        ParseState::ReadToOffsetForLength16(unit_id, offset)
                    }
                    LengthMode::Unknown => {
                        return Err(RequestError::BadFrame(
                            FrameParseError::UnknownFunctionCode(raw_function_code),
                        ))
                    }
                };

                self.parse(cursor, decode_level)
            }
            ParseState::ReadToOffsetForLength(unit_id, offset) => {
                if cursor.len() < constants::FUNCTION_CODE_LENGTH + offset {
                    return Ok(None);
                }

                // the complete length is now known
                let extra_bytes_to_read =
                    cursor.peek_at(constants::FUNCTION_CODE_LENGTH + offset - 1)? as usize;
                self.state = ParseState::ReadFullBody(unit_id, offset + extra_bytes_to_read);

                self.parse(cursor, decode_level)
            }
            ParseState::ReadToOffsetForLength16(unit_id, offset) => {
                if cursor.len() < constants::FUNCTION_CODE_LENGTH + offset {
                    return Ok(None);
                }

                let high = cursor.peek_at(constants::FUNCTION_CODE_LENGTH + offset - 2)? as usize;
                let low = cursor.peek_at(constants::FUNCTION_CODE_LENGTH + offset - 1)? as usize;
                let extra_bytes_to_read = (high << 8) | low;
                self.state = ParseState::ReadFullBody(unit_id, offset + extra_bytes_to_read);

                self.parse(cursor, decode_level)
            }
            ParseState::ReadFullBody(unit_id, length) => {
                if constants::FUNCTION_CODE_LENGTH + length
                    > crate::common::frame::constants::MAX_ADU_LENGTH
                {
                    return Err(RequestError::BadFrame(FrameParseError::FrameLengthTooBig(
                        constants::FUNCTION_CODE_LENGTH + length,
                        crate::common::frame::constants::MAX_ADU_LENGTH,
                    )));
                }

                if cursor.len() < constants::FUNCTION_CODE_LENGTH + length + constants::CRC_LENGTH {
                    return Ok(None);
                }

                let frame = {
                    let data = cursor.read(constants::FUNCTION_CODE_LENGTH + length)?;
                    let mut frame = Frame::new(FrameHeader::new_rtu_header(unit_id));
                    frame.set(data);
                    frame
                };
                let received_crc = cursor.read_u16_le()?;

                let expected_crc = {
                    let crc = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS);
                    let mut digest = crc.digest();
                    digest.update(&[unit_id.value]);
                    digest.update(frame.payload());
                    digest.finalize()
                };

                // the next frame parses from a clean slate either way
                self.state = ParseState::Start;

                if received_crc != expected_crc {
                    return Err(RequestError::BadFrame(
                        FrameParseError::CrcValidationFailure(received_crc, expected_crc),
                    ));
                }

                if decode_level.enabled() {
                    tracing::info!(
                        "RTU RX - {}",
                        RtuDisplay::new(decode_level, unit_id, frame.payload(), received_crc)
                    );
                }

                Ok(Some(frame))
            }
        }
    }

    pub(crate) fn reset(&mut self) {
        self.state = ParseState::Start;
    }
}

pub(crate) fn format_rtu<T>(
    buffer: &mut [u8],
    header: FrameHeader,
    function: FunctionField,
    body: &T,
    level: DecodeLevel,
) -> Result<FormattedFrame, RequestError>
where
    T: Serialize + ?Sized,
{
    let mut cursor = WriteCursor::new(&mut *buffer);

    cursor.write_u8(header.unit_id.value)?;
    let pdu_body = write_pdu(&mut cursor, function, body)?;
    let end_pdu = cursor.position();

    let crc = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS).checksum(&buffer[..end_pdu]);

    let mut cursor = WriteCursor::new(&mut *buffer);
    cursor.seek_from_start(end_pdu)?;
    cursor.write_u16_le(crc)?;

    if level.frame.enabled() {
        tracing::info!(
            "RTU TX - {}",
            RtuDisplay::new(
                level.frame,
                header.unit_id,
                &buffer[constants::UNIT_ID_LENGTH..end_pdu],
                crc
            )
        );
    }

    Ok(FormattedFrame {
        end: end_pdu + constants::CRC_LENGTH,
        pdu_body,
    })
}

struct RtuDisplay<'a> {
    level: FrameDecodeLevel,
    address: UnitId,
    data: &'a [u8],
    crc: u16,
}

impl<'a> RtuDisplay<'a> {
    fn new(level: FrameDecodeLevel, address: UnitId, data: &'a [u8], crc: u16) -> Self {
        RtuDisplay {
            level,
            address,
            data,
            crc,
        }
    }
}

impl std::fmt::Display for RtuDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "address: {} crc: {:#06X} (len = {})",
            self.address,
            self.crc,
            self.data.len(),
        )?;
        if self.level.payload_enabled() {
            crate::common::phys::format_bytes(f, self.data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::task::Poll;

    use crate::common::frame::{FramedReader, TxId};
    use crate::common::phys::PhysLayer;

    use super::*;

    // read holding registers, addr 0, qty 1, valid CRC
    const READ_REQUEST: &[u8] = &[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A];
    // the same frame with the last CRC byte flipped
    const READ_REQUEST_BAD_CRC: &[u8] = &[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0B];

    fn parse_request(input: &[u8]) -> Result<Frame, RequestError> {
        let (io, mut io_handle) = sfio_tokio_mock_io::mock();
        let mut reader = FramedReader::rtu_request();
        let mut layer = PhysLayer::new_mock(io);
        let mut task =
            tokio_test::task::spawn(reader.next_frame(&mut layer, DecodeLevel::nothing()));

        io_handle.read(input);
        match task.poll() {
            Poll::Ready(frame) => frame,
            Poll::Pending => panic!("task not ready"),
        }
    }

    #[test]
    fn parses_request_with_valid_crc() {
        let frame = parse_request(READ_REQUEST).unwrap();
        assert_eq!(frame.header.unit_id, UnitId::new(0x01));
        assert_eq!(frame.header.tx_id, None);
        assert_eq!(frame.payload(), &[0x03, 0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn rejects_corrupted_crc() {
        assert_eq!(
            parse_request(READ_REQUEST_BAD_CRC),
            Err(RequestError::BadFrame(FrameParseError::CrcValidationFailure(
                0x0B84, 0x0A84
            )))
        );
    }

    #[test]
    fn accepts_a_valid_frame_after_a_corrupted_one() {
        let (io, mut io_handle) = sfio_tokio_mock_io::mock();
        let mut reader = FramedReader::rtu_request();
        let mut layer = PhysLayer::new_mock(io);

        io_handle.read(READ_REQUEST_BAD_CRC);
        let mut task =
            tokio_test::task::spawn(reader.next_frame(&mut layer, DecodeLevel::nothing()));
        match task.poll() {
            Poll::Ready(result) => assert!(matches!(
                result,
                Err(RequestError::BadFrame(FrameParseError::CrcValidationFailure(_, _)))
            )),
            Poll::Pending => panic!("task not ready"),
        }
        drop(task);

        // the caller resynchronizes by discarding buffered input
        reader.reset();

        io_handle.read(READ_REQUEST);
        let mut task =
            tokio_test::task::spawn(reader.next_frame(&mut layer, DecodeLevel::nothing()));
        match task.poll() {
            Poll::Ready(result) => {
                assert_eq!(result.unwrap().payload(), &[0x03, 0x00, 0x00, 0x00, 0x01])
            }
            Poll::Pending => panic!("task not ready"),
        }
    }

    #[test]
    fn rejects_unknown_function_code() {
        assert_eq!(
            parse_request(&[0x01, 0x70, 0x00, 0x00]),
            Err(RequestError::BadFrame(FrameParseError::UnknownFunctionCode(
                0x70
            )))
        );
    }

    #[test]
    fn parses_exception_response() {
        let (io, mut io_handle) = sfio_tokio_mock_io::mock();
        let mut reader = FramedReader::rtu_response();
        let mut layer = PhysLayer::new_mock(io);
        let mut task =
            tokio_test::task::spawn(reader.next_frame(&mut layer, DecodeLevel::nothing()));

        // illegal data address exception for read holding registers
        io_handle.read(&[0x01, 0x83, 0x02, 0xC0, 0xF1]);
        match task.poll() {
            Poll::Ready(frame) => {
                assert_eq!(frame.unwrap().payload(), &[0x83, 0x02]);
            }
            Poll::Pending => panic!("task not ready"),
        }
    }

    #[test]
    fn parses_fifo_response_with_u16_byte_count() {
        let (io, mut io_handle) = sfio_tokio_mock_io::mock();
        let mut reader = FramedReader::rtu_response();
        let mut layer = PhysLayer::new_mock(io);
        let mut task =
            tokio_test::task::spawn(reader.next_frame(&mut layer, DecodeLevel::nothing()));

        // fifo response: byte count = 6, fifo count = 2, two registers
        let body: &[u8] = &[0x01, 0x18, 0x00, 0x06, 0x00, 0x02, 0x01, 0xB8, 0x12, 0x84];
        let crc = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS).checksum(body);
        let mut frame = body.to_vec();
        frame.extend_from_slice(&crc.to_le_bytes());

        io_handle.read(&frame);
        match task.poll() {
            Poll::Ready(result) => {
                assert_eq!(
                    result.unwrap().payload(),
                    &[0x18, 0x00, 0x06, 0x00, 0x02, 0x01, 0xB8, 0x12, 0x84]
                );
            }
            Poll::Pending => panic!("task not ready"),
        }
    }

    #[test]
    fn formats_rtu_frame_with_trailing_crc() {
        let mut buffer = [0u8; constants::MAX_FRAME_LENGTH];
        let range = crate::types::AddressRange::try_from(0, 1).unwrap();
        let info = format_rtu(
            &mut buffer,
            FrameHeader::new_rtu_header(UnitId::new(0x01)),
            FunctionField::Valid(FunctionCode::ReadHoldingRegisters),
            &range,
            DecodeLevel::nothing(),
        )
        .unwrap();
        assert_eq!(&buffer[..info.end], READ_REQUEST);
    }

    #[test]
    fn tx_id_increments_and_wraps() {
        let mut tx_id = TxId::new(u16::MAX - 1);
        assert_eq!(tx_id.next().to_u16(), u16::MAX - 1);
        assert_eq!(tx_id.next().to_u16(), u16::MAX);
        assert_eq!(tx_id.next().to_u16(), 0);
    }
}
