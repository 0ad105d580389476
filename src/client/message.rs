use std::time::Duration;

use crate::client::requests::file_record::{FileRecordRead, FileRecordWrite};
use crate::client::requests::mask_write::MaskWriteRequest;
use crate::client::requests::read_bits::ReadBits;
use crate::client::requests::read_fifo::ReadFifo;
use crate::client::requests::read_registers::ReadRegisters;
use crate::client::requests::read_write_multiple::ReadWriteRegisters;
use crate::client::requests::write_multiple::MultipleWrite;
use crate::client::requests::write_single::SingleWrite;
use crate::common::cursor::{ReadCursor, WriteCursor};
use crate::common::frame::FunctionField;
use crate::common::function::FunctionCode;
use crate::common::traits::{Loggable, Serialize};
use crate::decode::{AppDecodeLevel, DecodeLevel};
use crate::error::{AduParseError, RequestError};
use crate::exception::ExceptionCode;
use crate::types::{Indexed, UnitId};

/// messages sent through the channel to the client loop
pub(crate) enum Command {
    Setting(Setting),
    Request(Request),
}

/// runtime settings a channel handle may change
pub(crate) enum Setting {
    Enable,
    Disable,
    DecodeLevel(DecodeLevel),
}

/// All of the information that the client loop needs to process a request
pub(crate) struct Request {
    pub(crate) id: UnitId,
    pub(crate) timeout: Duration,
    pub(crate) details: RequestDetails,
}

impl Request {
    pub(crate) fn new(id: UnitId, timeout: Duration, details: RequestDetails) -> Self {
        Self {
            id,
            timeout,
            details,
        }
    }

    /// decode the function code of the response, handing the body to the
    /// request state machine or surfacing the exception
    pub(crate) fn handle_response(self, payload: &[u8], decode: AppDecodeLevel) {
        let expected = self.details.function();
        let mut cursor = ReadCursor::new(payload);

        let function = match cursor.read_u8() {
            Ok(x) => x,
            Err(err) => return self.details.fail(err.into()),
        };

        if function == expected.get_value() {
            if decode.enabled() {
                tracing::info!("PDU RX - {}", expected);
            }
            return self.details.handle_response(cursor);
        }

        if function == expected.as_error() {
            let result = Self::parse_exception(&mut cursor);
            match &result {
                Ok(code) => {
                    tracing::warn!("PDU RX - {} ({})", FunctionField::Exception(expected), code);
                    self.details.fail(RequestError::Exception(*code))
                }
                Err(err) => self.details.fail(*err),
            }
            return;
        }

        self.details.fail(
            AduParseError::UnknownResponseFunction(
                function,
                expected.get_value(),
                expected.as_error(),
            )
            .into(),
        )
    }

    fn parse_exception(cursor: &mut ReadCursor) -> Result<ExceptionCode, RequestError> {
        let code = ExceptionCode::from(cursor.read_u8()?);
        cursor.expect_empty()?;
        Ok(code)
    }
}

/// possible requests that can be sent through the channel, each variant
/// wrapping the state machine of one function code
pub(crate) enum RequestDetails {
    ReadCoils(ReadBits),
    ReadDiscreteInputs(ReadBits),
    ReadHoldingRegisters(ReadRegisters),
    ReadInputRegisters(ReadRegisters),
    WriteSingleCoil(SingleWrite<Indexed<bool>>),
    WriteSingleRegister(SingleWrite<Indexed<u16>>),
    WriteMultipleCoils(MultipleWrite<bool>),
    WriteMultipleRegisters(MultipleWrite<u16>),
    MaskWriteRegister(MaskWriteRequest),
    ReadWriteMultipleRegisters(ReadWriteRegisters),
    ReadFifoQueue(ReadFifo),
    ReadFileRecord(FileRecordRead),
    WriteFileRecord(FileRecordWrite),
}

impl RequestDetails {
    pub(crate) fn function(&self) -> FunctionCode {
        match self {
            RequestDetails::ReadCoils(_) => FunctionCode::ReadCoils,
            RequestDetails::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            RequestDetails::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            RequestDetails::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            RequestDetails::WriteSingleCoil(_) => FunctionCode::WriteSingleCoil,
            RequestDetails::WriteSingleRegister(_) => FunctionCode::WriteSingleRegister,
            RequestDetails::WriteMultipleCoils(_) => FunctionCode::WriteMultipleCoils,
            RequestDetails::WriteMultipleRegisters(_) => FunctionCode::WriteMultipleRegisters,
            RequestDetails::MaskWriteRegister(_) => FunctionCode::MaskWriteRegister,
            RequestDetails::ReadWriteMultipleRegisters(_) => {
                FunctionCode::ReadWriteMultipleRegisters
            }
            RequestDetails::ReadFifoQueue(_) => FunctionCode::ReadFifoQueue,
            RequestDetails::ReadFileRecord(_) => FunctionCode::ReadFileRecord,
            RequestDetails::WriteFileRecord(_) => FunctionCode::WriteFileRecord,
        }
    }

    pub(crate) fn is_write(&self) -> bool {
        self.function().is_write()
    }

    pub(crate) fn fail(self, err: RequestError) {
        match self {
            RequestDetails::ReadCoils(x) => x.failure(err),
            RequestDetails::ReadDiscreteInputs(x) => x.failure(err),
            RequestDetails::ReadHoldingRegisters(x) => x.failure(err),
            RequestDetails::ReadInputRegisters(x) => x.failure(err),
            RequestDetails::WriteSingleCoil(x) => x.failure(err),
            RequestDetails::WriteSingleRegister(x) => x.failure(err),
            RequestDetails::WriteMultipleCoils(x) => x.failure(err),
            RequestDetails::WriteMultipleRegisters(x) => x.failure(err),
            RequestDetails::MaskWriteRegister(x) => x.failure(err),
            RequestDetails::ReadWriteMultipleRegisters(x) => x.failure(err),
            RequestDetails::ReadFifoQueue(x) => x.failure(err),
            RequestDetails::ReadFileRecord(x) => x.failure(err),
            RequestDetails::WriteFileRecord(x) => x.failure(err),
        }
    }

    fn handle_response(self, cursor: ReadCursor) {
        match self {
            RequestDetails::ReadCoils(x) => x.handle_response(cursor),
            RequestDetails::ReadDiscreteInputs(x) => x.handle_response(cursor),
            RequestDetails::ReadHoldingRegisters(x) => x.handle_response(cursor),
            RequestDetails::ReadInputRegisters(x) => x.handle_response(cursor),
            RequestDetails::WriteSingleCoil(x) => x.handle_response(cursor),
            RequestDetails::WriteSingleRegister(x) => x.handle_response(cursor),
            RequestDetails::WriteMultipleCoils(x) => x.handle_response(cursor),
            RequestDetails::WriteMultipleRegisters(x) => x.handle_response(cursor),
            RequestDetails::MaskWriteRegister(x) => x.handle_response(cursor),
            RequestDetails::ReadWriteMultipleRegisters(x) => x.handle_response(cursor),
            RequestDetails::ReadFifoQueue(x) => x.handle_response(cursor),
            RequestDetails::ReadFileRecord(x) => x.handle_response(cursor),
            RequestDetails::WriteFileRecord(x) => x.handle_response(cursor),
        }
    }

    /// complete a broadcast write locally, there is no response to read
    ///
    /// read requests fail validation before anything is written to the wire
    pub(crate) fn complete_broadcast(self) {
        match self {
            RequestDetails::WriteSingleCoil(x) => x.complete_broadcast(),
            RequestDetails::WriteSingleRegister(x) => x.complete_broadcast(),
            RequestDetails::WriteMultipleCoils(x) => x.complete_broadcast(),
            RequestDetails::WriteMultipleRegisters(x) => x.complete_broadcast(),
            RequestDetails::MaskWriteRegister(x) => x.complete_broadcast(),
            RequestDetails::WriteFileRecord(x) => x.complete_broadcast(),
            other => other.fail(crate::error::InvalidRequest::BroadcastNotSupported.into()),
        }
    }
}

impl Serialize for RequestDetails {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), RequestError> {
        match self {
            RequestDetails::ReadCoils(x) => x.serialize(cursor),
            RequestDetails::ReadDiscreteInputs(x) => x.serialize(cursor),
            RequestDetails::ReadHoldingRegisters(x) => x.serialize(cursor),
            RequestDetails::ReadInputRegisters(x) => x.serialize(cursor),
            RequestDetails::WriteSingleCoil(x) => x.serialize(cursor),
            RequestDetails::WriteSingleRegister(x) => x.serialize(cursor),
            RequestDetails::WriteMultipleCoils(x) => x.serialize(cursor),
            RequestDetails::WriteMultipleRegisters(x) => x.serialize(cursor),
            RequestDetails::MaskWriteRegister(x) => x.serialize(cursor),
            RequestDetails::ReadWriteMultipleRegisters(x) => x.serialize(cursor),
            RequestDetails::ReadFifoQueue(x) => x.serialize(cursor),
            RequestDetails::ReadFileRecord(x) => x.serialize(cursor),
            RequestDetails::WriteFileRecord(x) => x.serialize(cursor),
        }
    }
}

impl Loggable for RequestDetails {
    fn log(
        &self,
        _bytes: &[u8],
        level: AppDecodeLevel,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        if level.data_headers() {
            write!(f, "{}", self.function())?;
        }
        Ok(())
    }
}
