use crate::common::cursor::ReadCursor;
use crate::common::frame::{FrameHeader, FrameWriter, FunctionField};
use crate::common::function::FunctionCode;
use crate::common::traits::Parse;
use crate::decode::{AppDecodeLevel, DecodeLevel};
use crate::error::RequestError;
use crate::exception::ExceptionCode;
use crate::server::handler::{
    CoilsRequest, DiscreteInputsRequest, HoldingRegistersRequest, InputRegistersRequest,
    RequestHandler,
};
use crate::types::{
    AddressRange, BitIterator, BitIteratorDisplay, Indexed, MaskWrite, ReadBitsRange,
    ReadRegistersRange, RegisterIterator, RegisterIteratorDisplay,
};

/// Write request to the coil space with its lazily-parsed values
#[derive(Debug, Copy, Clone)]
pub(crate) struct WriteCoils<'a> {
    pub(crate) range: AddressRange,
    pub(crate) iterator: BitIterator<'a>,
}

impl<'a> WriteCoils<'a> {
    pub(crate) fn new(range: AddressRange, iterator: BitIterator<'a>) -> Self {
        Self { range, iterator }
    }
}

/// Write request to the holding register space with its lazily-parsed values
#[derive(Debug, Copy, Clone)]
pub(crate) struct WriteRegisters<'a> {
    pub(crate) range: AddressRange,
    pub(crate) iterator: RegisterIterator<'a>,
}

impl<'a> WriteRegisters<'a> {
    pub(crate) fn new(range: AddressRange, iterator: RegisterIterator<'a>) -> Self {
        Self { range, iterator }
    }
}

/// Combined write-then-read request of the holding register space
#[derive(Debug, Copy, Clone)]
pub(crate) struct ReadWriteRequest<'a> {
    pub(crate) read_range: ReadRegistersRange,
    pub(crate) write_range: AddressRange,
    pub(crate) iterator: RegisterIterator<'a>,
}

#[derive(Debug)]
pub(crate) enum Request<'a> {
    ReadCoils(ReadBitsRange),
    ReadDiscreteInputs(ReadBitsRange),
    ReadHoldingRegisters(ReadRegistersRange),
    ReadInputRegisters(ReadRegistersRange),
    WriteSingleCoil(Indexed<bool>),
    WriteSingleRegister(Indexed<u16>),
    WriteMultipleCoils(WriteCoils<'a>),
    WriteMultipleRegisters(WriteRegisters<'a>),
    MaskWriteRegister(MaskWrite),
    ReadWriteMultipleRegisters(ReadWriteRequest<'a>),
}

/// All requests that may be broadcast on a serial line
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub(crate) enum BroadcastRequest<'a> {
    WriteSingleCoil(Indexed<bool>),
    WriteSingleRegister(Indexed<u16>),
    WriteMultipleCoils(WriteCoils<'a>),
    WriteMultipleRegisters(WriteRegisters<'a>),
}

impl BroadcastRequest<'_> {
    // execute a broadcast request against the handler, discarding the outcome
    pub(crate) fn execute<T: RequestHandler>(
        self,
        unit_id: crate::types::UnitId,
        handler: &mut T,
        role: Option<&str>,
    ) {
        let role = role.map(|x| x.to_string());
        match self {
            BroadcastRequest::WriteSingleCoil(x) => {
                let request = CoilsRequest {
                    unit_id,
                    range: AddressRange {
                        start: x.index,
                        count: 1,
                    },
                    is_write: true,
                    values: vec![x.value],
                    client_role: role,
                };
                let _ = handler.handle_coils(&request);
            }
            BroadcastRequest::WriteSingleRegister(x) => {
                let request = HoldingRegistersRequest {
                    unit_id,
                    range: AddressRange {
                        start: x.index,
                        count: 1,
                    },
                    is_write: true,
                    values: vec![x.value],
                    client_role: role,
                };
                let _ = handler.handle_holding_registers(&request);
            }
            BroadcastRequest::WriteMultipleCoils(x) => {
                let request = CoilsRequest {
                    unit_id,
                    range: x.range,
                    is_write: true,
                    values: x.iterator.map(|i| i.value).collect(),
                    client_role: role,
                };
                let _ = handler.handle_coils(&request);
            }
            BroadcastRequest::WriteMultipleRegisters(x) => {
                let request = HoldingRegistersRequest {
                    unit_id,
                    range: x.range,
                    is_write: true,
                    values: x.iterator.map(|i| i.value).collect(),
                    client_role: role,
                };
                let _ = handler.handle_holding_registers(&request);
            }
        }
    }
}

fn read_holding_register<T: RequestHandler>(
    handler: &mut T,
    unit_id: crate::types::UnitId,
    address: u16,
    role: Option<&str>,
) -> Result<u16, ExceptionCode> {
    let request = HoldingRegistersRequest {
        unit_id,
        range: AddressRange {
            start: address,
            count: 1,
        },
        is_write: false,
        values: Vec::new(),
        client_role: role.map(|x| x.to_string()),
    };
    let values = handler.handle_holding_registers(&request)?;
    match values.as_slice() {
        [single] => Ok(*single),
        _ => Err(ExceptionCode::ServerDeviceFailure),
    }
}

fn write_holding_registers<T: RequestHandler>(
    handler: &mut T,
    unit_id: crate::types::UnitId,
    range: AddressRange,
    values: Vec<u16>,
    role: Option<&str>,
) -> Result<(), ExceptionCode> {
    let request = HoldingRegistersRequest {
        unit_id,
        range,
        is_write: true,
        values,
        client_role: role.map(|x| x.to_string()),
    };
    handler.handle_holding_registers(&request)?;
    Ok(())
}

/// the handler must return exactly one value per requested address
fn expect_count<V>(count: u16, values: Vec<V>) -> Result<Vec<V>, ExceptionCode> {
    if values.len() != count as usize {
        tracing::warn!(
            "handler returned {} values for a request of {}",
            values.len(),
            count
        );
        return Err(ExceptionCode::ServerDeviceFailure);
    }
    Ok(values)
}

impl<'a> Request<'a> {
    pub(crate) fn get_function(&self) -> FunctionCode {
        match self {
            Request::ReadCoils(_) => FunctionCode::ReadCoils,
            Request::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            Request::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Request::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            Request::WriteSingleCoil(_) => FunctionCode::WriteSingleCoil,
            Request::WriteSingleRegister(_) => FunctionCode::WriteSingleRegister,
            Request::WriteMultipleCoils(_) => FunctionCode::WriteMultipleCoils,
            Request::WriteMultipleRegisters(_) => FunctionCode::WriteMultipleRegisters,
            Request::MaskWriteRegister(_) => FunctionCode::MaskWriteRegister,
            Request::ReadWriteMultipleRegisters(_) => FunctionCode::ReadWriteMultipleRegisters,
        }
    }

    pub(crate) fn into_broadcast_request(self) -> Option<BroadcastRequest<'a>> {
        match self {
            Request::WriteSingleCoil(x) => Some(BroadcastRequest::WriteSingleCoil(x)),
            Request::WriteSingleRegister(x) => Some(BroadcastRequest::WriteSingleRegister(x)),
            Request::WriteMultipleCoils(x) => Some(BroadcastRequest::WriteMultipleCoils(x)),
            Request::WriteMultipleRegisters(x) => Some(BroadcastRequest::WriteMultipleRegisters(x)),
            _ => None,
        }
    }

    pub(crate) fn get_reply<'b, T: RequestHandler>(
        &self,
        header: FrameHeader,
        handler: &mut T,
        role: Option<&str>,
        writer: &'b mut FrameWriter,
        level: DecodeLevel,
    ) -> Result<&'b [u8], RequestError> {
        let function = self.get_function();
        let unit_id = header.unit_id;
        let client_role = role.map(|x| x.to_string());

        match self {
            Request::ReadCoils(range) => {
                let request = CoilsRequest {
                    unit_id,
                    range: range.get(),
                    is_write: false,
                    values: Vec::new(),
                    client_role,
                };
                let result = handler
                    .handle_coils(&request)
                    .and_then(|values| expect_count(range.get().count, values));
                match result {
                    Ok(values) => writer.format(
                        header,
                        FunctionField::Valid(function),
                        values.as_slice(),
                        level,
                    ),
                    Err(ex) => writer.format(header, FunctionField::Exception(function), &ex, level),
                }
            }
            Request::ReadDiscreteInputs(range) => {
                let request = DiscreteInputsRequest {
                    unit_id,
                    range: range.get(),
                    client_role,
                };
                let result = handler
                    .handle_discrete_inputs(&request)
                    .and_then(|values| expect_count(range.get().count, values));
                match result {
                    Ok(values) => writer.format(
                        header,
                        FunctionField::Valid(function),
                        values.as_slice(),
                        level,
                    ),
                    Err(ex) => writer.format(header, FunctionField::Exception(function), &ex, level),
                }
            }
            Request::ReadHoldingRegisters(range) => {
                let request = HoldingRegistersRequest {
                    unit_id,
                    range: range.get(),
                    is_write: false,
                    values: Vec::new(),
                    client_role,
                };
                let result = handler
                    .handle_holding_registers(&request)
                    .and_then(|values| expect_count(range.get().count, values));
                match result {
                    Ok(values) => writer.format(
                        header,
                        FunctionField::Valid(function),
                        values.as_slice(),
                        level,
                    ),
                    Err(ex) => writer.format(header, FunctionField::Exception(function), &ex, level),
                }
            }
            Request::ReadInputRegisters(range) => {
                let request = InputRegistersRequest {
                    unit_id,
                    range: range.get(),
                    client_role,
                };
                let result = handler
                    .handle_input_registers(&request)
                    .and_then(|values| expect_count(range.get().count, values));
                match result {
                    Ok(values) => writer.format(
                        header,
                        FunctionField::Valid(function),
                        values.as_slice(),
                        level,
                    ),
                    Err(ex) => writer.format(header, FunctionField::Exception(function), &ex, level),
                }
            }
            Request::WriteSingleCoil(value) => {
                let request = CoilsRequest {
                    unit_id,
                    range: AddressRange {
                        start: value.index,
                        count: 1,
                    },
                    is_write: true,
                    values: vec![value.value],
                    client_role,
                };
                match handler.handle_coils(&request) {
                    Ok(_) => writer.format(header, FunctionField::Valid(function), value, level),
                    Err(ex) => writer.format(header, FunctionField::Exception(function), &ex, level),
                }
            }
            Request::WriteSingleRegister(value) => {
                let request = HoldingRegistersRequest {
                    unit_id,
                    range: AddressRange {
                        start: value.index,
                        count: 1,
                    },
                    is_write: true,
                    values: vec![value.value],
                    client_role,
                };
                match handler.handle_holding_registers(&request) {
                    Ok(_) => writer.format(header, FunctionField::Valid(function), value, level),
                    Err(ex) => writer.format(header, FunctionField::Exception(function), &ex, level),
                }
            }
            Request::WriteMultipleCoils(items) => {
                let request = CoilsRequest {
                    unit_id,
                    range: items.range,
                    is_write: true,
                    values: items.iterator.map(|x| x.value).collect(),
                    client_role,
                };
                match handler.handle_coils(&request) {
                    Ok(_) => {
                        writer.format(header, FunctionField::Valid(function), &items.range, level)
                    }
                    Err(ex) => writer.format(header, FunctionField::Exception(function), &ex, level),
                }
            }
            Request::WriteMultipleRegisters(items) => {
                let request = HoldingRegistersRequest {
                    unit_id,
                    range: items.range,
                    is_write: true,
                    values: items.iterator.map(|x| x.value).collect(),
                    client_role,
                };
                match handler.handle_holding_registers(&request) {
                    Ok(_) => {
                        writer.format(header, FunctionField::Valid(function), &items.range, level)
                    }
                    Err(ex) => writer.format(header, FunctionField::Exception(function), &ex, level),
                }
            }
            Request::MaskWriteRegister(mask) => {
                // read-modify-write through the handler
                let result = read_holding_register(handler, unit_id, mask.address, role).and_then(
                    |current| {
                        let value = (current & mask.and_mask) | (mask.or_mask & !mask.and_mask);
                        write_holding_registers(
                            handler,
                            unit_id,
                            AddressRange {
                                start: mask.address,
                                count: 1,
                            },
                            vec![value],
                            role,
                        )
                    },
                );
                match result {
                    Ok(()) => writer.format(header, FunctionField::Valid(function), mask, level),
                    Err(ex) => writer.format(header, FunctionField::Exception(function), &ex, level),
                }
            }
            Request::ReadWriteMultipleRegisters(request) => {
                // the write is performed before the read
                let write_result = write_holding_registers(
                    handler,
                    unit_id,
                    request.write_range,
                    request.iterator.map(|x| x.value).collect(),
                    role,
                );
                let result = write_result.and_then(|()| {
                    let read = HoldingRegistersRequest {
                        unit_id,
                        range: request.read_range.get(),
                        is_write: false,
                        values: Vec::new(),
                        client_role,
                    };
                    handler
                        .handle_holding_registers(&read)
                        .and_then(|values| expect_count(request.read_range.get().count, values))
                });
                match result {
                    Ok(values) => writer.format(
                        header,
                        FunctionField::Valid(function),
                        values.as_slice(),
                        level,
                    ),
                    Err(ex) => writer.format(header, FunctionField::Exception(function), &ex, level),
                }
            }
        }
    }

    pub(crate) fn parse(
        function: FunctionCode,
        cursor: &'a mut ReadCursor,
    ) -> Result<Self, RequestError> {
        match function {
            FunctionCode::ReadCoils => {
                let x = Request::ReadCoils(AddressRange::parse(cursor)?.of_read_bits()?);
                cursor.expect_empty()?;
                Ok(x)
            }
            FunctionCode::ReadDiscreteInputs => {
                let x = Request::ReadDiscreteInputs(AddressRange::parse(cursor)?.of_read_bits()?);
                cursor.expect_empty()?;
                Ok(x)
            }
            FunctionCode::ReadHoldingRegisters => {
                let x = Request::ReadHoldingRegisters(
                    AddressRange::parse(cursor)?.of_read_registers()?,
                );
                cursor.expect_empty()?;
                Ok(x)
            }
            FunctionCode::ReadInputRegisters => {
                let x =
                    Request::ReadInputRegisters(AddressRange::parse(cursor)?.of_read_registers()?);
                cursor.expect_empty()?;
                Ok(x)
            }
            FunctionCode::WriteSingleCoil => {
                let x = Request::WriteSingleCoil(Indexed::<bool>::parse(cursor)?);
                cursor.expect_empty()?;
                Ok(x)
            }
            FunctionCode::WriteSingleRegister => {
                let x = Request::WriteSingleRegister(Indexed::<u16>::parse(cursor)?);
                cursor.expect_empty()?;
                Ok(x)
            }
            FunctionCode::WriteMultipleCoils => {
                let range = AddressRange::parse(cursor)?;
                // the byte count is validated b/c all bytes must be consumed
                cursor.read_u8()?;
                Ok(Request::WriteMultipleCoils(WriteCoils::new(
                    range,
                    BitIterator::parse_all(range, cursor)?,
                )))
            }
            FunctionCode::WriteMultipleRegisters => {
                let range = AddressRange::parse(cursor)?;
                // the byte count is validated b/c all bytes must be consumed
                cursor.read_u8()?;
                Ok(Request::WriteMultipleRegisters(WriteRegisters::new(
                    range,
                    RegisterIterator::parse_all(range, cursor)?,
                )))
            }
            FunctionCode::MaskWriteRegister => {
                let x = Request::MaskWriteRegister(MaskWrite::parse(cursor)?);
                cursor.expect_empty()?;
                Ok(x)
            }
            FunctionCode::ReadWriteMultipleRegisters => {
                let read_range = AddressRange::parse(cursor)?.of_read_registers()?;
                let write_range = AddressRange::parse(cursor)?;
                cursor.read_u8()?;
                Ok(Request::ReadWriteMultipleRegisters(ReadWriteRequest {
                    read_range,
                    write_range,
                    iterator: RegisterIterator::parse_all(write_range, cursor)?,
                }))
            }
            // the remaining codes address spaces the handler interface does
            // not expose, the session answers them with IllegalFunction
            FunctionCode::ReadFileRecord
            | FunctionCode::WriteFileRecord
            | FunctionCode::ReadFifoQueue => Err(RequestError::Exception(
                ExceptionCode::IllegalFunction,
            )),
        }
    }
}

pub(crate) struct RequestDisplay<'a, 'b> {
    request: &'a Request<'b>,
    level: AppDecodeLevel,
}

impl<'a, 'b> RequestDisplay<'a, 'b> {
    pub(crate) fn new(level: AppDecodeLevel, request: &'a Request<'b>) -> Self {
        Self { request, level }
    }
}

impl std::fmt::Display for RequestDisplay<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.request.get_function())?;

        if self.level.data_headers() {
            match self.request {
                Request::ReadCoils(range) => {
                    write!(f, " {}", range.get())?;
                }
                Request::ReadDiscreteInputs(range) => {
                    write!(f, " {}", range.get())?;
                }
                Request::ReadHoldingRegisters(range) => {
                    write!(f, " {}", range.get())?;
                }
                Request::ReadInputRegisters(range) => {
                    write!(f, " {}", range.get())?;
                }
                Request::WriteSingleCoil(request) => {
                    write!(f, " {request}")?;
                }
                Request::WriteSingleRegister(request) => {
                    write!(f, " {request}")?;
                }
                Request::WriteMultipleCoils(items) => {
                    write!(f, " {}", BitIteratorDisplay::new(self.level, items.iterator))?;
                }
                Request::WriteMultipleRegisters(items) => {
                    write!(
                        f,
                        " {}",
                        RegisterIteratorDisplay::new(self.level, items.iterator)
                    )?;
                }
                Request::MaskWriteRegister(request) => {
                    write!(f, " {request}")?;
                }
                Request::ReadWriteMultipleRegisters(request) => {
                    write!(
                        f,
                        " read: {} write: {}",
                        request.read_range.get(),
                        request.write_range
                    )?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AduParseError;

    #[test]
    fn fails_when_too_few_bytes_for_coil_byte_count() {
        let mut cursor = ReadCursor::new(&[0x00, 0x01, 0x00, 0x08, 0x00]);
        let err = Request::parse(FunctionCode::WriteMultipleCoils, &mut cursor)
            .err()
            .unwrap();
        assert_eq!(err, AduParseError::InsufficientBytes.into());
    }

    #[test]
    fn fails_when_too_many_bytes_present() {
        let mut cursor = ReadCursor::new(&[0x00, 0x01, 0x00, 0x08, 0x01, 0xFF, 0xFF]);
        let err = Request::parse(FunctionCode::WriteMultipleCoils, &mut cursor)
            .err()
            .unwrap();
        assert_eq!(err, AduParseError::TrailingBytes(1).into());
    }

    #[test]
    fn can_parse_write_multiple_coils() {
        let mut cursor = ReadCursor::new(&[0x00, 0x01, 0x00, 0x03, 0x01, 0x05]);
        let coils = match Request::parse(FunctionCode::WriteMultipleCoils, &mut cursor).unwrap() {
            Request::WriteMultipleCoils(write) => write,
            _ => panic!("bad match"),
        };

        assert_eq!(coils.range, AddressRange::try_from(1, 3).unwrap());
        assert_eq!(
            coils.iterator.collect::<Vec<Indexed<bool>>>(),
            vec![
                Indexed::new(1, true),
                Indexed::new(2, false),
                Indexed::new(3, true)
            ]
        )
    }

    #[test]
    fn can_parse_write_multiple_registers() {
        let mut cursor = ReadCursor::new(&[0x00, 0x01, 0x00, 0x02, 0x04, 0xCA, 0xFE, 0xBB, 0xDD]);
        let registers =
            match Request::parse(FunctionCode::WriteMultipleRegisters, &mut cursor).unwrap() {
                Request::WriteMultipleRegisters(write) => write,
                _ => panic!("bad match"),
            };

        assert_eq!(registers.range, AddressRange::try_from(1, 2).unwrap());
        assert_eq!(
            registers.iterator.collect::<Vec<Indexed<u16>>>(),
            vec![Indexed::new(1, 0xCAFE), Indexed::new(2, 0xBBDD)]
        )
    }

    #[test]
    fn can_parse_read_write_multiple_registers() {
        let mut cursor = ReadCursor::new(&[
            0x00, 0x10, 0x00, 0x02, // read range
            0x00, 0x20, 0x00, 0x01, // write range
            0x02, 0xCA, 0xFE, // write values
        ]);
        let request =
            match Request::parse(FunctionCode::ReadWriteMultipleRegisters, &mut cursor).unwrap() {
                Request::ReadWriteMultipleRegisters(x) => x,
                _ => panic!("bad match"),
            };

        assert_eq!(
            request.read_range.get(),
            AddressRange::try_from(0x10, 2).unwrap()
        );
        assert_eq!(request.write_range, AddressRange::try_from(0x20, 1).unwrap());
        assert_eq!(
            request.iterator.collect::<Vec<Indexed<u16>>>(),
            vec![Indexed::new(0x20, 0xCAFE)]
        );
    }

    #[test]
    fn fifo_and_file_record_codes_yield_illegal_function() {
        for function in [
            FunctionCode::ReadFifoQueue,
            FunctionCode::ReadFileRecord,
            FunctionCode::WriteFileRecord,
        ] {
            let mut cursor = ReadCursor::new(&[0x00, 0x00]);
            assert_eq!(
                Request::parse(function, &mut cursor).err().unwrap(),
                RequestError::Exception(ExceptionCode::IllegalFunction)
            );
        }
    }
}
