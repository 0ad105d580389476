use std::time::Duration;

use tokio::sync::mpsc;

use crate::client::message::{Command, Request, RequestDetails, Setting};
use crate::client::requests::file_record::{self, FileRecordRead, FileRecordWrite};
use crate::client::requests::mask_write::MaskWriteRequest;
use crate::client::requests::read_bits::ReadBits;
use crate::client::requests::read_fifo::ReadFifo;
use crate::client::requests::read_registers::ReadRegisters;
use crate::client::requests::read_write_multiple::ReadWriteRegisters;
use crate::client::requests::write_multiple::MultipleWrite;
use crate::client::requests::write_single::SingleWrite;
use crate::client::requests::Promise;
use crate::decode::DecodeLevel;
use crate::error::{InvalidRequest, RequestError, Shutdown};
use crate::types::{
    AddressRange, FileRecord, Indexed, MaskWrite, ReadWriteMultiple, RecordReference,
    RegisterSpace, UnitId, WriteMultiple,
};
use crate::value::{self, Encoding};

/// Addressing and timeout parameters applied to a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestParam {
    /// Unit id of the target device
    pub id: UnitId,
    /// Response timeout for this request
    pub response_timeout: Duration,
}

impl RequestParam {
    /// Create a request parameter set
    pub fn new(id: UnitId, response_timeout: Duration) -> Self {
        Self {
            id,
            response_timeout,
        }
    }
}

/// Handle used to make requests against an underlying channel task
///
/// The channel is cloneable: clones share the underlying connection and their
/// requests are serialized in submission order. The value [Encoding] is a
/// property of the handle and is *not* shared with clones.
#[derive(Debug, Clone)]
pub struct Channel {
    pub(crate) tx: mpsc::Sender<Command>,
    pub(crate) encoding: Encoding,
}

impl Channel {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self {
            tx,
            encoding: Encoding::default(),
        }
    }

    /// Enable the channel, opening the transport and keeping it open
    pub async fn enable(&mut self) -> Result<(), Shutdown> {
        self.tx.send(Command::Setting(Setting::Enable)).await?;
        Ok(())
    }

    /// Disable the channel, closing the transport; in-flight and queued
    /// requests fail with a no-connection error
    pub async fn disable(&mut self) -> Result<(), Shutdown> {
        self.tx.send(Command::Setting(Setting::Disable)).await?;
        Ok(())
    }

    /// Change the decode level of the channel
    pub async fn set_decode_level(&mut self, level: DecodeLevel) -> Result<(), Shutdown> {
        self.tx
            .send(Command::Setting(Setting::DecodeLevel(level)))
            .await?;
        Ok(())
    }

    /// Set the byte/word order used by the multi-register value methods
    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    /// The byte/word order used by the multi-register value methods
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    async fn send(
        &mut self,
        param: RequestParam,
        details: RequestDetails,
    ) -> Result<(), RequestError> {
        let request = Request::new(param.id, param.response_timeout, details);
        self.tx
            .send(Command::Request(request))
            .await
            .map_err(|_| RequestError::Shutdown)
    }

    /// Read coils (function code 0x01)
    pub async fn read_coils(
        &mut self,
        param: RequestParam,
        range: AddressRange,
    ) -> Result<Vec<Indexed<bool>>, RequestError> {
        let range = range.of_read_bits()?;
        let (promise, rx) = Promise::channel();
        self.send(param, RequestDetails::ReadCoils(ReadBits::new(range, promise)))
            .await?;
        rx.await.map_err(|_| RequestError::Shutdown)?
    }

    /// Read discrete inputs (function code 0x02)
    pub async fn read_discrete_inputs(
        &mut self,
        param: RequestParam,
        range: AddressRange,
    ) -> Result<Vec<Indexed<bool>>, RequestError> {
        let range = range.of_read_bits()?;
        let (promise, rx) = Promise::channel();
        self.send(
            param,
            RequestDetails::ReadDiscreteInputs(ReadBits::new(range, promise)),
        )
        .await?;
        rx.await.map_err(|_| RequestError::Shutdown)?
    }

    /// Read holding registers (function code 0x03)
    pub async fn read_holding_registers(
        &mut self,
        param: RequestParam,
        range: AddressRange,
    ) -> Result<Vec<Indexed<u16>>, RequestError> {
        let range = range.of_read_registers()?;
        let (promise, rx) = Promise::channel();
        self.send(
            param,
            RequestDetails::ReadHoldingRegisters(ReadRegisters::new(range, promise)),
        )
        .await?;
        rx.await.map_err(|_| RequestError::Shutdown)?
    }

    /// Read input registers (function code 0x04)
    pub async fn read_input_registers(
        &mut self,
        param: RequestParam,
        range: AddressRange,
    ) -> Result<Vec<Indexed<u16>>, RequestError> {
        let range = range.of_read_registers()?;
        let (promise, rx) = Promise::channel();
        self.send(
            param,
            RequestDetails::ReadInputRegisters(ReadRegisters::new(range, promise)),
        )
        .await?;
        rx.await.map_err(|_| RequestError::Shutdown)?
    }

    /// Write a single coil (function code 0x05)
    pub async fn write_single_coil(
        &mut self,
        param: RequestParam,
        value: Indexed<bool>,
    ) -> Result<Indexed<bool>, RequestError> {
        let (promise, rx) = Promise::channel();
        self.send(
            param,
            RequestDetails::WriteSingleCoil(SingleWrite::new(value, promise)),
        )
        .await?;
        rx.await.map_err(|_| RequestError::Shutdown)?
    }

    /// Write a single holding register (function code 0x06)
    pub async fn write_single_register(
        &mut self,
        param: RequestParam,
        value: Indexed<u16>,
    ) -> Result<Indexed<u16>, RequestError> {
        let (promise, rx) = Promise::channel();
        self.send(
            param,
            RequestDetails::WriteSingleRegister(SingleWrite::new(value, promise)),
        )
        .await?;
        rx.await.map_err(|_| RequestError::Shutdown)?
    }

    /// Write multiple coils (function code 0x0F)
    pub async fn write_multiple_coils(
        &mut self,
        param: RequestParam,
        request: WriteMultiple<bool>,
    ) -> Result<AddressRange, RequestError> {
        let max = crate::constants::limits::MAX_WRITE_COILS_COUNT;
        if request.range().count > max {
            return Err(InvalidRequest::CountTooBigForType(request.range().count, max).into());
        }
        let (promise, rx) = Promise::channel();
        self.send(
            param,
            RequestDetails::WriteMultipleCoils(MultipleWrite::new(request, promise)),
        )
        .await?;
        rx.await.map_err(|_| RequestError::Shutdown)?
    }

    /// Write multiple holding registers (function code 0x10)
    pub async fn write_multiple_registers(
        &mut self,
        param: RequestParam,
        request: WriteMultiple<u16>,
    ) -> Result<AddressRange, RequestError> {
        let max = crate::constants::limits::MAX_WRITE_REGISTERS_COUNT;
        if request.range().count > max {
            return Err(InvalidRequest::CountTooBigForType(request.range().count, max).into());
        }
        let (promise, rx) = Promise::channel();
        self.send(
            param,
            RequestDetails::WriteMultipleRegisters(MultipleWrite::new(request, promise)),
        )
        .await?;
        rx.await.map_err(|_| RequestError::Shutdown)?
    }

    /// Apply an AND mask and an OR mask to a holding register (function code 0x16)
    pub async fn mask_write_register(
        &mut self,
        param: RequestParam,
        request: MaskWrite,
    ) -> Result<MaskWrite, RequestError> {
        let (promise, rx) = Promise::channel();
        self.send(
            param,
            RequestDetails::MaskWriteRegister(MaskWriteRequest::new(request, promise)),
        )
        .await?;
        rx.await.map_err(|_| RequestError::Shutdown)?
    }

    /// Write then read holding registers in a single transaction (function code 0x17)
    pub async fn read_write_multiple_registers(
        &mut self,
        param: RequestParam,
        request: ReadWriteMultiple,
    ) -> Result<Vec<Indexed<u16>>, RequestError> {
        let (promise, rx) = Promise::channel();
        self.send(
            param,
            RequestDetails::ReadWriteMultipleRegisters(ReadWriteRegisters::new(request, promise)),
        )
        .await?;
        rx.await.map_err(|_| RequestError::Shutdown)?
    }

    /// Read the FIFO queue attached to an address (function code 0x18)
    pub async fn read_fifo_queue(
        &mut self,
        param: RequestParam,
        address: u16,
    ) -> Result<Vec<u16>, RequestError> {
        let (promise, rx) = Promise::channel();
        self.send(
            param,
            RequestDetails::ReadFifoQueue(ReadFifo::new(address, promise)),
        )
        .await?;
        rx.await.map_err(|_| RequestError::Shutdown)?
    }

    /// Read one or more file records (function code 0x14)
    pub async fn read_file_record(
        &mut self,
        param: RequestParam,
        references: Vec<RecordReference>,
    ) -> Result<Vec<FileRecord>, RequestError> {
        file_record::validate_read_request(&references)?;
        let (promise, rx) = Promise::channel();
        self.send(
            param,
            RequestDetails::ReadFileRecord(FileRecordRead::new(references, promise)),
        )
        .await?;
        rx.await.map_err(|_| RequestError::Shutdown)?
    }

    /// Write one or more file records (function code 0x15)
    pub async fn write_file_record(
        &mut self,
        param: RequestParam,
        records: Vec<FileRecord>,
    ) -> Result<(), RequestError> {
        file_record::validate_write_request(&records)?;
        let (promise, rx) = Promise::channel();
        self.send(
            param,
            RequestDetails::WriteFileRecord(FileRecordWrite::new(records, promise)),
        )
        .await?;
        rx.await.map_err(|_| RequestError::Shutdown)?
    }

    /// Read `count` 32-bit integers, each spanning two consecutive registers
    pub async fn read_u32s(
        &mut self,
        param: RequestParam,
        start: u16,
        count: u16,
        space: RegisterSpace,
    ) -> Result<Vec<u32>, RequestError> {
        let bytes = self.read_value_bytes(param, start, count, 2, space).await?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| value::u32_from_bytes(self.encoding, [c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Read `count` 64-bit integers, each spanning four consecutive registers
    pub async fn read_u64s(
        &mut self,
        param: RequestParam,
        start: u16,
        count: u16,
        space: RegisterSpace,
    ) -> Result<Vec<u64>, RequestError> {
        let bytes = self.read_value_bytes(param, start, count, 4, space).await?;
        Ok(bytes
            .chunks_exact(8)
            .map(|c| {
                value::u64_from_bytes(
                    self.encoding,
                    [c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]],
                )
            })
            .collect())
    }

    /// Read `count` 32-bit floats, each spanning two consecutive registers
    pub async fn read_f32s(
        &mut self,
        param: RequestParam,
        start: u16,
        count: u16,
        space: RegisterSpace,
    ) -> Result<Vec<f32>, RequestError> {
        Ok(self
            .read_u32s(param, start, count, space)
            .await?
            .into_iter()
            .map(f32::from_bits)
            .collect())
    }

    /// Read `count` 64-bit floats, each spanning four consecutive registers
    pub async fn read_f64s(
        &mut self,
        param: RequestParam,
        start: u16,
        count: u16,
        space: RegisterSpace,
    ) -> Result<Vec<f64>, RequestError> {
        Ok(self
            .read_u64s(param, start, count, space)
            .await?
            .into_iter()
            .map(f64::from_bits)
            .collect())
    }

    /// Write a 32-bit integer across two consecutive holding registers
    pub async fn write_u32(
        &mut self,
        param: RequestParam,
        start: u16,
        value: u32,
    ) -> Result<(), RequestError> {
        let registers =
            value::wire_bytes_to_registers(&value::u32_to_bytes(self.encoding, value));
        self.write_value_registers(param, start, registers).await
    }

    /// Write a 64-bit integer across four consecutive holding registers
    pub async fn write_u64(
        &mut self,
        param: RequestParam,
        start: u16,
        value: u64,
    ) -> Result<(), RequestError> {
        let registers =
            value::wire_bytes_to_registers(&value::u64_to_bytes(self.encoding, value));
        self.write_value_registers(param, start, registers).await
    }

    /// Write a 32-bit float across two consecutive holding registers
    pub async fn write_f32(
        &mut self,
        param: RequestParam,
        start: u16,
        value: f32,
    ) -> Result<(), RequestError> {
        self.write_u32(param, start, value.to_bits()).await
    }

    /// Write a 64-bit float across four consecutive holding registers
    pub async fn write_f64(
        &mut self,
        param: RequestParam,
        start: u16,
        value: f64,
    ) -> Result<(), RequestError> {
        self.write_u64(param, start, value.to_bits()).await
    }

    async fn read_value_bytes(
        &mut self,
        param: RequestParam,
        start: u16,
        count: u16,
        registers_per_value: u16,
        space: RegisterSpace,
    ) -> Result<Vec<u8>, RequestError> {
        let register_count = count
            .checked_mul(registers_per_value)
            .ok_or(InvalidRequest::CountTooBigForU16(
                count as usize * registers_per_value as usize,
            ))?;
        let range = AddressRange::try_from(start, register_count)?;
        let indexed = match space {
            RegisterSpace::Holding => self.read_holding_registers(param, range).await?,
            RegisterSpace::Input => self.read_input_registers(param, range).await?,
        };
        let words: Vec<u16> = indexed.into_iter().map(|x| x.value).collect();
        Ok(value::registers_to_wire_bytes(&words))
    }

    async fn write_value_registers(
        &mut self,
        param: RequestParam,
        start: u16,
        registers: Vec<u16>,
    ) -> Result<(), RequestError> {
        let request = WriteMultiple::from(start, registers)?;
        self.write_multiple_registers(param, request).await?;
        Ok(())
    }
}
