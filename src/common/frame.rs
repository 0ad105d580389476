use crate::common::buffer::ReadBuffer;
use crate::common::cursor::WriteCursor;
use crate::common::function::FunctionCode;
use crate::common::phys::PhysLayer;
use crate::common::traits::{Loggable, LoggableDisplay, Serialize};
use crate::decode::DecodeLevel;
use crate::error::RequestError;
use crate::types::UnitId;

pub(crate) mod constants {
    /// the maximum size of a PDU, including the function code
    pub(crate) const MAX_ADU_LENGTH: usize = 253;
    /// the largest frame any transport can produce (MBAP header + ADU)
    pub(crate) const MAX_FRAME_LENGTH: usize = crate::tcp::frame::constants::MAX_FRAME_LENGTH;
}

#[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
pub(crate) struct TxId {
    value: u16,
}

impl TxId {
    pub(crate) fn new(value: u16) -> Self {
        TxId { value }
    }

    pub(crate) fn to_u16(self) -> u16 {
        self.value
    }

    pub(crate) fn next(&mut self) -> TxId {
        let ret = self.value;
        self.value = self.value.wrapping_add(1);
        TxId::new(ret)
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:#06X}", self.value)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct FrameHeader {
    pub(crate) unit_id: UnitId,
    /// transaction ids are only present on TCP/TLS framing
    pub(crate) tx_id: Option<TxId>,
}

impl FrameHeader {
    pub(crate) fn new_tcp_header(unit_id: UnitId, tx_id: TxId) -> Self {
        FrameHeader {
            unit_id,
            tx_id: Some(tx_id),
        }
    }

    pub(crate) fn new_rtu_header(unit_id: UnitId) -> Self {
        FrameHeader {
            unit_id,
            tx_id: None,
        }
    }
}

#[derive(PartialEq, Debug)]
pub(crate) struct Frame {
    pub(crate) header: FrameHeader,
    length: usize,
    adu: [u8; constants::MAX_ADU_LENGTH],
}

impl Frame {
    pub(crate) fn new(header: FrameHeader) -> Frame {
        Frame {
            header,
            length: 0,
            adu: [0; constants::MAX_ADU_LENGTH],
        }
    }

    pub(crate) fn set(&mut self, src: &[u8]) -> bool {
        if src.len() > self.adu.len() {
            return false;
        }

        self.adu[0..src.len()].copy_from_slice(src);
        self.length = src.len();
        true
    }

    pub(crate) fn payload(&self) -> &[u8] {
        &self.adu[0..self.length]
    }
}

/// the function code byte as it appears on the wire, which may carry the
/// exception bit or be entirely unknown to the library
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum FunctionField {
    Valid(FunctionCode),
    Exception(FunctionCode),
    UnknownFunction(u8),
}

impl FunctionField {
    pub(crate) fn get_value(self) -> u8 {
        match self {
            FunctionField::Valid(x) => x.get_value(),
            FunctionField::Exception(x) => x.as_error(),
            FunctionField::UnknownFunction(x) => x | 0x80,
        }
    }
}

impl std::fmt::Display for FunctionField {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FunctionField::Valid(x) => write!(f, "{x}"),
            FunctionField::Exception(x) => write!(f, "EXCEPTION: {x}"),
            FunctionField::UnknownFunction(x) => write!(f, "UNKNOWN FUNCTION ({x:#04X})"),
        }
    }
}

enum ParserType {
    Mbap(crate::tcp::frame::MbapParser),
    #[cfg(feature = "serial")]
    Rtu(crate::serial::frame::RtuParser),
}

/// Reads complete frames off a physical layer, transport-agnostic above this
/// point
pub(crate) struct FramedReader {
    parser: ParserType,
    buffer: ReadBuffer,
}

impl FramedReader {
    pub(crate) fn tcp() -> Self {
        Self::new(ParserType::Mbap(crate::tcp::frame::MbapParser::new()))
    }

    #[cfg(feature = "serial")]
    pub(crate) fn rtu_request() -> Self {
        Self::new(ParserType::Rtu(
            crate::serial::frame::RtuParser::new_request_parser(),
        ))
    }

    #[cfg(feature = "serial")]
    pub(crate) fn rtu_response() -> Self {
        Self::new(ParserType::Rtu(
            crate::serial::frame::RtuParser::new_response_parser(),
        ))
    }

    fn new(parser: ParserType) -> Self {
        let size = match &parser {
            ParserType::Mbap(_) => crate::tcp::frame::constants::MAX_FRAME_LENGTH,
            #[cfg(feature = "serial")]
            ParserType::Rtu(_) => crate::serial::frame::constants::MAX_FRAME_LENGTH,
        };
        Self {
            parser,
            buffer: ReadBuffer::new(size),
        }
    }

    /// discard any accumulated data and reset the parser state
    pub(crate) fn reset(&mut self) {
        self.buffer.clear();
        match &mut self.parser {
            ParserType::Mbap(x) => x.reset(),
            #[cfg(feature = "serial")]
            ParserType::Rtu(x) => x.reset(),
        }
    }

    pub(crate) async fn next_frame(
        &mut self,
        io: &mut PhysLayer,
        level: DecodeLevel,
    ) -> Result<Frame, RequestError> {
        loop {
            let result = match &mut self.parser {
                ParserType::Mbap(x) => x.parse(&mut self.buffer, level.frame),
                #[cfg(feature = "serial")]
                ParserType::Rtu(x) => x.parse(&mut self.buffer, level.frame),
            };

            match result? {
                Some(frame) => return Ok(frame),
                None => {
                    self.buffer.read_some(io).await?;
                }
            }
        }
    }
}

enum FormatType {
    Mbap,
    #[cfg(feature = "serial")]
    Rtu,
}

/// Formats frames for a particular transport into an internal buffer
pub(crate) struct FrameWriter {
    format_type: FormatType,
    buffer: [u8; constants::MAX_FRAME_LENGTH],
}

impl FrameWriter {
    pub(crate) fn tcp() -> Self {
        Self::new(FormatType::Mbap)
    }

    #[cfg(feature = "serial")]
    pub(crate) fn rtu() -> Self {
        Self::new(FormatType::Rtu)
    }

    fn new(format_type: FormatType) -> Self {
        Self {
            format_type,
            buffer: [0; constants::MAX_FRAME_LENGTH],
        }
    }

    pub(crate) fn format<T>(
        &mut self,
        header: FrameHeader,
        function: FunctionField,
        body: &T,
        level: DecodeLevel,
    ) -> Result<&[u8], RequestError>
    where
        T: Serialize + Loggable + ?Sized,
    {
        let info = match self.format_type {
            FormatType::Mbap => {
                crate::tcp::frame::format_mbap(&mut self.buffer, header, function, body, level)?
            }
            #[cfg(feature = "serial")]
            FormatType::Rtu => {
                crate::serial::frame::format_rtu(&mut self.buffer, header, function, body, level)?
            }
        };

        if level.app.enabled() {
            tracing::info!(
                "PDU TX - {} {}",
                function,
                LoggableDisplay::new(body, &self.buffer[info.pdu_body.clone()], level.app)
            );
        }

        Ok(&self.buffer[..info.end])
    }
}

/// byte ranges of a formatted frame within the writer's buffer
pub(crate) struct FormattedFrame {
    /// end of the complete frame
    pub(crate) end: usize,
    /// range of the PDU body (after the function code)
    pub(crate) pdu_body: std::ops::Range<usize>,
}

/// writes the function code followed by the serialized body and returns the
/// range of the PDU body
pub(crate) fn write_pdu(
    cursor: &mut WriteCursor,
    function: FunctionField,
    body: &(impl Serialize + ?Sized),
) -> Result<std::ops::Range<usize>, RequestError> {
    cursor.write_u8(function.get_value())?;
    let start = cursor.position();
    body.serialize(cursor)?;
    Ok(start..cursor.position())
}
