use crate::exception::ExceptionCode;

/// The task has terminated and can no longer process requests
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Shutdown;

impl std::fmt::Display for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("task shutdown")
    }
}

impl std::error::Error for Shutdown {}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Shutdown {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Shutdown
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Shutdown {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Shutdown
    }
}

/// Errors that can be produced when making a request
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RequestError {
    /// An I/O error occurred on the underlying stream
    Io(std::io::ErrorKind),
    /// The server responded with an exception
    Exception(ExceptionCode),
    /// The request was invalid before anything was written to the wire
    BadRequest(InvalidRequest),
    /// Unable to parse a frame off the wire
    BadFrame(FrameParseError),
    /// The response ADU was invalid
    BadResponse(AduParseError),
    /// The response transaction id did not match the request
    BadTransactionId(u16, u16),
    /// The response unit id did not match the request
    BadUnitId(u8, u8),
    /// An internal error occurred in the library itself
    ///
    /// These errors should never happen, but are trapped here for reporting purposes
    Internal(InternalError),
    /// Timeout occurred before receiving a response from the server
    ResponseTimeout,
    /// No connection exists to the server
    NoConnection,
    /// The task processing requests has been shut down
    Shutdown,
}

impl std::error::Error for RequestError {}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RequestError::Io(kind) => std::io::Error::from(*kind).fmt(f),
            RequestError::Exception(err) => err.fmt(f),
            RequestError::BadRequest(err) => err.fmt(f),
            RequestError::BadFrame(err) => err.fmt(f),
            RequestError::BadResponse(err) => err.fmt(f),
            RequestError::BadTransactionId(expected, received) => write!(
                f,
                "response transaction id {received:#06X} does not match request {expected:#06X}"
            ),
            RequestError::BadUnitId(expected, received) => write!(
                f,
                "response unit id {received:#04X} does not match request {expected:#04X}"
            ),
            RequestError::Internal(err) => err.fmt(f),
            RequestError::ResponseTimeout => {
                f.write_str("timeout occurred before receiving a response from the server")
            }
            RequestError::NoConnection => f.write_str("no connection exists to the server"),
            RequestError::Shutdown => f.write_str("the task processing requests has been shut down"),
        }
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Io(err.kind())
    }
}

impl From<InvalidRequest> for RequestError {
    fn from(err: InvalidRequest) -> Self {
        RequestError::BadRequest(err)
    }
}

impl From<InvalidRange> for RequestError {
    fn from(err: InvalidRange) -> Self {
        RequestError::BadRequest(InvalidRequest::BadRange(err))
    }
}

impl From<InvalidRange> for InvalidRequest {
    fn from(err: InvalidRange) -> Self {
        InvalidRequest::BadRange(err)
    }
}

impl From<FrameParseError> for RequestError {
    fn from(err: FrameParseError) -> Self {
        RequestError::BadFrame(err)
    }
}

impl From<AduParseError> for RequestError {
    fn from(err: AduParseError) -> Self {
        RequestError::BadResponse(err)
    }
}

impl From<InternalError> for RequestError {
    fn from(err: InternalError) -> Self {
        RequestError::Internal(err)
    }
}

impl From<ExceptionCode> for RequestError {
    fn from(err: ExceptionCode) -> Self {
        RequestError::Exception(err)
    }
}

impl From<Shutdown> for RequestError {
    fn from(_: Shutdown) -> Self {
        RequestError::Shutdown
    }
}

/// Errors that occur while parsing a frame off a stream (TCP or serial)
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FrameParseError {
    /// Received TCP frame with the length field set to zero
    MbapLengthZero,
    /// Received a frame with a length that exceeds the maximum allowed length (actual, max)
    FrameLengthTooBig(usize, usize),
    /// Received TCP frame with a non-Modbus protocol id
    UnknownProtocolId(u16),
    /// Received an RTU frame whose CRC does not match the computed value (received, expected)
    CrcValidationFailure(u16, u16),
    /// Received an RTU frame with an unknown function code, making the length indeterminate
    UnknownFunctionCode(u8),
}

impl std::error::Error for FrameParseError {}

impl std::fmt::Display for FrameParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FrameParseError::MbapLengthZero => {
                f.write_str("received TCP frame with the length field set to zero")
            }
            FrameParseError::FrameLengthTooBig(size, max) => write!(
                f,
                "received frame with length ({size}) that exceeds max allowed size ({max})"
            ),
            FrameParseError::UnknownProtocolId(id) => {
                write!(f, "received TCP frame with non-Modbus protocol id: {id:#06X}")
            }
            FrameParseError::CrcValidationFailure(received, expected) => write!(
                f,
                "received RTU frame with invalid CRC: {received:#06X}, expected: {expected:#06X}"
            ),
            FrameParseError::UnknownFunctionCode(code) => {
                write!(f, "received RTU frame with unknown function code: {code:#04X}")
            }
        }
    }
}

/// Errors that occur while parsing requests and responses
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AduParseError {
    /// The response is too short to be valid
    InsufficientBytes,
    /// The byte count doesn't match the actual number of bytes present (count, remaining)
    InsufficientBytesForByteCount(usize, usize),
    /// The response contains extra trailing bytes
    TrailingBytes(usize),
    /// A parameter expected to be echoed in the reply did not match
    ReplyEchoMismatch,
    /// An unknown response function code was received (actual, expected, expected error)
    UnknownResponseFunction(u8, u8, u8),
    /// Bad value for the coil state
    UnknownCoilState(u16),
    /// A FIFO response advertised more than 31 queued registers
    FifoCountTooBig(u16),
    /// A file record sub-response carried a reference type other than 6
    UnknownReferenceType(u8),
}

impl std::error::Error for AduParseError {}

impl std::fmt::Display for AduParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AduParseError::InsufficientBytes => f.write_str("response is too short to be valid"),
            AduParseError::InsufficientBytesForByteCount(count, remaining) => write!(
                f,
                "byte count ({count}) doesn't match the actual number of bytes remaining ({remaining})"
            ),
            AduParseError::TrailingBytes(remaining) => {
                write!(f, "response contains {remaining} extra trailing bytes")
            }
            AduParseError::ReplyEchoMismatch => {
                f.write_str("a parameter expected to be echoed in the reply did not match")
            }
            AduParseError::UnknownResponseFunction(actual, expected, error) => write!(
                f,
                "received unknown response function code: {actual}. Expected {expected} or {error}"
            ),
            AduParseError::UnknownCoilState(value) => write!(
                f,
                "received coil state with unspecified value: {value:#06X}"
            ),
            AduParseError::FifoCountTooBig(count) => {
                write!(f, "FIFO count of {count} exceeds the maximum of 31")
            }
            AduParseError::UnknownReferenceType(value) => {
                write!(f, "file record reference type must be 6, received: {value}")
            }
        }
    }
}

/// Errors that result from bad request parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InvalidRequest {
    /// The address range is invalid
    BadRange(InvalidRange),
    /// The count of items exceeds the maximum allowed by the function code (count, max)
    CountTooBigForType(u16, u16),
    /// The count of items doesn't fit in a u16
    CountTooBigForU16(usize),
    /// Broadcast may only be used with write requests
    BroadcastNotSupported,
    /// A file record request exceeds the maximum ADU size
    RequestTooBig(usize),
    /// A file record reference carries an out-of-range field
    InvalidFileRecord,
}

impl std::error::Error for InvalidRequest {}

impl std::fmt::Display for InvalidRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InvalidRequest::BadRange(err) => err.fmt(f),
            InvalidRequest::CountTooBigForType(count, max) => write!(
                f,
                "the request count of {count} exceeds maximum allowed count of {max} for this type"
            ),
            InvalidRequest::CountTooBigForU16(count) => write!(
                f,
                "the count of requested objects exceeds the maximum value of u16: {count}"
            ),
            InvalidRequest::BroadcastNotSupported => {
                f.write_str("broadcast may only be used with write requests")
            }
            InvalidRequest::RequestTooBig(size) => {
                write!(f, "request of {size} bytes exceeds the maximum ADU size")
            }
            InvalidRequest::InvalidFileRecord => {
                f.write_str("file record reference carries an out-of-range field")
            }
        }
    }
}

/// Errors that indicate faulty logic in the library itself if they occur
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InternalError {
    /// Insufficient space for write operation (requested, remaining)
    InsufficientWriteSpace(usize, usize),
    /// Attempted to read more bytes than present (requested, remaining)
    InsufficientBytesForRead(usize, usize),
    /// Cursor seek operation exceeded the bounds of the underlying buffer
    BadSeekOperation,
    /// Byte count would exceed the maximum size of a u8
    BadByteCount(usize),
}

impl std::error::Error for InternalError {}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InternalError::InsufficientWriteSpace(write_size, remaining) => write!(
                f,
                "attempted to write {write_size} bytes with {remaining} bytes remaining"
            ),
            InternalError::InsufficientBytesForRead(requested, remaining) => write!(
                f,
                "attempted to read {requested} bytes with only {remaining} remaining"
            ),
            InternalError::BadSeekOperation => {
                f.write_str("cursor seek operation exceeded the bounds of the underlying buffer")
            }
            InternalError::BadByteCount(num) => {
                write!(f, "byte count would exceed maximum size of u8: {num}")
            }
        }
    }
}

/// Errors that can occur when constructing an address range
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InvalidRange {
    /// Count of zero is not allowed
    CountOfZero,
    /// Start and count combine to exceed the u16 address space (start, count)
    AddressOverflow(u16, u16),
    /// Count is larger than allowed for this request type (count, max)
    CountTooLargeForType(u16, u16),
}

impl std::error::Error for InvalidRange {}

impl std::fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InvalidRange::CountOfZero => f.write_str("address range contains a count of zero"),
            InvalidRange::AddressOverflow(start, count) => write!(
                f,
                "start == {start} and count == {count} would overflow the representation of u16"
            ),
            InvalidRange::CountTooLargeForType(count, max) => write!(
                f,
                "the count of {count} exceeds maximum allowed count of {max} for this type"
            ),
        }
    }
}
