use std::time::Duration;

use crate::common::cursor::ReadCursor;
use crate::common::frame::{Frame, FrameWriter, FramedReader, FunctionField};
use crate::common::function::FunctionCode;
use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::error::{AduParseError, InvalidRange, InvalidRequest, RequestError};
use crate::exception::ExceptionCode;
use crate::server::handler::{RequestHandler, ServerHandlerType};
use crate::server::request::{Request, RequestDisplay};

/// Authentication state of a session, fixed at connection time
pub(crate) enum SessionAuthentication {
    /// plain TCP or serial session
    Unauthenticated,
    /// TLS session with the role extracted from the client certificate
    Authenticated(String),
}

impl SessionAuthentication {
    fn role(&self) -> Option<&str> {
        match self {
            SessionAuthentication::Unauthenticated => None,
            SessionAuthentication::Authenticated(role) => Some(role.as_str()),
        }
    }
}

/// Runtime settings a server handle may change
pub(crate) enum ServerSetting {
    ChangeDecoding(DecodeLevel),
}

pub(crate) struct SessionTask<T>
where
    T: RequestHandler,
{
    io: PhysLayer,
    handler: ServerHandlerType<T>,
    auth: SessionAuthentication,
    shutdown: tokio::sync::mpsc::Receiver<()>,
    writer: FrameWriter,
    reader: FramedReader,
    idle_timeout: Option<Duration>,
    decode: DecodeLevel,
}

impl<T> SessionTask<T>
where
    T: RequestHandler,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        io: PhysLayer,
        handler: ServerHandlerType<T>,
        auth: SessionAuthentication,
        writer: FrameWriter,
        reader: FramedReader,
        shutdown: tokio::sync::mpsc::Receiver<()>,
        idle_timeout: Option<Duration>,
        decode: DecodeLevel,
    ) -> Self {
        Self {
            io,
            handler,
            auth,
            shutdown,
            writer,
            reader,
            idle_timeout,
            decode,
        }
    }

    pub(crate) fn set_decode_level(&mut self, level: DecodeLevel) {
        self.decode = level;
        self.io.set_decode_level(level.physical);
    }

    /// discard accumulated input after a recoverable serial framing error
    pub(crate) fn reset_framing(&mut self) {
        self.reader.reset();
    }

    pub(crate) async fn run(&mut self) -> Result<(), RequestError> {
        self.io.set_decode_level(self.decode.physical);
        loop {
            self.run_one().await?;
        }
    }

    async fn run_one(&mut self) -> Result<(), RequestError> {
        tokio::select! {
            frame = read_frame(&mut self.reader, &mut self.io, self.idle_timeout, self.decode) => {
                self.reply_to_request(frame?).await
            }
            // None means every sender is gone, which is also a shutdown
            _ = self.shutdown.recv() => {
                Err(RequestError::Shutdown)
            }
        }
    }

    async fn reply_to_request(&mut self, frame: Frame) -> Result<(), RequestError> {
        let mut cursor = ReadCursor::new(frame.payload());

        let raw_function = match cursor.read_u8() {
            Ok(x) => x,
            Err(_) => {
                tracing::warn!("received an empty frame");
                return Err(AduParseError::InsufficientBytes.into());
            }
        };

        // RTU broadcast frames are executed without a reply of any kind
        let broadcast = frame.header.tx_id.is_none() && frame.header.unit_id.is_broadcast();

        let function = match FunctionCode::get(raw_function) {
            Some(x) => x,
            None => {
                tracing::warn!("received unknown function code: {:#04X}", raw_function);
                if broadcast {
                    return Ok(());
                }
                return self
                    .reply_with_exception(
                        &frame,
                        FunctionField::UnknownFunction(raw_function),
                        ExceptionCode::IllegalFunction,
                    )
                    .await;
            }
        };

        let request = match Request::parse(function, &mut cursor) {
            Ok(x) => x,
            Err(err) => {
                tracing::warn!("error parsing {} request: {}", function, err);
                if broadcast {
                    return Ok(());
                }
                return match parse_error_to_exception(&err) {
                    Some(ex) => {
                        self.reply_with_exception(&frame, FunctionField::Exception(function), ex)
                            .await
                    }
                    // structurally malformed, an exception on serial where the
                    // CRC already vouched for the frame, fatal on TCP
                    None => {
                        if frame.header.tx_id.is_none() {
                            self.reply_with_exception(
                                &frame,
                                FunctionField::Exception(function),
                                ExceptionCode::IllegalDataValue,
                            )
                            .await
                        } else {
                            Err(err)
                        }
                    }
                };
            }
        };

        if self.decode.app.enabled() {
            tracing::info!(
                "PDU RX - {}",
                RequestDisplay::new(self.decode.app, &request)
            );
        }

        if broadcast {
            match request.into_broadcast_request() {
                Some(broadcast_request) => {
                    let mut handler = match self.handler.lock() {
                        Ok(x) => x,
                        Err(_) => return Err(RequestError::Shutdown),
                    };
                    broadcast_request.execute(
                        frame.header.unit_id,
                        &mut *handler,
                        self.auth.role(),
                    );
                }
                None => {
                    tracing::warn!("broadcast is not supported for {}", function);
                }
            }
            return Ok(());
        }

        // the handler lock is held only while the reply is produced, and the
        // reply bytes are written without it
        let reply_frame: &[u8] = {
            let mut handler = match self.handler.lock() {
                Ok(x) => x,
                Err(_) => return Err(RequestError::Shutdown),
            };
            request.get_reply(
                frame.header,
                &mut *handler,
                self.auth.role(),
                &mut self.writer,
                self.decode,
            )?
        };

        self.io.write(reply_frame).await?;
        Ok(())
    }

    async fn reply_with_exception(
        &mut self,
        frame: &Frame,
        function: FunctionField,
        ex: ExceptionCode,
    ) -> Result<(), RequestError> {
        let bytes = self.writer.format(frame.header, function, &ex, self.decode)?;
        self.io.write(bytes).await?;
        Ok(())
    }
}

async fn read_frame(
    reader: &mut FramedReader,
    io: &mut PhysLayer,
    idle_timeout: Option<Duration>,
    decode: DecodeLevel,
) -> Result<Frame, RequestError> {
    match idle_timeout {
        None => reader.next_frame(io, decode).await,
        Some(timeout) => match tokio::time::timeout(timeout, reader.next_frame(io, decode)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::info!("closing idle connection");
                Err(RequestError::Io(std::io::ErrorKind::TimedOut))
            }
        },
    }
}

/// Range and value validation failures are answered with an exception,
/// structurally malformed requests are not
fn parse_error_to_exception(err: &RequestError) -> Option<ExceptionCode> {
    match err {
        RequestError::Exception(ex) => Some(*ex),
        RequestError::BadRequest(InvalidRequest::BadRange(InvalidRange::AddressOverflow(_, _))) => {
            Some(ExceptionCode::IllegalDataAddress)
        }
        RequestError::BadRequest(_) => Some(ExceptionCode::IllegalDataValue),
        RequestError::BadResponse(AduParseError::UnknownCoilState(_)) => {
            Some(ExceptionCode::IllegalDataValue)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_overflow_maps_to_illegal_data_address() {
        let err = RequestError::BadRequest(InvalidRequest::BadRange(
            InvalidRange::AddressOverflow(u16::MAX, 2),
        ));
        assert_eq!(
            parse_error_to_exception(&err),
            Some(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn oversize_count_maps_to_illegal_data_value() {
        let err = RequestError::BadRequest(InvalidRequest::BadRange(
            InvalidRange::CountTooLargeForType(5000, 2000),
        ));
        assert_eq!(
            parse_error_to_exception(&err),
            Some(ExceptionCode::IllegalDataValue)
        );
    }

    #[test]
    fn bad_coil_state_maps_to_illegal_data_value() {
        let err = RequestError::BadResponse(AduParseError::UnknownCoilState(0xABCD));
        assert_eq!(
            parse_error_to_exception(&err),
            Some(ExceptionCode::IllegalDataValue)
        );
    }

    #[test]
    fn truncated_requests_are_not_answered() {
        let err = RequestError::BadResponse(AduParseError::InsufficientBytes);
        assert_eq!(parse_error_to_exception(&err), None);
    }
}
