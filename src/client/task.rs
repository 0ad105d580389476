use std::time::Duration;

use tokio::time::Instant;
use tracing::Instrument;

use crate::client::message::{Command, Request, Setting};
use crate::common::frame::{FrameHeader, FrameWriter, FramedReader, FunctionField, TxId};
use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::error::{RequestError, Shutdown};

/// the client loop runs until one of the following occurs
#[derive(Debug, PartialEq)]
pub(crate) enum SessionError {
    /// the stream errored
    IoError(std::io::ErrorKind),
    /// unrecoverable framing issue
    BadFrame,
    /// the channel was disabled
    Disabled,
    /// the mpsc was closed (dropped) on the sender side
    Shutdown,
}

impl SessionError {
    pub(crate) fn from(err: &RequestError) -> Option<Self> {
        match err {
            RequestError::Io(x) => Some(SessionError::IoError(*x)),
            RequestError::BadFrame(_) => Some(SessionError::BadFrame),
            // all other errors don't kill the loop
            _ => None,
        }
    }
}

pub(crate) struct ClientLoop {
    rx: tokio::sync::mpsc::Receiver<Command>,
    writer: FrameWriter,
    reader: FramedReader,
    tx_id: TxId,
    enabled: bool,
    /// number of re-sends after a response timeout, used on serial links only
    retries: usize,
    /// serial links use positional correlation, broadcast writes, and re-sends
    rtu_link: bool,
    decode: DecodeLevel,
}

impl ClientLoop {
    pub(crate) fn new(
        rx: tokio::sync::mpsc::Receiver<Command>,
        writer: FrameWriter,
        reader: FramedReader,
        retries: usize,
        rtu_link: bool,
        decode: DecodeLevel,
    ) -> Self {
        Self {
            rx,
            writer,
            reader,
            tx_id: TxId::default(),
            enabled: false,
            retries,
            rtu_link,
            decode,
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn disable(&mut self) {
        self.enabled = false;
    }

    fn apply_setting(&mut self, setting: Setting) {
        match setting {
            Setting::Enable => self.enabled = true,
            Setting::Disable => self.enabled = false,
            Setting::DecodeLevel(level) => self.decode = level,
        }
    }

    /// process commands, failing requests, until the channel is enabled
    pub(crate) async fn wait_for_enabled(&mut self) -> Result<(), Shutdown> {
        while !self.enabled {
            match self.rx.recv().await {
                None => return Err(Shutdown),
                Some(Command::Setting(setting)) => self.apply_setting(setting),
                Some(Command::Request(request)) => {
                    request.details.fail(RequestError::NoConnection)
                }
            }
        }
        Ok(())
    }

    pub(crate) async fn run(&mut self, io: &mut PhysLayer) -> SessionError {
        // frames from a previous connection are meaningless
        self.reader.reset();
        io.set_decode_level(self.decode.physical);

        loop {
            match self.rx.recv().await {
                None => return SessionError::Shutdown,
                Some(Command::Setting(setting)) => {
                    self.apply_setting(setting);
                    io.set_decode_level(self.decode.physical);
                    if !self.enabled {
                        return SessionError::Disabled;
                    }
                }
                Some(Command::Request(request)) => {
                    if let Some(err) = self.run_one_request(io, request).await {
                        return err;
                    }
                }
            }
        }
    }

    async fn run_one_request(
        &mut self,
        io: &mut PhysLayer,
        request: Request,
    ) -> Option<SessionError> {
        let tx_id = self.tx_id.next();
        let result = self
            .execute_request(io, request, tx_id)
            .instrument(tracing::info_span!("Transaction", tx_id = %tx_id))
            .await;

        if let Err(err) = &result {
            tracing::warn!("error occurred making request: {}", err);
        }

        result.as_ref().err().and_then(SessionError::from)
    }

    async fn execute_request(
        &mut self,
        io: &mut PhysLayer,
        request: Request,
        tx_id: TxId,
    ) -> Result<(), RequestError> {
        if self.rtu_link && request.id.is_broadcast() {
            return self.execute_broadcast(io, request).await;
        }

        let header = if self.rtu_link {
            FrameHeader::new_rtu_header(request.id)
        } else {
            FrameHeader::new_tcp_header(request.id, tx_id)
        };
        let function = FunctionField::Valid(request.details.function());

        let mut attempt: usize = 0;
        loop {
            let bytes = self
                .writer
                .format(header, function, &request.details, self.decode)?;

            if let Err(err) = io.write(bytes).await {
                let err = err.into();
                request.details.fail(err);
                return Err(err);
            }

            let deadline = Instant::now() + request.timeout;

            let frame = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    if attempt < self.retries {
                        attempt += 1;
                        tracing::warn!("response timeout, re-sending request ({}/{})", attempt, self.retries);
                        // discard any partial response before the re-send
                        self.reader.reset();
                        continue;
                    }
                    request.details.fail(RequestError::ResponseTimeout);
                    return Ok(());
                }
                result = self.reader.next_frame(io, self.decode) => match result {
                    Ok(frame) => frame,
                    Err(err) => {
                        request.details.fail(err);
                        return Err(err);
                    }
                }
            };

            // a response that fails the transaction correlation checks kills
            // the transaction but not the connection
            if let Some(received) = frame.header.tx_id {
                if received != tx_id {
                    let err = RequestError::BadTransactionId(tx_id.to_u16(), received.to_u16());
                    request.details.fail(err);
                    return Ok(());
                }
            }

            if frame.header.unit_id != request.id {
                let err = RequestError::BadUnitId(request.id.value, frame.header.unit_id.value);
                request.details.fail(err);
                return Ok(());
            }

            request.handle_response(frame.payload(), self.decode.app);
            return Ok(());
        }
    }

    async fn execute_broadcast(
        &mut self,
        io: &mut PhysLayer,
        request: Request,
    ) -> Result<(), RequestError> {
        if !request.details.is_write() {
            request
                .details
                .fail(crate::error::InvalidRequest::BroadcastNotSupported.into());
            return Ok(());
        }

        let header = FrameHeader::new_rtu_header(request.id);
        let function = FunctionField::Valid(request.details.function());
        let bytes = self
            .writer
            .format(header, function, &request.details, self.decode)?;

        if let Err(err) = io.write(bytes).await {
            let err = err.into();
            request.details.fail(err);
            return Err(err);
        }

        // no response follows a broadcast
        request.details.complete_broadcast();
        Ok(())
    }

    /// fail requests with NoConnection while waiting out a reconnect delay
    pub(crate) async fn fail_requests_for(&mut self, duration: Duration) -> Result<(), Shutdown> {
        let deadline = Instant::now() + duration;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    return Ok(())
                }
                command = self.rx.recv() => match command {
                    None => return Err(Shutdown),
                    Some(Command::Setting(setting)) => {
                        self.apply_setting(setting);
                        if !self.enabled {
                            // no point waiting out the delay while disabled
                            return Ok(());
                        }
                    }
                    Some(Command::Request(request)) => {
                        request.details.fail(RequestError::NoConnection)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::client::message::RequestDetails;
    use crate::client::requests::read_bits::ReadBits;
    use crate::client::requests::Promise;
    use crate::error::FrameParseError;
    use crate::types::{AddressRange, Indexed, UnitId};

    struct ClientFixture {
        client: ClientLoop,
        io: PhysLayer,
        io_handle: sfio_tokio_mock_io::Handle,
    }

    impl ClientFixture {
        fn new() -> (Self, tokio::sync::mpsc::Sender<Command>) {
            let (tx, rx) = tokio::sync::mpsc::channel(10);
            let (io, io_handle) = sfio_tokio_mock_io::mock();
            let mut client = ClientLoop::new(
                rx,
                FrameWriter::tcp(),
                FramedReader::tcp(),
                0,
                false,
                DecodeLevel::nothing(),
            );
            client.apply_setting(Setting::Enable);
            (
                Self {
                    client,
                    io: PhysLayer::new_mock(io),
                    io_handle,
                },
                tx,
            )
        }

        async fn read_coils(
            &mut self,
            tx: &tokio::sync::mpsc::Sender<Command>,
            range: AddressRange,
            timeout: Duration,
        ) -> tokio::sync::oneshot::Receiver<Result<Vec<Indexed<bool>>, RequestError>> {
            let (promise, rx) = Promise::channel();
            let details = RequestDetails::ReadCoils(ReadBits::new(
                range.of_read_bits().unwrap(),
                promise,
            ));
            let request = Request::new(UnitId::new(1), timeout, details);

            tx.send(Command::Request(request)).await.unwrap();
            rx
        }
    }

    //                                  |   tx id  |  proto id |  length  | unit | fc |   body    |
    const READ_COILS_REQUEST: &[u8] = &[
        0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x00, 0x07, 0x00, 0x02,
    ];
    // response with coil 7 on, coil 8 off
    const READ_COILS_RESPONSE: &[u8] = &[
        0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x01,
    ];

    #[tokio::test(start_paused = true)]
    async fn task_completes_with_shutdown_error_when_sender_dropped() {
        let (mut fixture, tx) = ClientFixture::new();
        drop(tx);

        assert_eq!(
            fixture.client.run(&mut fixture.io).await,
            SessionError::Shutdown
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transmits_read_coils_and_completes_promise() {
        let (mut fixture, tx) = ClientFixture::new();

        let range = AddressRange::try_from(7, 2).unwrap();

        fixture.io_handle.write(READ_COILS_REQUEST);
        fixture.io_handle.read(READ_COILS_RESPONSE);

        let rx = fixture
            .read_coils(&tx, range, Duration::from_secs(1))
            .await;
        drop(tx);

        assert_eq!(
            fixture.client.run(&mut fixture.io).await,
            SessionError::Shutdown
        );

        assert_eq!(
            rx.await.unwrap(),
            Ok(vec![Indexed::new(7, true), Indexed::new(8, false)])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn framing_errors_kill_the_session() {
        let (mut fixture, tx) = ClientFixture::new();

        let range = AddressRange::try_from(7, 2).unwrap();

        fixture.io_handle.write(READ_COILS_REQUEST);
        // non-Modbus protocol id
        fixture
            .io_handle
            .read(&[0x00, 0x00, 0xCA, 0xFE, 0x00, 0x01, 0x01]);

        let rx = fixture
            .read_coils(&tx, range, Duration::from_secs(5))
            .await;

        assert_eq!(
            fixture.client.run(&mut fixture.io).await,
            SessionError::BadFrame
        );

        assert_eq!(
            rx.await.unwrap(),
            Err(RequestError::BadFrame(FrameParseError::UnknownProtocolId(
                0xCAFE
            )))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_transaction_id_fails_the_request_but_not_the_session() {
        let (mut fixture, tx) = ClientFixture::new();

        let range = AddressRange::try_from(7, 2).unwrap();

        fixture.io_handle.write(READ_COILS_REQUEST);
        // valid frame, wrong transaction id
        fixture.io_handle.read(&[
            0x00, 0x09, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x01,
        ]);

        let rx = fixture
            .read_coils(&tx, range, Duration::from_secs(1))
            .await;
        drop(tx);

        // the session keeps running until the channel closes
        assert_eq!(
            fixture.client.run(&mut fixture.io).await,
            SessionError::Shutdown
        );

        assert_eq!(
            rx.await.unwrap(),
            Err(RequestError::BadTransactionId(0x0000, 0x0009))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn response_timeout_fails_the_request_and_preserves_the_session() {
        let (mut fixture, tx) = ClientFixture::new();

        let range = AddressRange::try_from(7, 2).unwrap();

        // the request is written but no response ever arrives
        fixture.io_handle.write(READ_COILS_REQUEST);

        let rx = fixture
            .read_coils(&tx, range, Duration::from_millis(100))
            .await;
        drop(tx);

        assert_eq!(
            fixture.client.run(&mut fixture.io).await,
            SessionError::Shutdown
        );

        assert_eq!(rx.await.unwrap(), Err(RequestError::ResponseTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn disable_command_stops_the_run_loop() {
        let (mut fixture, tx) = ClientFixture::new();

        tx.send(Command::Setting(Setting::Disable)).await.unwrap();

        assert_eq!(
            fixture.client.run(&mut fixture.io).await,
            SessionError::Disabled
        );
    }
}
