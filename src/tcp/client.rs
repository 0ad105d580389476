use tracing::Instrument;

use tokio::net::TcpStream;

use crate::client::message::Command;
use crate::client::task::{ClientLoop, SessionError};
use crate::client::{Channel, HostAddr};
use crate::common::frame::{FrameWriter, FramedReader};
use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::error::Shutdown;
use crate::retry::RetryStrategy;

pub(crate) fn spawn_tcp_channel(
    host: HostAddr,
    max_queued_requests: usize,
    connect_retry: Box<dyn RetryStrategy>,
    decode: DecodeLevel,
    auto_reconnect: bool,
) -> Channel {
    let (tx, rx) = tokio::sync::mpsc::channel(max_queued_requests);
    let task = async move {
        TcpChannelTask::new(
            host.clone(),
            rx,
            TcpTaskConnectionHandler::Tcp,
            connect_retry,
            decode,
            auto_reconnect,
        )
        .run()
        .instrument(tracing::info_span!("Modbus-Client-TCP", endpoint = ?host))
        .await;
    };
    tokio::spawn(task);
    Channel::new(tx)
}

pub(crate) enum TcpTaskConnectionHandler {
    Tcp,
    #[cfg(feature = "tls")]
    Tls(crate::tcp::tls::client::TlsClientConfig),
}

impl TcpTaskConnectionHandler {
    async fn handle(
        &mut self,
        socket: TcpStream,
        _endpoint: &HostAddr,
    ) -> Result<PhysLayer, String> {
        match self {
            Self::Tcp => Ok(PhysLayer::new_tcp(socket)),
            #[cfg(feature = "tls")]
            Self::Tls(config) => config.handle_connection(socket, _endpoint).await,
        }
    }
}

pub(crate) struct TcpChannelTask {
    host: HostAddr,
    connect_retry: Box<dyn RetryStrategy>,
    connection_handler: TcpTaskConnectionHandler,
    client_loop: ClientLoop,
    auto_reconnect: bool,
}

impl TcpChannelTask {
    pub(crate) fn new(
        host: HostAddr,
        rx: tokio::sync::mpsc::Receiver<Command>,
        connection_handler: TcpTaskConnectionHandler,
        connect_retry: Box<dyn RetryStrategy>,
        decode: DecodeLevel,
        auto_reconnect: bool,
    ) -> Self {
        Self {
            host,
            connect_retry,
            connection_handler,
            client_loop: ClientLoop::new(
                rx,
                FrameWriter::tcp(),
                FramedReader::tcp(),
                0,
                false,
                decode,
            ),
            auto_reconnect,
        }
    }

    // runs until the channel is dropped
    pub(crate) async fn run(&mut self) -> Shutdown {
        loop {
            if self.client_loop.wait_for_enabled().await.is_err() {
                return Shutdown;
            }

            if let Err(Shutdown) = self.try_connect_and_run().await {
                return Shutdown;
            }
        }
    }

    async fn try_connect_and_run(&mut self) -> Result<(), Shutdown> {
        match self.host.connect().await {
            Err(err) => {
                let delay = self.connect_retry.after_failed_connect();
                tracing::warn!(
                    "failed to connect to {}: {} - waiting {} ms before next attempt",
                    self.host,
                    err,
                    delay.as_millis()
                );
                self.client_loop.fail_requests_for(delay).await
            }
            Ok(socket) => {
                if let Err(err) = socket.set_nodelay(true) {
                    tracing::warn!("unable to enable TCP_NODELAY: {}", err);
                }
                match self.connection_handler.handle(socket, &self.host).await {
                    Err(err) => {
                        let delay = self.connect_retry.after_failed_connect();
                        tracing::warn!(
                            "{} - waiting {} ms before next attempt",
                            err,
                            delay.as_millis()
                        );
                        self.client_loop.fail_requests_for(delay).await
                    }
                    Ok(mut phys) => {
                        tracing::info!("connected to: {}", self.host);
                        // reset the retry strategy now that we have a successful connection
                        // this happens here so that the reset includes the TLS handshake
                        self.connect_retry.reset();
                        // run the physical layer independent processing loop
                        match self.client_loop.run(&mut phys).await {
                            // the mpsc was closed, end the task
                            SessionError::Shutdown => Err(Shutdown),
                            // the channel was disabled, wait for it to be enabled again
                            SessionError::Disabled => Ok(()),
                            // re-establish the connection
                            SessionError::IoError(_) | SessionError::BadFrame => {
                                if !self.auto_reconnect {
                                    tracing::warn!("lost connection, auto-reconnect is off");
                                    self.client_loop.disable();
                                    return Ok(());
                                }
                                let delay = self.connect_retry.after_disconnect();
                                tracing::warn!("waiting {:?} to reconnect", delay);
                                self.client_loop.fail_requests_for(delay).await
                            }
                        }
                    }
                }
            }
        }
    }
}
