use tracing::Instrument;

use crate::client::message::Command;
use crate::client::task::{ClientLoop, SessionError};
use crate::client::Channel;
use crate::common::frame::{FrameWriter, FramedReader};
use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::error::Shutdown;
use crate::retry::RetryStrategy;
use crate::serial::SerialSettings;

#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_rtu_channel(
    path: &str,
    serial_settings: SerialSettings,
    max_queued_requests: usize,
    retry: Box<dyn RetryStrategy>,
    request_retries: usize,
    decode: DecodeLevel,
    auto_reconnect: bool,
) -> Channel {
    let (tx, rx) = tokio::sync::mpsc::channel(max_queued_requests);
    let path = path.to_string();
    let task = async move {
        SerialChannelTask::new(
            &path,
            serial_settings,
            rx,
            retry,
            request_retries,
            decode,
            auto_reconnect,
        )
        .run()
        .instrument(tracing::info_span!("Modbus-Client-RTU", "port" = ?path))
        .await;
    };
    tokio::spawn(task);
    Channel::new(tx)
}

pub(crate) struct SerialChannelTask {
    path: String,
    serial_settings: SerialSettings,
    retry: Box<dyn RetryStrategy>,
    client_loop: ClientLoop,
    auto_reconnect: bool,
}

impl SerialChannelTask {
    pub(crate) fn new(
        path: &str,
        serial_settings: SerialSettings,
        rx: tokio::sync::mpsc::Receiver<Command>,
        retry: Box<dyn RetryStrategy>,
        request_retries: usize,
        decode: DecodeLevel,
        auto_reconnect: bool,
    ) -> Self {
        Self {
            path: path.to_string(),
            serial_settings,
            retry,
            client_loop: ClientLoop::new(
                rx,
                FrameWriter::rtu(),
                FramedReader::rtu_response(),
                request_retries,
                true,
                decode,
            ),
            auto_reconnect,
        }
    }

    pub(crate) async fn run(&mut self) -> Shutdown {
        loop {
            if self.client_loop.wait_for_enabled().await.is_err() {
                return Shutdown;
            }

            if let Err(Shutdown) = self.try_open_and_run().await {
                return Shutdown;
            }
        }
    }

    async fn try_open_and_run(&mut self) -> Result<(), Shutdown> {
        match crate::serial::open(self.path.as_str(), self.serial_settings) {
            Err(err) => {
                let delay = self.retry.after_failed_connect();
                tracing::warn!("{} - waiting {} ms to re-open port", err, delay.as_millis());
                self.client_loop.fail_requests_for(delay).await
            }
            Ok(serial) => {
                self.retry.reset();
                let mut phys = PhysLayer::new_serial(serial);
                tracing::info!("serial port open");
                match self.client_loop.run(&mut phys).await {
                    // the mpsc was closed, end the task
                    SessionError::Shutdown => Err(Shutdown),
                    // don't wait, we're disabled
                    SessionError::Disabled => Ok(()),
                    // wait before retrying
                    SessionError::IoError(_) | SessionError::BadFrame => {
                        if !self.auto_reconnect {
                            tracing::warn!("lost serial port, auto-reconnect is off");
                            self.client_loop.disable();
                            return Ok(());
                        }
                        let delay = self.retry.after_disconnect();
                        tracing::warn!("waiting {} ms to re-open port", delay.as_millis());
                        self.client_loop.fail_requests_for(delay).await
                    }
                }
            }
        }
    }
}
