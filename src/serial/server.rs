use tracing::Instrument;

use crate::common::frame::{FrameWriter, FramedReader};
use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::error::RequestError;
use crate::serial::SerialSettings;
use crate::server::handler::{RequestHandler, ServerHandlerType};
use crate::server::task::{ServerSetting, SessionAuthentication, SessionTask};

pub(crate) fn create_rtu_server_task<T: RequestHandler>(
    rx: tokio::sync::mpsc::Receiver<ServerSetting>,
    path: &str,
    settings: SerialSettings,
    handler: ServerHandlerType<T>,
    idle_timeout: Option<std::time::Duration>,
    decode: DecodeLevel,
) -> Result<impl std::future::Future<Output = ()>, std::io::Error> {
    let serial = crate::serial::open(path, settings)?;
    let path = path.to_string();

    Ok(async move {
        run_rtu_server(rx, serial, handler, idle_timeout, decode)
            .instrument(tracing::info_span!("Modbus-Server-RTU", "port" = ?path))
            .await
    })
}

async fn run_rtu_server<T: RequestHandler>(
    mut rx: tokio::sync::mpsc::Receiver<ServerSetting>,
    serial: tokio_serial::SerialStream,
    handler: ServerHandlerType<T>,
    idle_timeout: Option<std::time::Duration>,
    decode: DecodeLevel,
) {
    // the kill sender is held here so the session only stops with this task
    let (_kill_tx, kill_rx) = tokio::sync::mpsc::channel(1);

    let mut session = SessionTask::new(
        PhysLayer::new_serial(serial),
        handler,
        SessionAuthentication::Unauthenticated,
        FrameWriter::rtu(),
        FramedReader::rtu_request(),
        kill_rx,
        idle_timeout,
        decode,
    );

    loop {
        tokio::select! {
            setting = rx.recv() => {
                match setting {
                    Some(ServerSetting::ChangeDecoding(level)) => session.set_decode_level(level),
                    None => {
                        tracing::info!("server shutdown");
                        return;
                    }
                }
            }
            result = session.run() => {
                match result {
                    Ok(()) => continue,
                    Err(RequestError::Shutdown) => {
                        tracing::info!("shutdown");
                        return;
                    }
                    Err(RequestError::Io(kind)) => {
                        tracing::error!("serial port error: {}", std::io::Error::from(kind));
                        return;
                    }
                    Err(err) => {
                        tracing::warn!("{}", err);
                        // the serial line re-synchronizes on the next frame
                        session.reset_framing();
                    }
                }
            }
        }
    }
}
