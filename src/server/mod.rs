use std::net::SocketAddr;
use std::time::Duration;

use tracing::Instrument;

use crate::decode::DecodeLevel;
use crate::error::Shutdown;
use crate::tcp::server::{ServerTask, TcpServerConnectionHandler};
use crate::url::{ConfigError, EndpointUrl};

pub(crate) mod handler;
pub(crate) mod request;
pub(crate) mod task;

pub use handler::*;

use crate::server::task::ServerSetting;

/// Fine for this to be a constant since the corresponding channel is only used to change settings
pub(crate) const SERVER_SETTING_CHANNEL_CAPACITY: usize = 8;

/// Limits and timeouts applied to every connection of a server
#[derive(Clone, Copy, Debug)]
pub struct ServerSettings {
    /// Maximum number of concurrent sessions. A connection accepted at the
    /// limit is closed immediately.
    pub max_sessions: usize,
    /// Close a connection when no request arrives for this long
    pub idle_timeout: Option<Duration>,
    /// Force-close a TLS session when a response write takes longer than this
    pub write_timeout: Option<Duration>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            max_sessions: 16,
            idle_timeout: None,
            write_timeout: None,
        }
    }
}

/// A handle to a server async task. The task is shut down when the handle is dropped.
#[derive(Debug)]
pub struct ServerHandle {
    tx: tokio::sync::mpsc::Sender<ServerSetting>,
}

impl ServerHandle {
    /// Change the decoding level of sessions established from now on
    pub async fn set_decode_level(&mut self, level: DecodeLevel) -> Result<(), Shutdown> {
        self.tx.send(ServerSetting::ChangeDecoding(level)).await?;
        Ok(())
    }
}

/// Spawns a TCP server task onto the runtime. This method can only
/// be called from within the runtime context.
///
/// Each accepted connection is served by its own task.
///
/// * `settings` - Connection limits and timeouts
/// * `addr` - A socket address to bind to
/// * `handler` - The request handler, shared by every session
/// * `decode` - Decode log level
pub async fn spawn_tcp_server_task<T: RequestHandler>(
    settings: ServerSettings,
    addr: SocketAddr,
    handler: ServerHandlerType<T>,
    decode: DecodeLevel,
) -> Result<ServerHandle, std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (tx, rx) = tokio::sync::mpsc::channel(SERVER_SETTING_CHANNEL_CAPACITY);
    tokio::spawn(
        async move {
            ServerTask::new(
                listener,
                handler,
                TcpServerConnectionHandler::Tcp,
                settings,
                decode,
            )
            .run(rx)
            .await;
        }
        .instrument(tracing::info_span!("Modbus-Server-TCP", "listen" = ?addr)),
    );

    Ok(ServerHandle { tx })
}

/// Spawns a TLS server task onto the runtime. This method can only
/// be called from within the runtime context.
///
/// Each accepted connection is served by its own task. Connections must
/// complete a mutually-authenticated TLS handshake before any Modbus data is
/// exchanged, and the Modbus Role extension of the client certificate is
/// passed to the handler with every request.
///
/// * `settings` - Connection limits and timeouts
/// * `addr` - A socket address to bind to
/// * `handler` - The request handler, shared by every session
/// * `tls_config` - TLS server configuration
/// * `decode` - Decode log level
#[cfg(feature = "tls")]
pub async fn spawn_tls_server_task<T: RequestHandler>(
    settings: ServerSettings,
    addr: SocketAddr,
    handler: ServerHandlerType<T>,
    tls_config: crate::tcp::tls::server::TlsServerConfig,
    decode: DecodeLevel,
) -> Result<ServerHandle, std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (tx, rx) = tokio::sync::mpsc::channel(SERVER_SETTING_CHANNEL_CAPACITY);
    tokio::spawn(
        async move {
            ServerTask::new(
                listener,
                handler,
                TcpServerConnectionHandler::Tls(tls_config),
                settings,
                decode,
            )
            .run(rx)
            .await;
        }
        .instrument(tracing::info_span!("Modbus-Server-TLS", "listen" = ?addr)),
    );

    Ok(ServerHandle { tx })
}

/// Spawns an RTU server task onto the runtime. This method can only
/// be called from within the runtime context.
///
/// The serial line carries a single session. Write requests addressed to
/// unit id zero are executed as broadcasts without a reply.
///
/// * `path` - Path to the serial device. Generally `/dev/ttyUSB0` on Linux and `COM1` on Windows.
/// * `settings` - Serial port settings
/// * `idle_timeout` - Close the session when no request arrives for this long
/// * `handler` - The request handler
/// * `decode` - Decode log level
#[cfg(feature = "serial")]
pub fn spawn_rtu_server_task<T: RequestHandler>(
    path: &str,
    settings: crate::serial::SerialSettings,
    idle_timeout: Option<Duration>,
    handler: ServerHandlerType<T>,
    decode: DecodeLevel,
) -> Result<ServerHandle, std::io::Error> {
    let (tx, rx) = tokio::sync::mpsc::channel(SERVER_SETTING_CHANNEL_CAPACITY);
    let task = crate::serial::server::create_rtu_server_task(
        rx,
        path,
        settings,
        handler,
        idle_timeout,
        decode,
    )?;
    tokio::spawn(task);

    Ok(ServerHandle { tx })
}

/// Transport-independent server options used when spawning a server from an
/// endpoint URL
pub struct ServerConfig {
    /// Connection limits and timeouts
    pub settings: ServerSettings,
    /// Decode log level
    pub decode: DecodeLevel,
    /// Serial port settings, used by `rtu://` endpoints
    #[cfg(feature = "serial")]
    pub serial_settings: crate::serial::SerialSettings,
    /// TLS configuration, required by `tcp+tls://` endpoints
    #[cfg(feature = "tls")]
    pub tls: Option<crate::tcp::tls::server::TlsServerConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            settings: ServerSettings::default(),
            decode: DecodeLevel::nothing(),
            #[cfg(feature = "serial")]
            serial_settings: crate::serial::SerialSettings::default(),
            #[cfg(feature = "tls")]
            tls: None,
        }
    }
}

/// Spawn a server for the transport selected by the endpoint URL
///
/// `tcp://` and `tcp+tls://` endpoints must name a local address to bind to.
pub async fn spawn_server<T: RequestHandler>(
    url: &EndpointUrl,
    handler: ServerHandlerType<T>,
    config: ServerConfig,
) -> Result<ServerHandle, ConfigError> {
    let bind_failure =
        |err: std::io::Error| ConfigError::InvalidAddress(format!("unable to bind: {err}"));

    match url {
        EndpointUrl::Tcp(host) => {
            let addr = resolve_bind_addr(host, url)?;
            spawn_tcp_server_task(config.settings, addr, handler, config.decode)
                .await
                .map_err(bind_failure)
        }
        #[cfg(feature = "tls")]
        EndpointUrl::TcpTls(host) => {
            let tls = config.tls.ok_or(ConfigError::MissingTlsConfig)?;
            let addr = resolve_bind_addr(host, url)?;
            spawn_tls_server_task(config.settings, addr, handler, tls, config.decode)
                .await
                .map_err(bind_failure)
        }
        #[cfg(not(feature = "tls"))]
        EndpointUrl::TcpTls(_) => Err(ConfigError::MissingTlsConfig),
        #[cfg(feature = "serial")]
        EndpointUrl::Rtu(device, baud) => {
            let settings = crate::serial::SerialSettings {
                baud_rate: *baud,
                ..config.serial_settings
            };
            spawn_rtu_server_task(
                device,
                settings,
                config.settings.idle_timeout,
                handler,
                config.decode,
            )
            .map_err(|err| ConfigError::InvalidSerialDevice(err.to_string()))
        }
        #[cfg(not(feature = "serial"))]
        EndpointUrl::Rtu(device, _) => Err(ConfigError::InvalidSerialDevice(device.clone())),
    }
}

fn resolve_bind_addr(host: &crate::client::HostAddr, url: &EndpointUrl) -> Result<SocketAddr, ConfigError> {
    host.socket_addr()
        .ok_or_else(|| ConfigError::InvalidAddress(url.to_string()))
}
