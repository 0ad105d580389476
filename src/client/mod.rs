use std::net::IpAddr;

use crate::decode::DecodeLevel;
use crate::retry::RetryStrategy;
use crate::url::{ConfigError, EndpointUrl};

pub(crate) mod channel;
pub(crate) mod message;
pub(crate) mod requests;
pub(crate) mod task;

pub use channel::{Channel, RequestParam};

/// Target of a TCP or TLS connection: an IP address or a DNS name, plus a port
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostAddr {
    host: HostType,
    port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum HostType {
    Dns(String),
    Ip(IpAddr),
}

impl std::fmt::Display for HostAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.host {
            HostType::Dns(x) => write!(f, "{}:{}", x, self.port),
            HostType::Ip(x) => write!(f, "{}:{}", x, self.port),
        }
    }
}

impl HostAddr {
    /// Construct a `HostAddr` from an IP address and port
    pub fn ip(ip: IpAddr, port: u16) -> Self {
        Self {
            host: HostType::Ip(ip),
            port,
        }
    }

    /// Construct a `HostAddr` from a DNS name and port
    pub fn dns(name: String, port: u16) -> Self {
        Self {
            host: HostType::Dns(name),
            port,
        }
    }

    /// The socket address, available when the host is an IP address
    pub fn socket_addr(&self) -> Option<std::net::SocketAddr> {
        match &self.host {
            HostType::Ip(ip) => Some(std::net::SocketAddr::new(*ip, self.port)),
            HostType::Dns(_) => None,
        }
    }

    pub(crate) async fn connect(&self) -> std::io::Result<tokio::net::TcpStream> {
        match &self.host {
            HostType::Ip(ip) => tokio::net::TcpStream::connect((*ip, self.port)).await,
            HostType::Dns(name) => tokio::net::TcpStream::connect((name.as_str(), self.port)).await,
        }
    }
}

/// Spawns a channel task onto the runtime that maintains a TCP connection and
/// processes requests from an mpsc request queue. The task completes when the
/// returned channel handle and all of its clones are dropped.
///
/// The channel is initially disabled and must be enabled before it connects.
///
/// * `host` - Address of the remote server
/// * `max_queued_requests` - The maximum size of the request queue
/// * `retry` - A boxed trait object that controls when the connection is retried on failure
/// * `decode` - Decode log level
pub fn spawn_tcp_client_task(
    host: HostAddr,
    max_queued_requests: usize,
    retry: Box<dyn RetryStrategy>,
    decode: DecodeLevel,
) -> Channel {
    crate::tcp::client::spawn_tcp_channel(host, max_queued_requests, retry, decode, true)
}

/// Spawns a channel task onto the runtime that maintains a TLS connection and
/// processes requests from an mpsc request queue. The task completes when the
/// returned channel handle and all of its clones are dropped.
///
/// The channel is initially disabled and must be enabled before it connects.
///
/// * `host` - Address of the remote server
/// * `max_queued_requests` - The maximum size of the request queue
/// * `retry` - A boxed trait object that controls when the connection is retried on failure
/// * `tls_config` - TLS client configuration
/// * `decode` - Decode log level
#[cfg(feature = "tls")]
pub fn spawn_tls_client_task(
    host: HostAddr,
    max_queued_requests: usize,
    retry: Box<dyn RetryStrategy>,
    tls_config: crate::tcp::tls::client::TlsClientConfig,
    decode: DecodeLevel,
) -> Channel {
    crate::tcp::tls::client::spawn_tls_channel(
        host,
        max_queued_requests,
        retry,
        tls_config,
        decode,
        true,
    )
}

/// Spawns a channel task onto the runtime that opens and maintains a serial
/// port and processes requests from an mpsc request queue. The task completes
/// when the returned channel handle and all of its clones are dropped.
///
/// The channel is initially disabled and must be enabled before the port opens.
///
/// * `path` - Path to the serial device. Generally `/dev/ttyUSB0` on Linux and `COM1` on Windows.
/// * `serial_settings` - Serial port settings
/// * `max_queued_requests` - The maximum size of the request queue
/// * `retry` - A boxed trait object that controls when opening the port is retried on failure
/// * `request_retries` - Number of times a request is re-sent after a response timeout
/// * `decode` - Decode log level
#[cfg(feature = "serial")]
pub fn spawn_rtu_client_task(
    path: &str,
    serial_settings: crate::serial::SerialSettings,
    max_queued_requests: usize,
    retry: Box<dyn RetryStrategy>,
    request_retries: usize,
    decode: DecodeLevel,
) -> Channel {
    crate::serial::client::spawn_rtu_channel(
        path,
        serial_settings,
        max_queued_requests,
        retry,
        request_retries,
        decode,
        true,
    )
}

/// Transport-independent client options used when spawning a channel from an
/// endpoint URL
pub struct ClientConfig {
    /// The maximum size of the request queue
    pub max_queued_requests: usize,
    /// Controls when a failed connect/open is retried
    pub retry: Box<dyn RetryStrategy>,
    /// Decode log level
    pub decode: DecodeLevel,
    /// Re-establish the transport automatically after a disconnect
    pub auto_reconnect: bool,
    /// Serial port settings, used by `rtu://` endpoints
    #[cfg(feature = "serial")]
    pub serial_settings: crate::serial::SerialSettings,
    /// Number of request re-sends after a response timeout, `rtu://` endpoints only
    #[cfg(feature = "serial")]
    pub request_retries: usize,
    /// TLS configuration, required by `tcp+tls://` endpoints
    #[cfg(feature = "tls")]
    pub tls: Option<crate::tcp::tls::client::TlsClientConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_queued_requests: 16,
            retry: crate::retry::default_retry_strategy(),
            decode: DecodeLevel::nothing(),
            auto_reconnect: true,
            #[cfg(feature = "serial")]
            serial_settings: crate::serial::SerialSettings::default(),
            #[cfg(feature = "serial")]
            request_retries: 0,
            #[cfg(feature = "tls")]
            tls: None,
        }
    }
}

/// Spawn a client channel for the transport selected by the endpoint URL
///
/// `tcp://host:port` connects over plain TCP, `tcp+tls://host:port` requires
/// `config.tls`, and `rtu://device:baud` opens a serial port with
/// `config.serial_settings` at the baud rate taken from the URL.
pub fn spawn_client(url: &EndpointUrl, config: ClientConfig) -> Result<Channel, ConfigError> {
    match url {
        EndpointUrl::Tcp(host) => Ok(crate::tcp::client::spawn_tcp_channel(
            host.clone(),
            config.max_queued_requests,
            config.retry,
            config.decode,
            config.auto_reconnect,
        )),
        #[cfg(feature = "tls")]
        EndpointUrl::TcpTls(host) => {
            let tls = config.tls.ok_or(ConfigError::MissingTlsConfig)?;
            Ok(crate::tcp::tls::client::spawn_tls_channel(
                host.clone(),
                config.max_queued_requests,
                config.retry,
                tls,
                config.decode,
                config.auto_reconnect,
            ))
        }
        #[cfg(not(feature = "tls"))]
        EndpointUrl::TcpTls(_) => Err(ConfigError::MissingTlsConfig),
        #[cfg(feature = "serial")]
        EndpointUrl::Rtu(device, baud) => {
            let settings = crate::serial::SerialSettings {
                baud_rate: *baud,
                ..config.serial_settings
            };
            Ok(crate::serial::client::spawn_rtu_channel(
                device,
                settings,
                config.max_queued_requests,
                config.retry,
                config.request_retries,
                config.decode,
                config.auto_reconnect,
            ))
        }
        #[cfg(not(feature = "serial"))]
        EndpointUrl::Rtu(device, _) => Err(ConfigError::InvalidSerialDevice(device.clone())),
    }
}
