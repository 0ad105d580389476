//! Endpoint URLs select the transport: `tcp://host:port` for MBAP,
//! `tcp+tls://host:port` for MBAPS and `rtu:///dev/ttyUSB0:9600` for serial.

use std::str::FromStr;

use crate::client::HostAddr;

/// Errors produced while assembling a client or server from configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The URL is not of the form `scheme://authority`
    InvalidUrl(String),
    /// The URL scheme does not map to a supported transport
    UnsupportedScheme(String),
    /// The host or port portion could not be parsed
    InvalidAddress(String),
    /// The serial device portion is missing a device path or baud rate
    InvalidSerialDevice(String),
    /// A `tcp+tls://` endpoint requires a TLS configuration
    MissingTlsConfig,
}

impl std::error::Error for ConfigError {}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConfigError::InvalidUrl(url) => write!(f, "invalid URL: {url}"),
            ConfigError::UnsupportedScheme(scheme) => {
                write!(f, "unsupported URL scheme: {scheme}")
            }
            ConfigError::InvalidAddress(addr) => write!(f, "invalid host:port address: {addr}"),
            ConfigError::InvalidSerialDevice(device) => {
                write!(f, "invalid serial device specification: {device}")
            }
            ConfigError::MissingTlsConfig => {
                f.write_str("tcp+tls endpoints require a TLS configuration")
            }
        }
    }
}

/// A parsed endpoint URL
#[derive(Clone, Debug, PartialEq)]
pub enum EndpointUrl {
    /// MBAP over plain TCP
    Tcp(HostAddr),
    /// MBAP over mutually-authenticated TLS
    TcpTls(HostAddr),
    /// Serial RTU: device path and baud rate
    Rtu(String, u32),
}

fn parse_host_addr(authority: &str) -> Result<HostAddr, ConfigError> {
    let (host, port) = authority
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::InvalidAddress(authority.to_string()))?;

    if host.is_empty() {
        return Err(ConfigError::InvalidAddress(authority.to_string()));
    }

    let port: u16 = port
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(authority.to_string()))?;

    match std::net::IpAddr::from_str(host) {
        Ok(ip) => Ok(HostAddr::ip(ip, port)),
        Err(_) => Ok(HostAddr::dns(host.to_string(), port)),
    }
}

fn parse_serial(authority: &str) -> Result<(String, u32), ConfigError> {
    let (device, baud) = authority
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::InvalidSerialDevice(authority.to_string()))?;

    if device.is_empty() {
        return Err(ConfigError::InvalidSerialDevice(authority.to_string()));
    }

    let baud: u32 = baud
        .parse()
        .map_err(|_| ConfigError::InvalidSerialDevice(authority.to_string()))?;

    Ok((device.to_string(), baud))
}

impl FromStr for EndpointUrl {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, authority) = s
            .split_once("://")
            .ok_or_else(|| ConfigError::InvalidUrl(s.to_string()))?;

        match scheme {
            "tcp" => Ok(EndpointUrl::Tcp(parse_host_addr(authority)?)),
            "tcp+tls" => Ok(EndpointUrl::TcpTls(parse_host_addr(authority)?)),
            "rtu" => {
                let (device, baud) = parse_serial(authority)?;
                Ok(EndpointUrl::Rtu(device, baud))
            }
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl std::fmt::Display for EndpointUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EndpointUrl::Tcp(addr) => write!(f, "tcp://{addr}"),
            EndpointUrl::TcpTls(addr) => write!(f, "tcp+tls://{addr}"),
            EndpointUrl::Rtu(device, baud) => write!(f, "rtu://{device}:{baud}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_urls() {
        assert_eq!(
            "tcp://127.0.0.1:502".parse::<EndpointUrl>().unwrap(),
            EndpointUrl::Tcp(HostAddr::ip("127.0.0.1".parse().unwrap(), 502))
        );
        assert_eq!(
            "tcp://plc.local:1502".parse::<EndpointUrl>().unwrap(),
            EndpointUrl::Tcp(HostAddr::dns("plc.local".to_string(), 1502))
        );
    }

    #[test]
    fn parses_tls_urls() {
        assert_eq!(
            "tcp+tls://10.0.0.7:802".parse::<EndpointUrl>().unwrap(),
            EndpointUrl::TcpTls(HostAddr::ip("10.0.0.7".parse().unwrap(), 802))
        );
    }

    #[test]
    fn parses_rtu_urls_with_absolute_device_paths() {
        assert_eq!(
            "rtu:///dev/ttyUSB0:19200".parse::<EndpointUrl>().unwrap(),
            EndpointUrl::Rtu("/dev/ttyUSB0".to_string(), 19200)
        );
        assert_eq!(
            "rtu://COM3:9600".parse::<EndpointUrl>().unwrap(),
            EndpointUrl::Rtu("COM3".to_string(), 9600)
        );
    }

    #[test]
    fn rejects_malformed_urls() {
        assert_eq!(
            "127.0.0.1:502".parse::<EndpointUrl>(),
            Err(ConfigError::InvalidUrl("127.0.0.1:502".to_string()))
        );
        assert_eq!(
            "udp://127.0.0.1:502".parse::<EndpointUrl>(),
            Err(ConfigError::UnsupportedScheme("udp".to_string()))
        );
        assert_eq!(
            "tcp://127.0.0.1:banana".parse::<EndpointUrl>(),
            Err(ConfigError::InvalidAddress("127.0.0.1:banana".to_string()))
        );
        assert_eq!(
            "rtu:///dev/ttyUSB0".parse::<EndpointUrl>(),
            Err(ConfigError::InvalidSerialDevice("/dev/ttyUSB0".to_string()))
        );
    }
}
