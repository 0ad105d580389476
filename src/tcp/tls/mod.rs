pub(crate) mod client;
pub(crate) mod server;

use std::io::ErrorKind;
use std::path::Path;

use tokio_rustls::rustls;

/// TLS-related errors
#[derive(Debug)]
pub enum TlsError {
    /// Invalid peer certificate
    InvalidPeerCertificate(std::io::Error),
    /// Invalid local certificate
    InvalidLocalCertificate(std::io::Error),
    /// Invalid private key
    InvalidPrivateKey(std::io::Error),
    /// DNS name is invalid
    InvalidDnsName,
    /// Error building TLS configuration
    BadConfig(String),
}

impl std::fmt::Display for TlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPeerCertificate(err) => {
                write!(f, "invalid peer certificate file: {err}")
            }
            Self::InvalidLocalCertificate(err) => {
                write!(f, "invalid local certificate file: {err}")
            }
            Self::InvalidPrivateKey(err) => write!(f, "invalid private key file: {err}"),
            Self::InvalidDnsName => write!(f, "invalid DNS name"),
            Self::BadConfig(err) => write!(f, "bad config: {err}"),
        }
    }
}

impl std::error::Error for TlsError {}

impl From<rustls::Error> for TlsError {
    fn from(err: rustls::Error) -> Self {
        Self::BadConfig(err.to_string())
    }
}

/// Minimum TLS version to allow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinTlsVersion {
    /// TLS 1.2
    V1_2,
    /// TLS 1.3
    V1_3,
}

impl MinTlsVersion {
    fn to_rustls(self) -> &'static [&'static rustls::SupportedProtocolVersion] {
        static MIN_TLS12_VERSIONS: &[&rustls::SupportedProtocolVersion] =
            &[&rustls::version::TLS13, &rustls::version::TLS12];
        static MIN_TLS13_VERSIONS: &[&rustls::SupportedProtocolVersion] =
            &[&rustls::version::TLS13];

        match self {
            Self::V1_2 => MIN_TLS12_VERSIONS,
            Self::V1_3 => MIN_TLS13_VERSIONS,
        }
    }
}

pub(crate) fn load_certs(path: &Path, is_local: bool) -> Result<Vec<rustls::Certificate>, TlsError> {
    let map_error = |err| match is_local {
        false => TlsError::InvalidPeerCertificate(err),
        true => TlsError::InvalidLocalCertificate(err),
    };

    let content = std::fs::read(path).map_err(map_error)?;
    let certs = rustls_pemfile::certs(&mut content.as_slice()).map_err(map_error)?;

    if certs.is_empty() {
        return Err(map_error(std::io::Error::new(
            ErrorKind::InvalidData,
            "no certificate in pem file",
        )));
    }

    Ok(certs.into_iter().map(rustls::Certificate).collect())
}

pub(crate) fn load_private_key(path: &Path) -> Result<rustls::PrivateKey, TlsError> {
    let content = std::fs::read(path).map_err(TlsError::InvalidPrivateKey)?;
    let mut reader = content.as_slice();

    loop {
        match rustls_pemfile::read_one(&mut reader).map_err(TlsError::InvalidPrivateKey)? {
            None => {
                return Err(TlsError::InvalidPrivateKey(std::io::Error::new(
                    ErrorKind::InvalidData,
                    "no private key in pem file",
                )))
            }
            Some(rustls_pemfile::Item::RSAKey(key)) => return Ok(rustls::PrivateKey(key)),
            Some(rustls_pemfile::Item::PKCS8Key(key)) => return Ok(rustls::PrivateKey(key)),
            Some(rustls_pemfile::Item::ECKey(key)) => return Ok(rustls::PrivateKey(key)),
            // skip certificates and other items
            Some(_) => continue,
        }
    }
}

pub(crate) fn build_root_store(
    certs: Vec<rustls::Certificate>,
) -> Result<rustls::RootCertStore, TlsError> {
    let mut roots = rustls::RootCertStore::empty();
    for cert in certs {
        roots.add(&cert)?;
    }
    Ok(roots)
}
