use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_rustls::rustls;
use tracing::Instrument;

use crate::client::{Channel, HostAddr};
use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::retry::RetryStrategy;
use crate::tcp::client::{TcpChannelTask, TcpTaskConnectionHandler};
use crate::tcp::tls::{build_root_store, load_certs, load_private_key, MinTlsVersion, TlsError};

/// TLS configuration for a client channel
pub struct TlsClientConfig {
    dns_name: rustls::ServerName,
    config: Arc<rustls::ClientConfig>,
    write_timeout: Option<Duration>,
}

pub(crate) fn spawn_tls_channel(
    host: HostAddr,
    max_queued_requests: usize,
    connect_retry: Box<dyn RetryStrategy>,
    tls_config: TlsClientConfig,
    decode: DecodeLevel,
    auto_reconnect: bool,
) -> Channel {
    let (tx, rx) = tokio::sync::mpsc::channel(max_queued_requests);
    let task = async move {
        TcpChannelTask::new(
            host.clone(),
            rx,
            TcpTaskConnectionHandler::Tls(tls_config),
            connect_retry,
            decode,
            auto_reconnect,
        )
        .run()
        .instrument(tracing::info_span!("Modbus-Client-TLS", endpoint = ?host))
        .await;
    };
    tokio::spawn(task);
    Channel::new(tx)
}

impl TlsClientConfig {
    /// Create a TLS client config
    ///
    /// * `name` - Name against which the server certificate is verified
    /// * `peer_cert_path` - PEM file with the certificate authorities used to validate the server
    /// * `local_cert_path` - PEM file with the client certificate chain presented to the server
    /// * `private_key_path` - PEM file with the client private key
    /// * `min_tls_version` - Minimum TLS version to accept
    pub fn new(
        name: &str,
        peer_cert_path: &Path,
        local_cert_path: &Path,
        private_key_path: &Path,
        min_tls_version: MinTlsVersion,
    ) -> Result<Self, TlsError> {
        let dns_name = rustls::ServerName::try_from(name).map_err(|_| TlsError::InvalidDnsName)?;

        let roots = build_root_store(load_certs(peer_cert_path, false)?)?;
        let local_certs = load_certs(local_cert_path, true)?;
        let private_key = load_private_key(private_key_path)?;

        let config = rustls::ClientConfig::builder()
            .with_safe_default_cipher_suites()
            .with_safe_default_kx_groups()
            .with_protocol_versions(min_tls_version.to_rustls())?
            .with_root_certificates(roots)
            .with_client_auth_cert(local_certs, private_key)?;

        Ok(Self {
            dns_name,
            config: Arc::new(config),
            write_timeout: None,
        })
    }

    /// Force-close the TLS session when a write does not complete within `timeout`
    ///
    /// Without this, a write timeout leaves the session in a state that keeps
    /// reporting the same timeout forever.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub(crate) async fn handle_connection(
        &mut self,
        socket: TcpStream,
        endpoint: &HostAddr,
    ) -> Result<PhysLayer, String> {
        let connector = tokio_rustls::TlsConnector::from(self.config.clone());
        match connector.connect(self.dns_name.clone(), socket).await {
            Err(err) => Err(format!(
                "failed to establish TLS session with {endpoint}: {err}"
            )),
            Ok(stream) => Ok(PhysLayer::new_tls(
                tokio_rustls::TlsStream::from(stream),
                self.write_timeout,
            )),
        }
    }
}
