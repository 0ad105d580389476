use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_rustls::rustls;

use crate::common::phys::PhysLayer;
use crate::tcp::tls::{build_root_store, load_certs, load_private_key, MinTlsVersion, TlsError};

/// TLS configuration for a server
#[derive(Clone)]
pub struct TlsServerConfig {
    inner: Arc<rustls::ServerConfig>,
}

impl TlsServerConfig {
    /// Create a TLS server config
    ///
    /// Client certificate authentication is always required.
    ///
    /// * `peer_cert_path` - PEM file with the certificate authorities used to validate clients
    /// * `local_cert_path` - PEM file with the server certificate chain
    /// * `private_key_path` - PEM file with the server private key
    /// * `min_tls_version` - Minimum TLS version to accept
    pub fn new(
        peer_cert_path: &Path,
        local_cert_path: &Path,
        private_key_path: &Path,
        min_tls_version: MinTlsVersion,
    ) -> Result<Self, TlsError> {
        let roots = build_root_store(load_certs(peer_cert_path, false)?)?;
        let verifier = rustls::server::AllowAnyAuthenticatedClient::new(roots);

        let local_certs = load_certs(local_cert_path, true)?;
        let private_key = load_private_key(private_key_path)?;

        let config = rustls::ServerConfig::builder()
            .with_safe_default_cipher_suites()
            .with_safe_default_kx_groups()
            .with_protocol_versions(min_tls_version.to_rustls())?
            .with_client_cert_verifier(verifier.boxed())
            .with_single_cert(local_certs, private_key)?;

        Ok(TlsServerConfig {
            inner: Arc::new(config),
        })
    }

    pub(crate) async fn handle_connection(
        &mut self,
        socket: TcpStream,
        write_timeout: Option<Duration>,
    ) -> Result<(PhysLayer, String), String> {
        let connector = tokio_rustls::TlsAcceptor::from(self.inner.clone());
        match connector.accept(socket).await {
            Err(err) => Err(format!("failed to establish TLS session: {err}")),
            Ok(stream) => {
                // the verifier guarantees a client certificate is present
                let role = match stream
                    .get_ref()
                    .1
                    .peer_certificates()
                    .and_then(|x| x.first())
                {
                    Some(peer_cert) => extract_modbus_role(&peer_cert.0),
                    None => {
                        return Err("no peer certificate".to_string());
                    }
                };

                tracing::info!("client role: {:?}", role);

                let layer =
                    PhysLayer::new_tls(tokio_rustls::TlsStream::from(stream), write_timeout);

                Ok((layer, role))
            }
        }
    }
}

/// Extract the Modbus Role (OID 1.3.6.1.4.1.50316.802.1) from the peer leaf
/// certificate.
///
/// Exactly one well-formed role extension yields the role string. Everything
/// else - no extension, more than one, an unparseable certificate or an
/// extension value that is not a DER UTF8String - yields the empty role. The
/// empty role is a valid outcome and never fails the connection; access
/// decisions belong to the request handler.
pub(crate) fn extract_modbus_role(cert_der: &[u8]) -> String {
    let parsed = match rx509::x509::Certificate::parse(cert_der) {
        Ok(x) => x,
        Err(err) => {
            tracing::warn!("unable to parse peer certificate: {:?}", err);
            return String::new();
        }
    };

    let extensions = match parsed.tbs_certificate.value.extensions.as_ref() {
        Some(x) => x,
        None => return String::new(),
    };

    let extensions = match extensions.parse() {
        Ok(x) => x,
        Err(err) => {
            tracing::warn!("unable to parse certificate extensions: {:?}", err);
            return String::new();
        }
    };

    let mut it = extensions.into_iter().filter_map(|ext| match ext.content {
        rx509::x509::ext::SpecificExtension::ModbusRole(role) => Some(role.role.to_string()),
        _ => None,
    });

    let role = match it.next() {
        Some(role) => role,
        None => return String::new(),
    };

    if it.next().is_some() {
        tracing::warn!("peer certificate has more than one Modbus Role extension");
        return String::new();
    }

    role
}

#[cfg(test)]
mod tests {
    use super::*;

    // self-signed test certificates, only ever used by these tests
    const CERT_WITH_ROLE: &str = include_str!("test/client_cert_with_role.pem");
    const CERT_WITHOUT_ROLE: &str = include_str!("test/client_cert_without_role.pem");

    fn decode_pem(pem: &str) -> Vec<u8> {
        let mut certs = rustls_pemfile::certs(&mut pem.as_bytes()).unwrap();
        assert_eq!(certs.len(), 1);
        certs.remove(0)
    }

    #[test]
    fn extracts_role_from_single_role_extension() {
        let der = decode_pem(CERT_WITH_ROLE);
        assert_eq!(extract_modbus_role(&der), "operator2");
    }

    #[test]
    fn certificate_without_role_extension_yields_empty_role() {
        let der = decode_pem(CERT_WITHOUT_ROLE);
        assert_eq!(extract_modbus_role(&der), "");
    }

    #[test]
    fn garbage_input_yields_empty_role() {
        assert_eq!(extract_modbus_role(&[0xDE, 0xAD, 0xBE, 0xEF]), "");
        assert_eq!(extract_modbus_role(&[]), "");
    }
}
