use std::fmt::Write;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::decode::PhysDecodeLevel;

pub(crate) struct PhysLayer {
    layer: PhysLayerImpl,
    level: PhysDecodeLevel,
}

// encapsulates all possible physical layers as an enum
enum PhysLayerImpl {
    Tcp(tokio::net::TcpStream),
    #[cfg(feature = "tls")]
    Tls(WriteTimeoutGuard<tokio_rustls::TlsStream<tokio::net::TcpStream>>),
    #[cfg(feature = "serial")]
    Serial(tokio_serial::SerialStream),
    #[cfg(test)]
    Mock(sfio_tokio_mock_io::Mock),
}

impl std::fmt::Debug for PhysLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.layer {
            PhysLayerImpl::Tcp(_) => f.write_str("Tcp"),
            #[cfg(feature = "tls")]
            PhysLayerImpl::Tls(_) => f.write_str("Tls"),
            #[cfg(feature = "serial")]
            PhysLayerImpl::Serial(_) => f.write_str("Serial"),
            #[cfg(test)]
            PhysLayerImpl::Mock(_) => f.write_str("Mock"),
        }
    }
}

impl PhysLayer {
    pub(crate) fn new_tcp(socket: tokio::net::TcpStream) -> Self {
        Self {
            layer: PhysLayerImpl::Tcp(socket),
            level: PhysDecodeLevel::Nothing,
        }
    }

    #[cfg(feature = "tls")]
    pub(crate) fn new_tls(
        socket: tokio_rustls::TlsStream<tokio::net::TcpStream>,
        write_timeout: Option<Duration>,
    ) -> Self {
        Self {
            layer: PhysLayerImpl::Tls(WriteTimeoutGuard::new(socket, write_timeout)),
            level: PhysDecodeLevel::Nothing,
        }
    }

    #[cfg(feature = "serial")]
    pub(crate) fn new_serial(stream: tokio_serial::SerialStream) -> Self {
        Self {
            layer: PhysLayerImpl::Serial(stream),
            level: PhysDecodeLevel::Nothing,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_mock(mock: sfio_tokio_mock_io::Mock) -> Self {
        Self {
            layer: PhysLayerImpl::Mock(mock),
            level: PhysDecodeLevel::Nothing,
        }
    }

    pub(crate) fn set_decode_level(&mut self, level: PhysDecodeLevel) {
        self.level = level;
    }

    pub(crate) async fn read(&mut self, buffer: &mut [u8]) -> Result<usize, std::io::Error> {
        let length = match &mut self.layer {
            PhysLayerImpl::Tcp(x) => x.read(buffer).await?,
            #[cfg(feature = "tls")]
            PhysLayerImpl::Tls(x) => x.read(buffer).await?,
            #[cfg(feature = "serial")]
            PhysLayerImpl::Serial(x) => x.read(buffer).await?,
            #[cfg(test)]
            PhysLayerImpl::Mock(x) => x.read(buffer).await?,
        };

        if self.level.enabled() {
            if let Some(x) = buffer.get(0..length) {
                tracing::info!("PHYS RX - {}", PhysDisplay::new(self.level, x))
            }
        }

        Ok(length)
    }

    pub(crate) async fn write(&mut self, data: &[u8]) -> Result<(), std::io::Error> {
        if self.level.enabled() {
            tracing::info!("PHYS TX - {}", PhysDisplay::new(self.level, data));
        }

        match &mut self.layer {
            PhysLayerImpl::Tcp(x) => x.write_all(data).await,
            #[cfg(feature = "tls")]
            PhysLayerImpl::Tls(x) => x.write_all(data).await,
            #[cfg(feature = "serial")]
            PhysLayerImpl::Serial(x) => x.write_all(data).await,
            #[cfg(test)]
            PhysLayerImpl::Mock(x) => x.write_all(data).await,
        }
    }
}

/// Guards a TLS stream against the poisoned state left behind by a write
/// timeout.
///
/// A timed-out write leaves the TLS record layer in an unrecoverable state
/// that keeps reporting the same timeout on every subsequent operation,
/// tricking callers into treating the error as transient and retrying
/// forever. The guard reports the timeout once, shuts the stream down, and
/// answers every later operation with a closed-connection error.
pub(crate) struct WriteTimeoutGuard<T> {
    inner: T,
    write_timeout: Option<Duration>,
    closed: bool,
}

fn closed_error() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "connection closed after write timeout",
    )
}

impl<T> WriteTimeoutGuard<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(inner: T, write_timeout: Option<Duration>) -> Self {
        Self {
            inner,
            write_timeout,
            closed: false,
        }
    }

    pub(crate) async fn read(&mut self, buffer: &mut [u8]) -> Result<usize, std::io::Error> {
        if self.closed {
            return Err(closed_error());
        }
        self.inner.read(buffer).await
    }

    pub(crate) async fn write_all(&mut self, data: &[u8]) -> Result<(), std::io::Error> {
        if self.closed {
            return Err(closed_error());
        }

        let timeout = match self.write_timeout {
            None => return self.inner.write_all(data).await,
            Some(x) => x,
        };

        match tokio::time::timeout(timeout, self.inner.write_all(data)).await {
            Ok(result) => result,
            Err(_) => {
                self.closed = true;
                // best effort close, the stream may be wedged
                let _ = tokio::time::timeout(
                    Duration::from_millis(100),
                    self.inner.shutdown(),
                )
                .await;
                Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "write timed out",
                ))
            }
        }
    }
}

pub(crate) struct PhysDisplay<'a> {
    level: PhysDecodeLevel,
    data: &'a [u8],
}

impl<'a> PhysDisplay<'a> {
    pub(crate) fn new(level: PhysDecodeLevel, data: &'a [u8]) -> Self {
        PhysDisplay { level, data }
    }
}

impl std::fmt::Display for PhysDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} bytes", self.data.len())?;
        if self.level.data_enabled() {
            format_bytes(f, self.data)?;
        }
        Ok(())
    }
}

const BYTES_PER_DECODE_LINE: usize = 18;

pub(crate) fn format_bytes(f: &mut std::fmt::Formatter, bytes: &[u8]) -> std::fmt::Result {
    for chunk in bytes.chunks(BYTES_PER_DECODE_LINE) {
        writeln!(f)?;
        let mut first = true;
        for byte in chunk {
            if !first {
                f.write_char(' ')?;
            }
            first = false;
            write!(f, "{byte:02X?}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_timeout_poisons_the_guard() {
        // one-byte duplex buffer, nothing draining the other end, so the
        // second write can never complete
        let (local, _remote) = tokio::io::duplex(1);
        let mut guard = WriteTimeoutGuard::new(local, Some(Duration::from_millis(20)));

        let err = guard.write_all(&[0xCA, 0xFE]).await.err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);

        // every subsequent operation reports a closed connection, not a timeout
        let err = guard.write_all(&[0x01]).await.err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
        let mut buffer = [0u8; 4];
        let err = guard.read(&mut buffer).await.err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn writes_pass_through_while_within_the_timeout() {
        let (local, mut remote) = tokio::io::duplex(64);
        let mut guard = WriteTimeoutGuard::new(local, Some(Duration::from_millis(100)));

        guard.write_all(&[0x01, 0x02, 0x03]).await.unwrap();

        let mut buffer = [0u8; 3];
        tokio::io::AsyncReadExt::read_exact(&mut remote, &mut buffer)
            .await
            .unwrap();
        assert_eq!(buffer, [0x01, 0x02, 0x03]);
    }
}
