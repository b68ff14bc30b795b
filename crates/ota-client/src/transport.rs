//! Transport connectors: plain TCP or TLS over TCP
//!
//! The session never opens sockets itself. It asks a [`Connector`] for a
//! stream, so tests can count connection attempts or substitute a trust store.

use std::fmt;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::config::TlsConfig;
use crate::error::{ConfigError, UploadError};
use crate::target::UploadTarget;

/// Byte stream to the device
pub trait DeviceStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> DeviceStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Boxed stream returned by connectors
pub type BoxedStream = Box<dyn DeviceStream>;

/// Opens the single connection used by an upload
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `target`, wrapping in TLS when the target is secure
    async fn connect(&self, target: &UploadTarget) -> Result<BoxedStream, UploadError>;
}

/// Certificate authorities trusted for https targets
#[derive(Clone)]
pub struct TrustRoots {
    store: Arc<RootCertStore>,
}

impl TrustRoots {
    /// The bundled Mozilla root set
    pub fn webpki() -> Self {
        let mut store = RootCertStore::empty();
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::from_store(store)
    }

    /// Trust exactly the certificates in `store`
    pub fn from_store(store: RootCertStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Build the trust store described by `config`
    pub fn from_config(config: &TlsConfig) -> Result<Self, ConfigError> {
        let mut store = RootCertStore::empty();

        if config.webpki_roots {
            store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }

        if let Some(path) = &config.ca_file {
            let added = add_pem_file(&mut store, path)?;
            info!("Trusting {} CA certificate(s) from {}", added, path.display());
        }

        Ok(Self::from_store(store))
    }

    /// Number of trust anchors
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether no certificate is trusted
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl fmt::Debug for TrustRoots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustRoots")
            .field("anchors", &self.store.len())
            .finish()
    }
}

fn add_pem_file(store: &mut RootCertStore, path: &Path) -> Result<usize, ConfigError> {
    let file = std::fs::File::open(path)
        .map_err(|e| ConfigError::Tls(format!("{}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);

    let mut added = 0;
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|e| ConfigError::Tls(format!("{}: {}", path.display(), e)))?;
        store
            .add(cert)
            .map_err(|e| ConfigError::Tls(format!("{}: {}", path.display(), e)))?;
        added += 1;
    }

    if added == 0 {
        return Err(ConfigError::Tls(format!(
            "{}: no PEM certificates found",
            path.display()
        )));
    }

    Ok(added)
}

/// Connects over TCP, adding TLS for secure targets
#[derive(Clone)]
pub struct TcpConnector {
    tls: TlsConnector,
}

impl TcpConnector {
    /// Create a connector that validates servers against `roots`
    pub fn new(roots: TrustRoots) -> Result<Self, ConfigError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| ConfigError::Tls(e.to_string()))?
            .with_root_certificates(roots.store)
            .with_no_client_auth();

        Ok(Self {
            tls: TlsConnector::from(Arc::new(config)),
        })
    }
}

impl fmt::Debug for TcpConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnector").finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, target: &UploadTarget) -> Result<BoxedStream, UploadError> {
        debug!("Connecting to {}:{}", target.host(), target.port());

        let tcp = TcpStream::connect((target.host(), target.port()))
            .await
            .map_err(|e| {
                UploadError::Connect(format!("{}:{}: {}", target.host(), target.port(), e))
            })?;
        tcp.set_nodelay(true).ok();

        if !target.is_secure() {
            return Ok(Box::new(tcp));
        }

        let server_name = ServerName::try_from(target.host().to_string())
            .map_err(|e| UploadError::Tls(format!("invalid server name: {}", e)))?;

        let tls = self
            .tls
            .connect(server_name, tcp)
            .await
            .map_err(|e| UploadError::Tls(e.to_string()))?;

        debug!("TLS established with {}", target.host());
        Ok(Box::new(tls))
    }
}
