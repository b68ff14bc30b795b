//! Test utilities for ota-client
//!
//! Provides a scripted device that accepts uploads on a local port (plain or
//! TLS), and a connector spy that records connection attempts.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use rustls::ServerConfig;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::error::{ConfigError, UploadError};
use crate::http;
use crate::target::UploadTarget;
use crate::transport::{BoxedStream, Connector, TcpConnector, TrustRoots};

/// What the simulated device does once it has read the full request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceBehavior {
    /// Close the socket without replying (reboot)
    CloseAfterBody,
    /// Abort the connection with a TCP reset
    ResetAfterBody,
    /// Keep the connection open and never reply
    Silent,
    /// Reply with a complete HTTP response, then close
    Respond {
        status: u16,
        reason: String,
        body: String,
    },
}

impl DeviceBehavior {
    /// Reply with `status` and a text body
    pub fn respond(status: u16, reason: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Respond {
            status,
            reason: reason.into(),
            body: body.into(),
        }
    }
}

/// A request as received by the simulated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRequest {
    /// e.g. `POST /ota HTTP/1.1`
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ReceivedRequest {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A simulated OTA device that automatically shuts down when dropped
pub struct MockDevice {
    pub addr: SocketAddr,
    secure: bool,
    requests: Arc<Mutex<Vec<ReceivedRequest>>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl MockDevice {
    /// Start a plain HTTP device on an ephemeral localhost port
    pub async fn start(behavior: DeviceBehavior) -> std::io::Result<Self> {
        Self::spawn(behavior, None).await
    }

    /// Start an HTTPS device that terminates TLS with `tls`
    ///
    /// The certificate in `tls` should be valid for `localhost`, which is the
    /// host [`target`](Self::target) returns.
    pub async fn start_tls(
        behavior: DeviceBehavior,
        tls: Arc<ServerConfig>,
    ) -> std::io::Result<Self> {
        Self::spawn(behavior, Some(TlsAcceptor::from(tls))).await
    }

    async fn spawn(
        behavior: DeviceBehavior,
        acceptor: Option<TlsAcceptor>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let secure = acceptor.is_some();

        let requests = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();

        let recorded = requests.clone();
        let handle = tokio::spawn(async move {
            // Silent connections stay open until shutdown
            let mut held = Vec::new();

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => {
                        let Ok((stream, peer)) = accepted else { break };
                        debug!("Mock device accepted {}", peer);

                        if behavior == DeviceBehavior::ResetAfterBody {
                            // SO_LINGER with a zero timeout turns close into RST
                            let _ = socket2::SockRef::from(&stream)
                                .set_linger(Some(Duration::ZERO));
                        }

                        let stream: BoxedStream = match &acceptor {
                            None => Box::new(stream),
                            Some(acceptor) => match acceptor.accept(stream).await {
                                Ok(tls) => Box::new(tls),
                                Err(e) => {
                                    debug!("Mock device TLS handshake failed: {}", e);
                                    continue;
                                }
                            },
                        };

                        if let Some(stream) = serve(stream, &behavior, &recorded).await {
                            held.push(stream);
                        }
                    }
                }
            }
        });

        Ok(Self {
            addr,
            secure,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Target string for this device
    ///
    /// `127.0.0.1:port` for plain devices, `https://localhost:port` for TLS.
    pub fn target(&self) -> String {
        if self.secure {
            format!("https://localhost:{}", self.addr.port())
        } else {
            self.addr.to_string()
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.requests.lock().clone()
    }

    /// Shutdown the device gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Read one request, record it and act out `behavior`
///
/// Returns the stream if it must be kept open. Closing never sends a TLS
/// `close_notify`, like a device that reboots mid-connection.
async fn serve(
    mut stream: BoxedStream,
    behavior: &DeviceBehavior,
    recorded: &Mutex<Vec<ReceivedRequest>>,
) -> Option<BoxedStream> {
    let request = read_request(&mut stream).await?;
    recorded.lock().push(request);

    match behavior {
        DeviceBehavior::CloseAfterBody | DeviceBehavior::ResetAfterBody => {
            drop(stream);
            None
        }
        DeviceBehavior::Silent => Some(stream),
        DeviceBehavior::Respond {
            status,
            reason,
            body,
        } => {
            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                reason,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
            None
        }
    }
}

async fn read_request<S>(stream: &mut S) -> Option<ReceivedRequest>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        buf.reserve(4096);
        if stream.read_buf(&mut buf).await.ok()? == 0 {
            return None;
        }
    };

    let raw_head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = raw_head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers = http::parse_header_lines(lines).ok()?;
    let body_len = http::content_length(&headers).unwrap_or(0);

    let mut body = buf.split_off(head_end + 4);
    while body.len() < body_len {
        body.reserve(4096);
        if stream.read_buf(&mut body).await.ok()? == 0 {
            break;
        }
    }

    Some(ReceivedRequest {
        request_line,
        headers,
        body: body.to_vec(),
    })
}

/// Connector that counts connection attempts before delegating
pub struct CountingConnector {
    inner: Arc<dyn Connector>,
    attempts: AtomicUsize,
}

impl CountingConnector {
    pub fn new(inner: Arc<dyn Connector>) -> Self {
        Self {
            inner,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Wrap the default TCP/TLS connector
    pub fn tcp() -> Result<Self, ConfigError> {
        let connector = TcpConnector::new(TrustRoots::webpki())?;
        Ok(Self::new(Arc::new(connector)))
    }

    /// Number of `connect` calls so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for CountingConnector {
    async fn connect(&self, target: &UploadTarget) -> Result<BoxedStream, UploadError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.connect(target).await
    }
}
