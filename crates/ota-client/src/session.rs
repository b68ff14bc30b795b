//! Upload session: one connection, one request, one classified outcome

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::config::UploadConfig;
use crate::error::{ConfigError, UploadError};
use crate::http::{self, ResponseWait};
use crate::multipart::MultipartPayload;
use crate::outcome::UploadOutcome;
use crate::target::UploadTarget;
use crate::transport::{BoxedStream, Connector, TcpConnector, TrustRoots};

/// Upper bound on the best-effort shutdown after the response phase
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Session phases for progress reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    /// Opening the connection
    Connecting,
    /// Connected, writing request head and body
    Sending { bytes: usize },
    /// Body written, waiting for the device
    AwaitingResponse,
}

/// Uploads a framed payload to a device
///
/// Holds no connection between calls: each [`upload`](Self::upload) opens
/// its own and closes it before returning. No retries are made.
#[derive(Clone)]
pub struct UploadSession {
    config: UploadConfig,
    connector: Arc<dyn Connector>,
}

impl UploadSession {
    /// Create a session using TCP/TLS with the trust store from `config.tls`
    pub fn new(config: UploadConfig) -> Result<Self, ConfigError> {
        let roots = TrustRoots::from_config(&config.tls)?;
        Self::with_trust_roots(config, roots)
    }

    /// Create a session that trusts exactly `roots` for https targets
    pub fn with_trust_roots(config: UploadConfig, roots: TrustRoots) -> Result<Self, ConfigError> {
        let connector = TcpConnector::new(roots)?;
        Ok(Self::with_connector(config, Arc::new(connector)))
    }

    /// Create a session with a custom connector
    pub fn with_connector(config: UploadConfig, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    /// Get the configuration
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload `payload` to `target` and classify what happened
    pub async fn upload(&self, target: &UploadTarget, payload: MultipartPayload) -> UploadOutcome {
        self.upload_with_progress::<fn(UploadPhase)>(target, payload, None)
            .await
    }

    /// Upload with phase notifications
    #[instrument(skip(self, payload, progress_callback), fields(target = %target, bytes = payload.len()))]
    pub async fn upload_with_progress<F>(
        &self,
        target: &UploadTarget,
        payload: MultipartPayload,
        mut progress_callback: Option<F>,
    ) -> UploadOutcome
    where
        F: FnMut(UploadPhase),
    {
        let connect_budget = self.config.timeouts.connect();
        let response_budget = self.config.timeouts.response();

        let sent = tokio::time::timeout(
            connect_budget,
            self.connect_and_send(target, &payload, &mut progress_callback),
        )
        .await;

        let mut stream = match sent {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                warn!("Upload failed before the response phase: {}", err);
                return UploadOutcome::Failure(err);
            }
            Err(_) => {
                warn!("Connect and send exceeded {:?}", connect_budget);
                return UploadOutcome::Failure(UploadError::Timeout {
                    phase: "connect and send",
                });
            }
        };

        if let Some(ref mut cb) = progress_callback {
            cb(UploadPhase::AwaitingResponse);
        }
        info!("Upload sent, waiting for device response");

        let waited = http::read_response(&mut stream, response_budget).await;
        release(stream).await;

        let outcome = classify(waited);
        match &outcome {
            UploadOutcome::Success { status, reason, .. } => {
                info!("Device responded {} {}", status, reason)
            }
            UploadOutcome::SuccessAssumed(reason) => info!("Upload assumed successful: {}", reason),
            UploadOutcome::Failure(err) => warn!("Upload failed: {}", err),
        }
        outcome
    }

    async fn connect_and_send<F>(
        &self,
        target: &UploadTarget,
        payload: &MultipartPayload,
        progress_callback: &mut Option<F>,
    ) -> Result<BoxedStream, UploadError>
    where
        F: FnMut(UploadPhase),
    {
        if let Some(cb) = progress_callback.as_mut() {
            cb(UploadPhase::Connecting);
        }
        let mut stream = self.connector.connect(target).await?;

        if let Some(cb) = progress_callback.as_mut() {
            cb(UploadPhase::Sending {
                bytes: payload.len(),
            });
        }

        let head = http::request_head(target, payload, &self.config.credentials);
        debug!(
            "POST {} ({} header bytes, {} body bytes)",
            target.request_path(),
            head.len(),
            payload.len()
        );

        stream
            .write_all(head.as_bytes())
            .await
            .map_err(UploadError::Send)?;
        stream
            .write_all(payload.body())
            .await
            .map_err(UploadError::Send)?;
        stream.flush().await.map_err(UploadError::Send)?;

        Ok(stream)
    }
}

impl std::fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Close the stream; the peer may already be gone, so errors are ignored
async fn release(mut stream: BoxedStream) {
    match tokio::time::timeout(SHUTDOWN_GRACE, stream.shutdown()).await {
        Ok(Ok(())) => debug!("Connection closed"),
        Ok(Err(e)) => debug!("Shutdown after response phase failed: {}", e),
        Err(_) => debug!("Shutdown after response phase timed out"),
    }
}

fn classify(waited: Result<ResponseWait, UploadError>) -> UploadOutcome {
    match waited {
        Ok(ResponseWait::Response(response)) if response.head.status >= 400 => {
            UploadOutcome::Failure(UploadError::Status {
                status: response.head.status,
                reason: response.head.reason,
                body: response.body,
            })
        }
        Ok(ResponseWait::Response(response)) => UploadOutcome::Success {
            status: response.head.status,
            reason: response.head.reason,
            body: response.body,
        },
        Ok(ResponseWait::NoResponse(reason)) => UploadOutcome::SuccessAssumed(reason),
        Err(err) => UploadOutcome::Failure(err),
    }
}
