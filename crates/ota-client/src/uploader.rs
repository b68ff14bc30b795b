//! End-to-end upload of a firmware file

use std::path::Path;

use tracing::info;

use crate::config::UploadConfig;
use crate::error::ConfigError;
use crate::firmware::FirmwareArtifact;
use crate::multipart::MultipartPayload;
use crate::outcome::UploadOutcome;
use crate::session::{UploadPhase, UploadSession};
use crate::target::UploadTarget;

/// An upload whose inputs have all been validated
#[derive(Debug, Clone)]
pub struct PreparedUpload {
    pub target: UploadTarget,
    pub file_name: String,
    pub firmware_len: usize,
    pub payload: MultipartPayload,
}

/// Loads firmware, resolves the target and runs the session
///
/// Every input problem is returned as a [`ConfigError`] before the session's
/// connector is used.
#[derive(Debug, Clone)]
pub struct Uploader {
    session: UploadSession,
}

impl Uploader {
    /// Create an uploader with the default TCP/TLS connector
    pub fn new(config: UploadConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_session(UploadSession::new(config)?))
    }

    pub fn with_session(session: UploadSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    /// Validate inputs and frame the request body
    pub fn prepare(
        &self,
        firmware_path: impl AsRef<Path>,
        target: &str,
    ) -> Result<PreparedUpload, ConfigError> {
        let config = self.session.config();

        let artifact = FirmwareArtifact::load(firmware_path)?;
        let target = UploadTarget::parse_with_endpoint(target, &config.endpoint)?;
        let payload = MultipartPayload::from_artifact(&artifact, &config.boundary);

        Ok(PreparedUpload {
            target,
            file_name: artifact.file_name().to_string(),
            firmware_len: artifact.len(),
            payload,
        })
    }

    /// Upload a prepared request
    pub async fn run<F>(&self, prepared: PreparedUpload, progress_callback: Option<F>) -> UploadOutcome
    where
        F: FnMut(UploadPhase),
    {
        info!(
            "Uploading {} ({} bytes) to {}",
            prepared.file_name, prepared.firmware_len, prepared.target
        );
        self.session
            .upload_with_progress(&prepared.target, prepared.payload, progress_callback)
            .await
    }

    /// Upload the firmware at `firmware_path` to `target`
    pub async fn upload_file(
        &self,
        firmware_path: impl AsRef<Path>,
        target: &str,
    ) -> Result<UploadOutcome, ConfigError> {
        let prepared = self.prepare(firmware_path, target)?;
        Ok(self.run::<fn(UploadPhase)>(prepared, None).await)
    }
}
