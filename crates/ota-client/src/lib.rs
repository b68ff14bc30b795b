//! OTA Upload Client Library
//!
//! Uploads a firmware image to an embedded device's HTTP OTA endpoint as a
//! single `multipart/form-data` POST, then classifies how the device reacted.
//!
//! Devices typically reboot into the new image as soon as the upload is
//! accepted, often before they finish replying. A closed connection, a reset
//! or silence after the request was fully sent therefore counts as
//! [`UploadOutcome::SuccessAssumed`] rather than a failure.
//!
//! # Example
//!
//! ```rust,no_run
//! use ota_client::{UploadConfig, Uploader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let uploader = Uploader::new(UploadConfig::default())?;
//!
//!     let outcome = uploader
//!         .upload_file(".pio/build/esp32dev/firmware.bin", "192.168.1.50")
//!         .await?;
//!
//!     println!("{:?}", outcome.summary());
//!     std::process::exit(outcome.exit_code() as i32);
//! }
//! ```
//!
//! # Lower level
//!
//! [`UploadSession`] takes an already framed [`MultipartPayload`] and a parsed
//! [`UploadTarget`]; [`Uploader`] adds file loading and input validation.
//!
//! ```rust,ignore
//! let target = UploadTarget::parse("https://device.local")?;
//! let payload = MultipartPayload::build(bytes, "app.bin", "my-boundary");
//! let outcome = session.upload(&target, payload).await;
//! ```
//!
//! # Testing
//!
//! The `testing` module provides a scripted device for integration testing:
//!
//! ```rust,ignore
//! use ota_client::testing::{DeviceBehavior, MockDevice};
//!
//! let device = MockDevice::start(DeviceBehavior::CloseAfterBody).await?;
//! let outcome = uploader.upload_file("app.bin", &device.target()).await?;
//! ```

mod config;
mod error;
mod firmware;
pub mod http;
mod multipart;
mod outcome;
mod session;
mod target;
pub mod testing;
pub mod transport;
mod uploader;

pub use config::{Credentials, TimeoutsConfig, TlsConfig, UploadConfig, UploadConfigBuilder};
pub use error::{ConfigError, Result, UploadError};
pub use firmware::FirmwareArtifact;
pub use multipart::{Boundary, MultipartPayload, LEGACY_BOUNDARY};
pub use outcome::{AssumedReason, OutcomeSummary, UploadOutcome};
pub use session::{UploadPhase, UploadSession};
pub use target::{Scheme, UploadTarget, DEFAULT_ENDPOINT};
pub use uploader::{PreparedUpload, Uploader};

// Re-export transport types for convenience
pub use transport::{BoxedStream, Connector, TcpConnector, TrustRoots};
