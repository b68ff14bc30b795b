//! multipart/form-data framing for a single firmware part

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::firmware::FirmwareArtifact;

/// Boundary literal used by the PlatformIO upload hook
pub const LEGACY_BOUNDARY: &str = "----platformio-ota-boundary";

/// Form field name the device reads the image from
pub const FIELD_NAME: &str = "firmware";

const RANDOM_PREFIX: &str = "----ota-boundary-";
const RANDOM_LEN: usize = 24;

/// How the multipart boundary token is chosen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// Fresh token per request
    #[default]
    Random,
    /// Fixed literal, for device parsers that expect a specific token
    Fixed(String),
}

impl Boundary {
    /// Boundary expected by parsers written for the PlatformIO upload hook
    pub fn legacy() -> Self {
        Self::Fixed(LEGACY_BOUNDARY.to_string())
    }

    /// Produce the token for one request
    pub fn token(&self) -> String {
        match self {
            Self::Random => {
                let suffix: String = rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(RANDOM_LEN)
                    .map(char::from)
                    .collect();
                format!("{}{}", RANDOM_PREFIX, suffix)
            }
            Self::Fixed(token) => token.clone(),
        }
    }
}

/// A fully framed request body and the boundary that frames it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPayload {
    body: Vec<u8>,
    boundary: String,
}

impl MultipartPayload {
    /// Frame `bytes` as the single `firmware` part
    ///
    /// The body is `--{boundary}\r\n`, the part headers, the raw bytes and
    /// `\r\n--{boundary}--\r\n`. No transformation is applied to `bytes`.
    pub fn build(bytes: &[u8], file_name: &str, boundary: impl Into<String>) -> Self {
        let boundary = boundary.into();
        let header = part_header(&boundary, file_name);
        let footer = closing_delimiter(&boundary);

        let mut body = Vec::with_capacity(header.len() + bytes.len() + footer.len());
        body.extend_from_slice(header.as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(footer.as_bytes());

        Self { body, boundary }
    }

    /// Frame a loaded artifact using the given boundary strategy
    pub fn from_artifact(artifact: &FirmwareArtifact, boundary: &Boundary) -> Self {
        Self::build(artifact.bytes(), artifact.file_name(), boundary.token())
    }

    /// Framed body bytes
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Boundary token used in the body
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the request's Content-Type header
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Exact body length in bytes
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Whether the body is empty (never true for a built payload)
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

fn part_header(boundary: &str, file_name: &str) -> String {
    format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"{FIELD_NAME}\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
}

fn closing_delimiter(boundary: &str) -> String {
    format!("\r\n--{boundary}--\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exact_framing() {
        let payload = MultipartPayload::build(&[0x00, 0x01, 0x02], "app.bin", LEGACY_BOUNDARY);

        let mut expected = Vec::new();
        expected.extend_from_slice(b"------platformio-ota-boundary\r\n");
        expected.extend_from_slice(
            b"Content-Disposition: form-data; name=\"firmware\"; filename=\"app.bin\"\r\n",
        );
        expected.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        expected.extend_from_slice(&[0x00, 0x01, 0x02]);
        expected.extend_from_slice(b"\r\n------platformio-ota-boundary--\r\n");

        assert_eq!(payload.body(), expected.as_slice());
        assert_eq!(payload.boundary(), LEGACY_BOUNDARY);
    }

    #[test]
    fn test_length_and_contiguous_payload() {
        let firmware: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let payload = MultipartPayload::build(&firmware, "fw.bin", "b0undary");

        let header = part_header("b0undary", "fw.bin");
        let footer = closing_delimiter("b0undary");
        assert_eq!(payload.len(), header.len() + firmware.len() + footer.len());

        let body = payload.body();
        assert!(body.starts_with(b"--b0undary\r\n"));
        assert!(body.ends_with(b"\r\n--b0undary--\r\n"));
        assert_eq!(&body[header.len()..header.len() + firmware.len()], firmware.as_slice());
    }

    #[test]
    fn test_empty_firmware() {
        let payload = MultipartPayload::build(&[], "empty.bin", "x");
        assert!(!payload.is_empty());
        assert!(payload.body().ends_with(b"\r\n\r\n\r\n--x--\r\n"));
    }

    #[test]
    fn test_build_is_idempotent() {
        let a = MultipartPayload::build(b"\xde\xad\xbe\xef", "a.bin", LEGACY_BOUNDARY);
        let b = MultipartPayload::build(b"\xde\xad\xbe\xef", "a.bin", LEGACY_BOUNDARY);
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_boundary_tokens() {
        let boundary = Boundary::Random;
        let first = boundary.token();
        let second = boundary.token();

        assert!(first.starts_with(RANDOM_PREFIX));
        assert_eq!(first.len(), RANDOM_PREFIX.len() + RANDOM_LEN);
        assert_ne!(first, second);
    }

    #[test]
    fn test_from_artifact_uses_file_name() {
        let artifact = FirmwareArtifact::new("app.bin", vec![1, 2, 3]);
        let payload = MultipartPayload::from_artifact(&artifact, &Boundary::legacy());

        assert_eq!(payload.boundary(), LEGACY_BOUNDARY);
        assert_eq!(
            payload.content_type(),
            "multipart/form-data; boundary=----platformio-ota-boundary"
        );
        let text = String::from_utf8_lossy(payload.body());
        assert!(text.contains("filename=\"app.bin\""));
    }
}
