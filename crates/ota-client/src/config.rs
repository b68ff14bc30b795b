//! Upload configuration with YAML and TOML support

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::multipart::Boundary;
use crate::target::DEFAULT_ENDPOINT;

/// Upload configuration
///
/// Can be loaded from YAML, TOML, or constructed programmatically.
/// Every field has a default matching the device firmware, so an empty
/// document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// HTTP Basic credentials expected by the device
    #[serde(default)]
    pub credentials: Credentials,

    /// Endpoint path appended to the target
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Multipart boundary strategy
    #[serde(default)]
    pub boundary: Boundary,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// TLS settings for https targets
    #[serde(default)]
    pub tls: TlsConfig,
}

/// HTTP Basic credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_password")]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value for the Authorization header
    pub fn basic_auth(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", token)
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: default_password(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_username() -> String {
    "ota".to_string()
}

fn default_password() -> String {
    "marbletrack".to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            endpoint: default_endpoint(),
            boundary: Boundary::default(),
            timeouts: TimeoutsConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

/// Timeout configuration
///
/// The connect budget covers connect through the last byte of the body.
/// The response budget bounds each read after the body is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Connect-and-send timeout in milliseconds (default: 3 minutes)
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,

    /// Response wait timeout in milliseconds (default: 10s)
    #[serde(default = "default_response_timeout")]
    pub response_ms: u64,
}

impl TimeoutsConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn response(&self) -> Duration {
        Duration::from_millis(self.response_ms)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_timeout(),
            response_ms: default_response_timeout(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    180_000 // 3 minutes
}

fn default_response_timeout() -> u64 {
    10_000 // 10 seconds
}

/// TLS trust configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Additional PEM file of CA certificates to trust
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// Trust the bundled Mozilla root set
    #[serde(default = "default_true")]
    pub webpki_roots: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ca_file: None,
            webpki_roots: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl UploadConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Create a builder for programmatic configuration
    pub fn builder() -> UploadConfigBuilder {
        UploadConfigBuilder::new()
    }
}

/// Builder for UploadConfig
#[derive(Debug, Default)]
pub struct UploadConfigBuilder {
    config: UploadConfig,
}

impl UploadConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Basic auth credentials
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Credentials::new(username, password);
        self
    }

    /// Set the endpoint path
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Set the boundary strategy
    pub fn boundary(mut self, boundary: Boundary) -> Self {
        self.config.boundary = boundary;
        self
    }

    /// Set the connect-and-send timeout
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.connect_ms = ms;
        self
    }

    /// Set the response wait timeout
    pub fn response_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.response_ms = ms;
        self
    }

    /// Trust an additional PEM CA file
    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tls.ca_file = Some(path.into());
        self
    }

    /// Enable or disable the bundled root set
    pub fn webpki_roots(mut self, enabled: bool) -> Self {
        self.config.tls.webpki_roots = enabled;
        self
    }

    pub fn build(self) -> UploadConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UploadConfig::default();
        assert_eq!(config.credentials.username, "ota");
        assert_eq!(config.credentials.password, "marbletrack");
        assert_eq!(config.endpoint, "/ota");
        assert_eq!(config.boundary, Boundary::Random);
        assert_eq!(config.timeouts.connect(), Duration::from_secs(180));
        assert_eq!(config.timeouts.response(), Duration::from_secs(10));
        assert!(config.tls.webpki_roots);
        assert!(config.tls.ca_file.is_none());
    }

    #[test]
    fn test_basic_auth_header() {
        let credentials = Credentials::default();
        // base64("ota:marbletrack")
        assert_eq!(credentials.basic_auth(), "Basic b3RhOm1hcmJsZXRyYWNr");
    }

    #[test]
    fn test_debug_redacts_password() {
        let debug = format!("{:?}", Credentials::new("admin", "hunter2"));
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
credentials:
  username: "admin"
  password: "secret"

boundary:
  fixed: "----platformio-ota-boundary"

timeouts:
  response_ms: 2500
"#;

        let config = UploadConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.credentials, Credentials::new("admin", "secret"));
        assert_eq!(config.boundary, Boundary::legacy());
        assert_eq!(config.timeouts.response_ms, 2500);
        assert_eq!(config.timeouts.connect_ms, 180_000);
        assert_eq!(config.endpoint, "/ota");
    }

    #[test]
    fn test_toml_parsing() {
        let content = r#"
endpoint = "/update"
boundary = "random"

[credentials]
password = "other"

[tls]
ca_file = "/etc/ota/ca.pem"
webpki_roots = false
"#;

        let config = UploadConfig::from_toml(content).unwrap();
        assert_eq!(config.endpoint, "/update");
        assert_eq!(config.credentials.username, "ota");
        assert_eq!(config.credentials.password, "other");
        assert_eq!(config.tls.ca_file, Some(PathBuf::from("/etc/ota/ca.pem")));
        assert!(!config.tls.webpki_roots);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(UploadConfig::from_toml("").unwrap(), UploadConfig::default());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = UploadConfig::from_yaml("timeouts: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_builder() {
        let config = UploadConfig::builder()
            .credentials("user", "pass")
            .endpoint("/firmware")
            .boundary(Boundary::legacy())
            .connect_timeout_ms(5_000)
            .response_timeout_ms(500)
            .webpki_roots(false)
            .build();

        assert_eq!(config.credentials.username, "user");
        assert_eq!(config.endpoint, "/firmware");
        assert_eq!(config.timeouts.connect_ms, 5_000);
        assert_eq!(config.timeouts.response_ms, 500);
        assert!(!config.tls.webpki_roots);
    }

    #[test]
    fn test_yaml_roundtrip_keeps_boundary() {
        let config = UploadConfig::builder().boundary(Boundary::legacy()).build();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(UploadConfig::from_yaml(&yaml).unwrap(), config);
    }
}
