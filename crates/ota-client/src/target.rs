//! Upload target resolution

use std::fmt;

use url::{Host, Url};

use crate::error::ConfigError;

/// Endpoint the device firmware serves OTA uploads on
pub const DEFAULT_ENDPOINT: &str = "/ota";

/// Transport used to reach the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain TCP (`http://`)
    Plain,
    /// TLS over TCP (`https://`)
    Secure,
}

impl Scheme {
    /// Port used when the target does not name one
    pub fn default_port(self) -> u16 {
        match self {
            Self::Plain => 80,
            Self::Secure => 443,
        }
    }

    fn from_url_scheme(scheme: &str) -> Result<Self, ConfigError> {
        match scheme {
            "http" => Ok(Self::Plain),
            "https" => Ok(Self::Secure),
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// A resolved upload destination
///
/// Always points at the OTA endpoint: the endpoint path is appended to
/// whatever the user supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    url: Url,
    scheme: Scheme,
    host: String,
    port: u16,
    authority: String,
}

impl UploadTarget {
    /// Parse a `host[:port]` string, optionally prefixed with `http://` or
    /// `https://`, against the default `/ota` endpoint
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        Self::parse_with_endpoint(input, DEFAULT_ENDPOINT)
    }

    /// Parse a target string and append `endpoint` to its path
    pub fn parse_with_endpoint(input: &str, endpoint: &str) -> Result<Self, ConfigError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyTarget);
        }

        let endpoint = if endpoint.starts_with('/') {
            endpoint.to_string()
        } else {
            format!("/{}", endpoint)
        };

        let raw = match trimmed.split_once("://") {
            Some((scheme, _)) => {
                Scheme::from_url_scheme(&scheme.to_ascii_lowercase())?;
                format!("{}{}", trimmed.trim_end_matches('/'), endpoint)
            }
            None => format!("http://{}{}", trimmed.trim_end_matches('/'), endpoint),
        };

        let url = Url::parse(&raw).map_err(|e| invalid(trimmed, e.to_string()))?;
        let scheme = Scheme::from_url_scheme(url.scheme())?;

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(invalid(trimmed, "missing host")),
        };

        let port = url.port().unwrap_or_else(|| scheme.default_port());
        let authority = written_authority(trimmed).to_string();

        Ok(Self {
            url,
            scheme,
            host,
            port,
            authority,
        })
    }

    /// Transport scheme
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Whether the target requires TLS
    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::Secure
    }

    /// Host name or IP literal (no brackets)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port, with the scheme default applied
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Endpoint path
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Query string, if any
    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    /// Request target for the HTTP request line
    pub fn request_path(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    /// Value for the Host header
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Full URL of the upload endpoint
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Authority as the user wrote it, e.g. `192.168.1.50:80`
///
/// `Url` drops a port equal to the scheme default; the Host header keeps it.
fn written_authority(input: &str) -> &str {
    let rest = input.split_once("://").map_or(input, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    authority.rsplit_once('@').map_or(authority, |(_, host)| host)
}

fn invalid(target: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidTarget {
        target: target.to_string(),
        reason: reason.into(),
    }
}
