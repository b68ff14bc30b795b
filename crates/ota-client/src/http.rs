//! Minimal HTTP/1.1 framing for the upload request and its response
//!
//! Only what a single `POST` with `Connection: close` needs: the request head,
//! a response head parser, and a response reader that reports a missing
//! response instead of failing on it.

use std::io;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace, warn};

use crate::config::Credentials;
use crate::error::UploadError;
use crate::multipart::MultipartPayload;
use crate::outcome::AssumedReason;
use crate::target::UploadTarget;

/// Largest response head accepted before giving up
const MAX_HEAD_LEN: usize = 16 * 1024;

const READ_CHUNK: usize = 4096;

/// Build the request line and headers for the upload
pub(crate) fn request_head(
    target: &UploadTarget,
    payload: &MultipartPayload,
    credentials: &Credentials,
) -> String {
    format!(
        "POST {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {length}\r\n\
         Authorization: {auth}\r\n\
         Connection: close\r\n\r\n",
        path = target.request_path(),
        host = target.authority(),
        content_type = payload.content_type(),
        length = payload.len(),
        auth = credentials.basic_auth(),
    )
}

/// Parsed status line and headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// Parse a head, without the terminating blank line
    pub fn parse(raw: &[u8]) -> Result<Self, UploadError> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| UploadError::MalformedResponse("response head is not UTF-8".into()))?;

        let mut lines = text.split("\r\n");
        let status_line = lines.next().unwrap_or_default();
        let (status, reason) = parse_status_line(status_line)?;

        let headers = parse_header_lines(lines)?;

        Ok(Self {
            status,
            reason,
            headers,
        })
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Declared body length
    pub fn content_length(&self) -> Option<usize> {
        content_length(&self.headers)
    }

    fn is_informational(&self) -> bool {
        (100..200).contains(&self.status)
    }
}

/// Parse `Name: value` lines, skipping blank ones
pub(crate) fn parse_header_lines<'a>(
    lines: impl Iterator<Item = &'a str>,
) -> Result<Vec<(String, String)>, UploadError> {
    let mut headers = Vec::new();
    for line in lines.filter(|l| !l.is_empty()) {
        let (name, value) = line.split_once(':').ok_or_else(|| {
            UploadError::MalformedResponse(format!("invalid header line: {:?}", line))
        })?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok(headers)
}

/// Declared body length in a header list
pub(crate) fn content_length(headers: &[(String, String)]) -> Option<usize> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, v)| v.parse().ok())
}

fn parse_status_line(line: &str) -> Result<(u16, String), UploadError> {
    let malformed = || UploadError::MalformedResponse(format!("invalid status line: {:?}", line));

    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(malformed());
    }

    let code = parts.next().ok_or_else(malformed)?;
    if code.len() != 3 {
        return Err(malformed());
    }
    let status: u16 = code.parse().map_err(|_| malformed())?;
    let reason = parts.next().unwrap_or_default().trim().to_string();

    Ok((status, reason))
}

/// A complete response from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub head: ResponseHead,
    /// Body decoded lossily and trimmed
    pub body: String,
}

/// What the device did after receiving the body
#[derive(Debug, PartialEq, Eq)]
pub enum ResponseWait {
    Response(Response),
    NoResponse(AssumedReason),
}

/// Outcome of one bounded read
enum ReadStep {
    Data(usize),
    Eof,
    TimedOut,
    Reset,
}

async fn read_step<S>(stream: &mut S, buf: &mut BytesMut, budget: Duration) -> io::Result<ReadStep>
where
    S: AsyncRead + Unpin,
{
    buf.reserve(READ_CHUNK);
    match tokio::time::timeout(budget, stream.read_buf(buf)).await {
        Err(_) => Ok(ReadStep::TimedOut),
        Ok(Ok(0)) => Ok(ReadStep::Eof),
        Ok(Ok(n)) => Ok(ReadStep::Data(n)),
        // TLS peer closed TCP without close_notify
        Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(ReadStep::Eof),
        Ok(Err(e)) if is_reset(&e) => Ok(ReadStep::Reset),
        Ok(Err(e)) => Err(e),
    }
}

fn is_reset(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    )
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Wait for the device's response, each read bounded by `budget`
///
/// A close before any byte, a reset, or an elapsed budget while the head is
/// still incomplete all yield [`ResponseWait::NoResponse`]. Once a head has
/// been parsed, problems reading the body only truncate it.
pub async fn read_response<S>(stream: &mut S, budget: Duration) -> Result<ResponseWait, UploadError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut received_any = false;

    let head = loop {
        if let Some(end) = find_head_end(&buf) {
            let head = ResponseHead::parse(&buf[..end])?;
            buf.advance(end + 4);

            if head.is_informational() {
                trace!("Skipping informational response {}", head.status);
                continue;
            }
            break head;
        }

        if buf.len() > MAX_HEAD_LEN {
            return Err(UploadError::MalformedResponse(
                "response head exceeds 16 KiB".into(),
            ));
        }

        match read_step(stream, &mut buf, budget).await? {
            ReadStep::Data(n) => {
                trace!("Read {} response bytes", n);
                received_any = true;
            }
            ReadStep::Eof if !received_any => {
                return Ok(ResponseWait::NoResponse(AssumedReason::PeerClosed));
            }
            ReadStep::Eof => {
                return Err(UploadError::MalformedResponse(
                    "connection closed before the response head was complete".into(),
                ));
            }
            ReadStep::Reset => return Ok(ResponseWait::NoResponse(AssumedReason::ConnectionReset)),
            ReadStep::TimedOut => {
                return Ok(ResponseWait::NoResponse(AssumedReason::ResponseTimeout))
            }
        }
    };

    debug!("Response head: {} {}", head.status, head.reason);

    let expected = head.content_length();
    loop {
        if let Some(len) = expected {
            if buf.len() >= len {
                buf.truncate(len);
                break;
            }
        }

        match read_step(stream, &mut buf, budget).await {
            Ok(ReadStep::Data(_)) => {}
            Ok(ReadStep::Eof) => break,
            Ok(ReadStep::TimedOut) | Ok(ReadStep::Reset) | Err(_) => {
                warn!(
                    "Response body truncated after {} bytes (expected {:?})",
                    buf.len(),
                    expected
                );
                break;
            }
        }
    }

    let body = String::from_utf8_lossy(&buf).trim().to_string();
    Ok(ResponseWait::Response(Response { head, body }))
}
