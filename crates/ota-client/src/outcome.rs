//! Terminal result of an upload attempt

use std::fmt;

use serde::Serialize;

use crate::error::UploadError;

/// Why a missing response was taken as success
///
/// A device that accepted the image reboots right away and often drops the
/// socket before replying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssumedReason {
    /// Peer closed the connection before sending any response bytes
    PeerClosed,
    /// Connection reset while waiting for the response
    ConnectionReset,
    /// No response within the response budget
    ResponseTimeout,
}

impl AssumedReason {
    pub fn describe(self) -> &'static str {
        match self {
            Self::PeerClosed => "device closed connection, likely rebooting",
            Self::ConnectionReset => "connection reset by device, likely rebooting",
            Self::ResponseTimeout => "device did not respond in time, treating as success",
        }
    }
}

impl fmt::Display for AssumedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Classified result of one upload
#[derive(Debug)]
pub enum UploadOutcome {
    /// Device answered with status < 400
    Success {
        status: u16,
        reason: String,
        body: String,
    },
    /// No response, consistent with the device rebooting
    SuccessAssumed(AssumedReason),
    /// Transport failure or status >= 400
    Failure(UploadError),
}

impl UploadOutcome {
    /// Whether the upload should be reported as successful
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure(_))
    }

    /// Process exit status for this outcome
    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// HTTP status, if the device answered
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Success { status, .. } => Some(*status),
            Self::SuccessAssumed(_) => None,
            Self::Failure(err) => err.status_code(),
        }
    }

    /// Response body text, if the device answered
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Success { body, .. } | Self::Failure(UploadError::Status { body, .. }) => {
                Some(body.as_str())
            }
            _ => None,
        }
    }

    /// Machine-readable summary
    pub fn summary(&self) -> OutcomeSummary {
        let (outcome, assumed_reason, error) = match self {
            Self::Success { .. } => ("success", None, None),
            Self::SuccessAssumed(reason) => ("success_assumed", Some(*reason), None),
            Self::Failure(err) => ("failure", None, Some(err.to_string())),
        };

        OutcomeSummary {
            outcome,
            status: self.status_code(),
            body: self.body().map(String::from),
            assumed_reason,
            error,
            exit_code: self.exit_code(),
        }
    }
}

impl From<UploadError> for UploadOutcome {
    fn from(err: UploadError) -> Self {
        Self::Failure(err)
    }
}

/// Serializable view of an outcome
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeSummary {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assumed_reason: Option<AssumedReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub exit_code: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let ok = UploadOutcome::Success {
            status: 200,
            reason: "OK".into(),
            body: "Update OK".into(),
        };
        assert_eq!(ok.exit_code(), 0);

        for reason in [
            AssumedReason::PeerClosed,
            AssumedReason::ConnectionReset,
            AssumedReason::ResponseTimeout,
        ] {
            assert_eq!(UploadOutcome::SuccessAssumed(reason).exit_code(), 0);
        }

        let failed = UploadOutcome::Failure(UploadError::status(500, "Internal Server Error", ""));
        assert_eq!(failed.exit_code(), 1);

        let failed = UploadOutcome::from(UploadError::Connect("refused".into()));
        assert_eq!(failed.exit_code(), 1);
    }

    #[test]
    fn test_assumed_reason_messages() {
        assert_eq!(
            AssumedReason::PeerClosed.to_string(),
            "device closed connection, likely rebooting"
        );
        assert_eq!(
            AssumedReason::ConnectionReset.to_string(),
            "connection reset by device, likely rebooting"
        );
        assert_eq!(
            AssumedReason::ResponseTimeout.to_string(),
            "device did not respond in time, treating as success"
        );
    }

    #[test]
    fn test_summary_json() {
        let outcome = UploadOutcome::SuccessAssumed(AssumedReason::PeerClosed);
        let json = serde_json::to_value(outcome.summary()).unwrap();
        assert_eq!(json["outcome"], "success_assumed");
        assert_eq!(json["assumed_reason"], "peer_closed");
        assert_eq!(json["exit_code"], 0);
        assert!(json.get("status").is_none());

        let outcome = UploadOutcome::Failure(UploadError::status(500, "Internal Server Error", "Update failed"));
        let json = serde_json::to_value(outcome.summary()).unwrap();
        assert_eq!(json["outcome"], "failure");
        assert_eq!(json["status"], 500);
        assert_eq!(json["body"], "Update failed");
        assert_eq!(json["exit_code"], 1);
    }
}
