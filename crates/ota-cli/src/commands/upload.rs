//! Upload command - send a firmware image to a device

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ota_client::{UploadOutcome, UploadPhase, Uploader};
use std::path::Path;
use std::time::Duration;

use crate::output::{OutputContext, OutputFormat};

/// Upload `firmware` to `target` and report the outcome
///
/// Input problems are returned as errors; anything that happens once the
/// connection is attempted is part of the returned outcome.
pub async fn upload(
    uploader: &Uploader,
    firmware: &Path,
    target: &str,
    ctx: &OutputContext,
) -> Result<UploadOutcome> {
    let prepared = uploader
        .prepare(firmware, target)
        .context("Cannot start upload")?;

    ctx.info(&format!(
        "Uploading {} ({} bytes) to {}",
        prepared.file_name, prepared.firmware_len, prepared.target
    ));

    let pb = if ctx.is_chatty() {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("Invalid progress template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let authority = prepared.target.authority().to_string();
    let progress_callback = |phase: UploadPhase| match phase {
        UploadPhase::Connecting => pb.set_message(format!("Connecting to {}...", authority)),
        UploadPhase::Sending { bytes } => pb.set_message(format!("Sending {} bytes...", bytes)),
        UploadPhase::AwaitingResponse => {
            pb.suspend(|| ctx.info("Upload sent, waiting for device response..."));
            pb.set_message("Waiting for device...");
        }
    };

    let outcome = uploader.run(prepared, Some(progress_callback)).await;
    pb.finish_and_clear();

    report(&outcome, ctx);
    Ok(outcome)
}

fn report(outcome: &UploadOutcome, ctx: &OutputContext) {
    if ctx.format == OutputFormat::Json {
        ctx.print_json(&outcome.summary());
    }

    let line = status_line(outcome);
    match outcome {
        UploadOutcome::Success { body, .. } => {
            ctx.success(&line);
            if !body.is_empty() {
                ctx.info(body);
            }
        }
        UploadOutcome::SuccessAssumed(_) => ctx.success(&line),
        UploadOutcome::Failure(err) => {
            ctx.error(&line);
            if let Some(body) = outcome.body().filter(|b| !b.is_empty()) {
                eprintln!("{}", body);
            }
            if let Some(hint) = err.status_code().and_then(status_hint) {
                ctx.warn(hint);
            }
        }
    }
}

/// Final one-line summary of an outcome
fn status_line(outcome: &UploadOutcome) -> String {
    match outcome {
        UploadOutcome::Success { status, reason, .. } => {
            format!("Device responded: {} {}", status, reason)
        }
        UploadOutcome::SuccessAssumed(reason) => format!("Upload complete: {}", reason),
        UploadOutcome::Failure(err) => format!("Upload failed: {}", err),
    }
}

/// Extra guidance for statuses with a well-known cause
fn status_hint(status: u16) -> Option<&'static str> {
    match status {
        401 => Some(
            "Hint: the device rejected the credentials. Check --username/--password \
             or [upload.credentials] in the config file.",
        ),
        404 => Some(
            "Hint: the device has no OTA endpoint at this path. Make sure the running \
             firmware has OTA enabled, or set `endpoint` under [upload].",
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ota_client::{AssumedReason, UploadError};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_line_success() {
        let outcome = UploadOutcome::Success {
            status: 200,
            reason: "OK".into(),
            body: "Update OK".into(),
        };
        assert_eq!(status_line(&outcome), "Device responded: 200 OK");
    }

    #[test]
    fn test_status_line_assumed_success() {
        let outcome = UploadOutcome::SuccessAssumed(AssumedReason::PeerClosed);
        assert_eq!(
            status_line(&outcome),
            "Upload complete: device closed connection, likely rebooting"
        );

        let outcome = UploadOutcome::SuccessAssumed(AssumedReason::ResponseTimeout);
        assert_eq!(
            status_line(&outcome),
            "Upload complete: device did not respond in time, treating as success"
        );
    }

    #[test]
    fn test_status_line_failure() {
        let outcome = UploadOutcome::Failure(UploadError::status(
            500,
            "Internal Server Error",
            "Update failed",
        ));
        assert_eq!(
            status_line(&outcome),
            "Upload failed: Device returned 500 Internal Server Error"
        );

        let outcome = UploadOutcome::Failure(UploadError::Timeout {
            phase: "connect and send",
        });
        assert!(status_line(&outcome).starts_with("Upload failed: "));
    }

    #[test]
    fn test_status_hints() {
        assert!(status_hint(401).unwrap().contains("credentials"));
        assert!(status_hint(404).unwrap().contains("endpoint"));
        assert!(status_hint(500).is_none());
        assert!(status_hint(200).is_none());
    }
}
