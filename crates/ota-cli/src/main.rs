//! OTA CLI - Upload firmware to a device's HTTP OTA endpoint
//!
//! Sends one multipart POST and exits 0 when the device accepted the image
//! (including when it rebooted before answering), 1 otherwise.

mod commands;
mod config;
mod output;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use ota_client::{FirmwareArtifact, Uploader};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{ArgOverrides, Config};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "ota-cli")]
#[command(author, version, about = "Upload firmware to an OTA-enabled device")]
struct Cli {
    /// Device address: host[:port], optionally prefixed with http:// or https://
    #[arg(env = "OTA_UPLOAD_PORT")]
    target: Option<String>,

    /// Firmware image to upload
    #[arg(short, long, conflicts_with = "build_dir")]
    firmware: Option<PathBuf>,

    /// Build output directory containing <program-name>.bin
    #[arg(long, requires = "program_name")]
    build_dir: Option<PathBuf>,

    /// Program name of the build output
    #[arg(long, requires = "build_dir")]
    program_name: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "OTA_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP Basic username expected by the device
    #[arg(long, env = "OTA_USERNAME")]
    username: Option<String>,

    /// HTTP Basic password expected by the device
    #[arg(long, env = "OTA_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Extra CA certificates (PEM) to trust for https targets
    #[arg(long)]
    ca_file: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("{} {:#}", "Error:".red(), err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    let firmware = firmware_arg(&cli);

    // Merge CLI args with config
    let merged = config.merge_with_args(ArgOverrides {
        target: cli.target.as_deref(),
        firmware,
        output: cli.output.map(Into::into),
        no_color: cli.no_color,
        username: cli.username.as_deref(),
        password: cli.password.as_deref(),
        ca_file: cli.ca_file.as_deref(),
    });

    let format = OutputFormat::from_name(&merged.output)
        .with_context(|| format!("Unknown output format in config: {}", merged.output))?;
    let ctx = OutputContext::new(format, merged.no_color, cli.quiet);

    let Some(target) = merged.target else {
        bail!("No upload target given (pass it as an argument or set OTA_UPLOAD_PORT)");
    };
    let Some(firmware) = merged.firmware else {
        bail!("No firmware given (use --firmware, or --build-dir with --program-name)");
    };

    debug!("Upload settings: {:?}", merged.upload);
    let uploader = Uploader::new(merged.upload).context("Failed to set up uploader")?;
    let outcome = commands::upload(&uploader, &firmware, &target, &ctx).await?;

    Ok(outcome.exit_code())
}

/// Firmware path from `--firmware` or `--build-dir`/`--program-name`
fn firmware_arg(cli: &Cli) -> Option<PathBuf> {
    match (&cli.firmware, &cli.build_dir, &cli.program_name) {
        (Some(path), _, _) => Some(path.clone()),
        (None, Some(dir), Some(name)) => Some(FirmwareArtifact::resolve_build_output(dir, name)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use ota_client::testing::{DeviceBehavior, MockDevice};
    use tempfile::TempDir;

    /// Args for a quiet upload of a small image, isolated from the user's config
    fn upload_cli(dir: &TempDir, target: &str, firmware: &str) -> Cli {
        let config = dir.path().join("config.toml");
        std::fs::write(&config, "[upload.timeouts]\nresponse_ms = 2000\n").unwrap();
        parse(&[
            target,
            "--firmware",
            firmware,
            "--config",
            config.to_str().unwrap(),
            "--quiet",
            "--no-color",
        ])
    }

    fn write_firmware(dir: &TempDir) -> String {
        let path = dir.path().join("app.bin");
        std::fs::write(&path, [0xE9, 0x03, 0x02, 0x20]).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ota-cli").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_firmware_flag() {
        let cli = parse(&["192.168.1.50", "--firmware", "app.bin"]);
        assert_eq!(cli.target.as_deref(), Some("192.168.1.50"));
        assert_eq!(firmware_arg(&cli), Some(PathBuf::from("app.bin")));
    }

    #[test]
    fn test_build_dir_resolves_program_bin() {
        let cli = parse(&[
            "device.local",
            "--build-dir",
            ".pio/build/esp32dev",
            "--program-name",
            "firmware",
        ]);
        assert_eq!(
            firmware_arg(&cli),
            Some(PathBuf::from(".pio/build/esp32dev/firmware.bin"))
        );
    }

    #[test]
    fn test_build_dir_requires_program_name() {
        let result = Cli::try_parse_from(["ota-cli", "device.local", "--build-dir", "out"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_firmware_conflicts_with_build_dir() {
        let result = Cli::try_parse_from([
            "ota-cli",
            "device.local",
            "--firmware",
            "app.bin",
            "--build-dir",
            "out",
            "--program-name",
            "app",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_output_format_flag() {
        let cli = parse(&["device.local", "-f", "app.bin", "--output", "json"]);
        assert_eq!(cli.output, Some(OutputFormat::Json));
    }

    #[tokio::test]
    async fn test_run_exits_zero_when_device_reboots() {
        let device = MockDevice::start(DeviceBehavior::CloseAfterBody)
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let firmware = write_firmware(&dir);

        let code = run(upload_cli(&dir, &device.target(), &firmware))
            .await
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(device.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_run_exits_zero_on_ok_response() {
        let device = MockDevice::start(DeviceBehavior::respond(200, "OK", "Update OK"))
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let firmware = write_firmware(&dir);

        let code = run(upload_cli(&dir, &device.target(), &firmware))
            .await
            .unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_run_exits_one_on_server_error() {
        let device = MockDevice::start(DeviceBehavior::respond(
            500,
            "Internal Server Error",
            "Update failed",
        ))
        .await
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let firmware = write_firmware(&dir);

        let code = run(upload_cli(&dir, &device.target(), &firmware))
            .await
            .unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn test_run_missing_firmware_is_error() {
        let device = MockDevice::start(DeviceBehavior::CloseAfterBody)
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.bin");

        let err = run(upload_cli(&dir, &device.target(), missing.to_str().unwrap()))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Firmware image not found"));
        assert!(device.requests().is_empty());
    }

    #[tokio::test]
    async fn test_run_blank_target_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let firmware = write_firmware(&dir);

        let err = run(upload_cli(&dir, "  ", &firmware)).await.unwrap_err();
        assert!(err.to_string().contains("No upload target"));
    }
}
