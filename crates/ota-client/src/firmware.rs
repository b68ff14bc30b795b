//! Firmware image loading

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

/// Extension of the flashable image produced by the firmware build
const IMAGE_EXTENSION: &str = "bin";

/// A firmware image read from disk
///
/// The bytes are read once and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareArtifact {
    file_name: String,
    bytes: Vec<u8>,
}

impl FirmwareArtifact {
    /// Create an artifact from bytes already in memory
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read a firmware image from `path`
    ///
    /// Fails if the path does not exist, is not a regular file, or cannot be read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.is_file() {
            return Err(ConfigError::FirmwareNotFound(path.to_path_buf()));
        }

        let bytes = std::fs::read(path).map_err(|source| ConfigError::FirmwareUnreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("firmware.{}", IMAGE_EXTENSION));

        debug!("Loaded {} ({} bytes)", path.display(), bytes.len());

        Ok(Self { file_name, bytes })
    }

    /// Path of the image a PlatformIO-style build leaves in `build_dir`
    ///
    /// `build_dir/program_name.bin`
    pub fn resolve_build_output(build_dir: impl AsRef<Path>, program_name: &str) -> PathBuf {
        build_dir
            .as_ref()
            .join(format!("{}.{}", program_name, IMAGE_EXTENSION))
    }

    /// File name sent in the multipart part header
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Raw image bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Image size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the image is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_reads_bytes_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&[0x00, 0x01, 0x02])
            .unwrap();

        let artifact = FirmwareArtifact::load(&path).unwrap();
        assert_eq!(artifact.file_name(), "app.bin");
        assert_eq!(artifact.bytes(), &[0x00, 0x01, 0x02]);
        assert_eq!(artifact.len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");

        let err = FirmwareArtifact::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::FirmwareNotFound(p) if p == path));
    }

    #[test]
    fn test_load_directory_is_not_firmware() {
        let dir = tempfile::tempdir().unwrap();

        let err = FirmwareArtifact::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::FirmwareNotFound(_)));
    }

    #[test]
    fn test_resolve_build_output() {
        let path = FirmwareArtifact::resolve_build_output(".pio/build/esp32dev", "firmware");
        assert_eq!(path, PathBuf::from(".pio/build/esp32dev/firmware.bin"));
    }
}
