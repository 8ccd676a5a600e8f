//! Configuration loading from and saving to disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::document::{DecodeError, Document, DocumentFormat, EncodeError};
use crate::config::schema::McpConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::config::watcher::WatchError;

/// Error type for configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No config path specified")]
    NoConfigPathSpecified,

    #[error("No config path specified for saving. Initialize ConfigManager with a path or provide it to save_config.")]
    NoSavePathSpecified,

    #[error("Invalid configuration object provided.")]
    InvalidConfigObject,

    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("Failed to serialize config for {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: EncodeError,
    },

    #[error("Failed to write config file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to watch config file: {0}")]
    Watch(#[from] WatchError),
}

/// Read and decode a configuration file without validating it.
pub fn read_document(path: &Path) -> Result<Document, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Document::parse(&content, DocumentFormat::from_path(path)).map_err(|source| ConfigError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate a configuration file.
pub fn load_config(path: &Path) -> Result<McpConfig, ConfigError> {
    let document = read_document(path)?;
    let config = validate_config(&document)?;
    Ok(config)
}

/// Serialize `document` in the format implied by `path` and write it
/// atomically.
///
/// Only the root shape is checked; the document is not validated.
pub fn save_document(document: &Document, path: &Path) -> Result<(), ConfigError> {
    if !document.value().is_object() {
        return Err(ConfigError::InvalidConfigObject);
    }
    let text = document
        .stringify(DocumentFormat::from_path(path))
        .map_err(|source| ConfigError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    atomic_write(path, text.as_bytes()).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Write to a sibling temp file, sync, then rename over the target so a
/// watcher never sees a half-written file.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}
