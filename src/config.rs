//! Validation of the paths a batch run depends on.
//!
//! Every check here runs before any generation; a failure aborts the run.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to find and/or create the provided output path: {} ({reason})", path.display())]
    OutputPath { path: PathBuf, reason: String },
    #[error("The provided path to the OSL compiler is not valid: {}", .0.display())]
    CompilerPath(PathBuf),
    #[error("The provided path to the OSL includes is not valid: {}", .0.display())]
    IncludePath(PathBuf),
}

/// Make sure `path` is a directory, creating it (and its parents) if needed.
pub fn prepare_output_path(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::OutputPath {
            path: path.to_path_buf(),
            reason: "no path given".to_string(),
        });
    }
    if !path.is_dir() {
        std::fs::create_dir_all(path).map_err(|e| ConfigError::OutputPath {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    }
    if !path.is_dir() {
        return Err(ConfigError::OutputPath {
            path: path.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    Ok(path.to_path_buf())
}

pub fn validate_compiler_path(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.as_os_str().is_empty() || !path.is_file() {
        return Err(ConfigError::CompilerPath(path.to_path_buf()));
    }
    Ok(path.to_path_buf())
}

pub fn validate_include_path(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.as_os_str().is_empty() || !path.is_dir() {
        return Err(ConfigError::IncludePath(path.to_path_buf()));
    }
    Ok(path.to_path_buf())
}
