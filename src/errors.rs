//! Failure taxonomy shared by stack assembly and the optics engine.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_names_layer_and_path() {
        let err = StackError::load_file("layer 'absorber'", Path::new("db/si.dat"), "no data rows");
        let msg = err.to_string();
        assert!(msg.contains("absorber"));
        assert!(msg.contains("db/si.dat"));
        assert!(msg.contains("no data rows"));
    }

    #[test]
    fn load_error_without_path() {
        let err = StackError::load("reflection reference", "empty file");
        assert_eq!(err.to_string(), "cannot load reflection reference: empty file");
    }
}

#[derive(Debug, Error)]
pub enum StackError {
    /// Missing, unreadable or malformed material/reference data, or data that
    /// does not cover the simulation wavelength range.
    #[error("cannot load {subject}{}: {reason}", location(.path))]
    Load {
        subject: String,
        path: Option<PathBuf>,
        reason: String,
    },

    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("numeric failure at {wavelength} nm: {reason}")]
    Numeric { wavelength: f64, reason: String },
}

fn location(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" from {}", path.display()),
        None => String::new(),
    }
}

impl StackError {
    pub fn load(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Load {
            subject: subject.into(),
            path: None,
            reason: reason.into(),
        }
    }

    pub fn load_file(subject: impl Into<String>, path: &Path, reason: impl Into<String>) -> Self {
        Self::Load {
            subject: subject.into(),
            path: Some(path.to_path_buf()),
            reason: reason.into(),
        }
    }

    pub fn write(path: &Path, source: std::io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
