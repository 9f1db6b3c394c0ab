use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelabelError>;

#[derive(Debug, Error)]
pub enum RelabelError {
    #[error("{}: not a LAS file ({})", .path.display(), .reason)]
    Format { path: PathBuf, reason: String },

    #[error("{}: point format {} has no usable `{}` field ({})", .path.display(), .format, .field, .reason)]
    UnsupportedPointFormat {
        path: PathBuf,
        format: u8,
        field: String,
        reason: String,
    },

    #[error("{}: truncated, header declares {} point records but only {} are present", .path.display(), .expected, .available)]
    Truncated {
        path: PathBuf,
        expected: u64,
        available: u64,
    },

    #[error("invalid label `{}`: {}", .value, .reason)]
    InvalidLabelFormat { value: String, reason: String },

    #[error("label {0} is not present in the available labels")]
    UnknownLabel(i32),

    #[error("{}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}, row {}: {}", .path.display(), .row, .message)]
    MappingSource {
        path: PathBuf,
        row: usize,
        message: String,
    },

    #[error("{}: {}", .path.display(), .source)]
    Las {
        path: PathBuf,
        #[source]
        source: las::Error,
    },

    #[error("{}: cannot encode point data ({})", .path.display(), .reason)]
    Encode { path: PathBuf, reason: String },

    #[error("{}: cancelled before processing started", .path.display())]
    Cancelled { path: PathBuf },
}

impl RelabelError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RelabelError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn las(path: impl Into<PathBuf>, source: las::Error) -> Self {
        RelabelError::Las {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_label(value: impl ToString, reason: impl Into<String>) -> Self {
        RelabelError::InvalidLabelFormat {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
