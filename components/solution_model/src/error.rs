// components/solution_model/src/error.rs
use crate::validation::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolutionError {
    #[error("failed to read solution file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write solution file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("solution file {path} is not valid JSON")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} does not have the solution file type")]
    WrongFileType { path: PathBuf },

    #[error("solution cannot be deployed: {0}")]
    Validation(#[from] ValidationError),
}

impl SolutionError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SolutionError::Read {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SolutionError::Write {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        SolutionError::Json {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SolutionError>;
