use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionerError {
    #[error(transparent)]
    Solution(#[from] solution_model::SolutionError),

    #[error(transparent)]
    Settings(#[from] settings_store::SettingsError),

    #[error("failed to copy {} into the solution cache at {}", from.display(), to.display())]
    CacheCopy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot work out a default for {0}; HOME is not set")]
    NoHome(&'static str),

    #[error("no solution is open; pass a solution file or open one first")]
    NothingOpen,

    #[error("{0}")]
    OpenRejected(String),
}

impl ProvisionerError {
    pub fn cache_copy(from: impl Into<PathBuf>, to: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProvisionerError::CacheCopy {
            from: from.into(),
            to: to.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionerError>;
