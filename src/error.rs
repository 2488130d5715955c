use std::path::PathBuf;
use thiserror::Error;

/// Failures the launcher can report before the delegated program takes over.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("profile not found: {}", path.display())]
    ProfileNotFound { path: PathBuf },

    #[error("invalid profile {}", path.display())]
    ProfileParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("cannot add {path:?} to {var}: it contains the path separator")]
    InvalidSearchPath { var: String, path: String },

    #[error("working directory not found: {}", path.display())]
    WorkingDirNotFound { path: PathBuf },

    #[error("interpreter not found: {program}")]
    InterpreterNotFound { program: String },

    #[error("failed to execute {program}")]
    Exec {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
