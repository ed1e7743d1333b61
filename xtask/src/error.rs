use std::{io, path::PathBuf, process::ExitStatus};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to spawn `{program}`: {source}")]
    ToolchainUnavailable {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed compiler message on line {line}: {reason}")]
    MalformedEvent { line: usize, reason: String },

    #[error("artifact for target `{target}` has no executable")]
    MissingExecutablePath { target: String },

    #[error("build failed ({status})")]
    BuildFailed { status: String },

    #[error("build succeeded but no executable was produced for target `{target}`")]
    ArtifactNotFound { target: String },

    #[error("`{program}` failed: {cause}")]
    ConversionFailed {
        program: String,
        cause: ConversionCause,
    },

    #[error("compiler output ended without a build-finished message ({status})")]
    StreamEnded { status: String },

    #[error("build cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConversionCause {
    #[error("could not be spawned: {0}")]
    Spawn(#[source] io::Error),
    #[error("exited with {0}")]
    Status(ExitStatus),
    #[error("output {} was not written", .0.display())]
    MissingOutput(PathBuf),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Process exit code the `xtask` binary reports for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::BuildFailed { .. } => 1,
            PipelineError::ConversionFailed {
                cause: ConversionCause::Status(status),
                ..
            } => match status.code() {
                Some(0) | None => 1,
                Some(code) => code,
            },
            PipelineError::Cancelled => 130,
            _ => 2,
        }
    }
}
