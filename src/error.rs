// Error types for the Exliar installer
//
// Every failure is fatal: the installer never retries, it reports the
// error with the step it happened in and exits.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::core::state::InstallStage;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, InstallError>;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Unsupported CPU vendor: only Intel and AMD processors are supported")]
    UnsupportedCpu,

    #[error("System is not booted in UEFI mode ({} is missing)", .0.display())]
    NotUefi(PathBuf),

    #[error("No GPU suitable for passthrough was found on this system")]
    NoPassthroughGpu,

    #[error("Could not find {0} in PATH")]
    ToolNotFound(String),

    #[error("{context}: `{command}` failed ({status})")]
    CommandFailed {
        context: &'static str,
        command: String,
        status: ExitStatus,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid disk {0}")]
    InvalidDisk(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration file {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot move from stage {from:?} to {to:?}")]
    Stage { from: InstallStage, to: InstallStage },

    #[error("Installation cancelled by the operator")]
    Cancelled,
}

impl InstallError {
    /// Wraps an I/O error with a description of what was being attempted
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        InstallError::Io {
            context: context.into(),
            source,
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Adds a context message to `io::Result`s
pub trait IoContext<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| InstallError::io(context, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_exits_with_one() {
        assert_eq!(InstallError::UnsupportedCpu.exit_code(), 1);
        assert_eq!(InstallError::Cancelled.exit_code(), 1);
        assert_eq!(
            InstallError::io("Writing /etc/hostname", io::Error::from(io::ErrorKind::NotFound))
                .exit_code(),
            1
        );
    }

    #[test]
    fn io_context_is_part_of_the_message() {
        let result: io::Result<()> = Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        let err = result.context("Writing /etc/hostname").unwrap_err();
        assert_eq!(err.to_string(), "Writing /etc/hostname: disk full");
    }
}
