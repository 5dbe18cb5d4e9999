//! CLI error types.

use std::fmt;
use std::io;

use strata::ResourceError;

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration or argument error.
    Config(String),

    /// A `--mount` value was not of the form `name=uri`.
    InvalidMount(String),

    /// Resolving or accessing a resource failed.
    Resource(ResourceError),

    /// Writing command output failed.
    Output(io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::InvalidMount(value) => {
                write!(f, "Invalid mount '{}': expected NAME=URI", value)
            }
            CliError::Resource(e) => write!(f, "{}", e),
            CliError::Output(e) => write!(f, "Failed to write output: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Resource(e) => Some(e),
            CliError::Output(e) => Some(e),
            CliError::Config(_) | CliError::InvalidMount(_) => None,
        }
    }
}

impl From<ResourceError> for CliError {
    fn from(e: ResourceError) -> Self {
        CliError::Resource(e)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Output(e)
    }
}
