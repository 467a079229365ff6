use std::error::Error;
use std::fmt::{self, Display};

/// Error type for experiment operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExperimentError {
    /// The submitted template or request was malformed
    Validation(String),
    /// An experiment is already active
    AlreadyRunning,
    /// The supplied identifier does not match a running experiment
    NotFound,
    /// A collaborator call failed
    Remote(String),
    /// The configuration is missing or malformed
    Config(String),
}

impl Display for ExperimentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentError::Validation(msg) => write!(f, "{}", msg),
            ExperimentError::AlreadyRunning => {
                write!(f, "Can run only one experiment at a time!")
            }
            ExperimentError::NotFound => write!(f, "Experiment not found!"),
            ExperimentError::Remote(msg) => write!(f, "{}", msg),
            ExperimentError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for ExperimentError {}
