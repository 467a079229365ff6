use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Lifecycle states of an experiment run.
///
/// A run moves Ready -> Initialize -> Execute -> Cleanup -> Done. Any
/// unhandled failure along the way lands in Error. Done and Error are
/// terminal; only a fresh load returns the controller to Ready.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentState {
    /// Idle, or a loaded experiment that has not started yet
    #[default]
    Ready,
    /// Measurement sessions and collaborators are being set up
    Initialize,
    /// The closed control loop is running
    Execute,
    /// Collaborators are being torn down
    Cleanup,
    /// The run finished successfully
    Done,
    /// The run failed
    Error,
}

impl ExperimentState {
    /// Terminal states can only be left through a fresh load.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExperimentState::Done | ExperimentState::Error)
    }
}

impl Display for ExperimentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentState::Ready => write!(f, "ready"),
            ExperimentState::Initialize => write!(f, "initialize"),
            ExperimentState::Execute => write!(f, "execute"),
            ExperimentState::Cleanup => write!(f, "cleanup"),
            ExperimentState::Done => write!(f, "done"),
            ExperimentState::Error => write!(f, "error"),
        }
    }
}
