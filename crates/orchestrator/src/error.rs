use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum RunError {
    AlreadyRunning(String),
    RunInProgress,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::AlreadyRunning(node) => {
                write!(f, "Speedtest already running on node: {node}")
            }
            RunError::RunInProgress => write!(f, "A sequential run is already in progress"),
        }
    }
}

impl std::error::Error for RunError {}
