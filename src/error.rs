use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum RolloutError {
    ConfigurationError(String),
    AnalysisError(String),
    ResourceError(String),
    ExecutionError(String),
    RecoveryError(String),
    MonitoringError(String),
    EventError(String),
}

impl fmt::Display for RolloutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RolloutError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            RolloutError::AnalysisError(msg) => write!(f, "Dependency analysis error: {msg}"),
            RolloutError::ResourceError(msg) => write!(f, "Resource error: {msg}"),
            RolloutError::ExecutionError(msg) => write!(f, "Execution error: {msg}"),
            RolloutError::RecoveryError(msg) => write!(f, "Recovery error: {msg}"),
            RolloutError::MonitoringError(msg) => write!(f, "Monitoring error: {msg}"),
            RolloutError::EventError(msg) => write!(f, "Event error: {msg}"),
        }
    }
}

impl std::error::Error for RolloutError {}

pub type Result<T> = std::result::Result<T, RolloutError>;
