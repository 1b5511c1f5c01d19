use thiserror::Error;

/// Why a temperature reading is unavailable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorFault {
    #[error("sensor disconnected")]
    Disconnected,
    #[error("reading out of range: {0:.1}")]
    OutOfRange(f64),
    #[error("sensor read timed out")]
    Timeout,
    #[error("no fresh sample")]
    Stale,
    #[error("sensor i/o error: {0}")]
    Io(String),
}

/// Structural problems that make a profile unusable for a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("profile name is empty")]
    EmptyName,
    #[error("profile has no phases")]
    EmptyPhases,
    #[error("phase {index} has non-positive duration {duration_s}")]
    NonPositiveDuration { index: usize, duration_s: f64 },
    #[error("phase {index} has a non-finite value")]
    NonFiniteValue { index: usize },
    #[error("start temperature {0} is not finite")]
    NonFiniteStart(f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("profile not found: {0}")]
    NotFound(String),
    #[error("cannot parse profile: {0}")]
    Parse(String),
    #[error("storage i/o error: {0}")]
    Io(String),
    #[error("refusing to save invalid profile: {0}")]
    Invalid(ProfileError),
    #[error("profile '{name}' would overwrite '{existing}'")]
    NameCollision { name: String, existing: String },
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Rejection of a control command. The oven state is untouched whenever
/// one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("invalid profile: {0}")]
    InvalidProfile(ProfileError),
    #[error("cannot start: {0}")]
    CannotStart(String),
    #[error("target {value:.1} outside {min:.1}..={max:.1}")]
    TargetOutOfRange { value: f64, min: f64, max: f64 },
    #[error("profile not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl CommandError {
    /// Stable reason code handed back to remote clients.
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::InvalidProfile(_) => "invalid_profile",
            CommandError::CannotStart(_) => "cannot_start",
            CommandError::TargetOutOfRange { .. } => "target_out_of_range",
            CommandError::NotFound(_) => "not_found",
            CommandError::Storage(_) => "storage_error",
        }
    }
}

impl From<StoreError> for CommandError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(name) => CommandError::NotFound(name),
            StoreError::Invalid(err) => CommandError::InvalidProfile(err),
            other => CommandError::Storage(other.to_string()),
        }
    }
}
