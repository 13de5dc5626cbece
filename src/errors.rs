use thiserror::Error;

#[derive(Error, Debug)]
pub enum FanControlError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("fan speed {0} out of range (0–100), clamped")]
    SpeedOutOfRange(f32),

    #[error("fan #{0} not found")]
    FanNotFound(usize),

    #[error("register 0x{0:02X} out of range for a word access")]
    RegisterOutOfRange(u8),

    #[error("value {value} does not fit register 0x{register:02X}")]
    ValueOutOfRange { register: u8, value: i32 },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("platform error: {0}")]
    Platform(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FanControlError {
    /// Whether the operation still took effect despite this error.
    pub fn is_warning(&self) -> bool {
        matches!(self, FanControlError::SpeedOutOfRange(_))
    }
}
