/// Result alias that carries the custom [`PulseError`] type.
pub type Result<T> = std::result::Result<T, PulseError>;

/// Common error type for the core crate.
///
/// Nothing on the per-frame path returns one of these; malformed frames and
/// implausible beats are absorbed by the stages themselves. Errors only come
/// from the surfaces around the pipeline: configuration, I/O, FFT planning and
/// shared-state locking.
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    /// Free-form message, mostly used for poisoned locks.
    #[error("{0}")]
    Message(String),
    /// Input rejected by a public entry point.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON configuration or RR input.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// The FFT backend rejected a buffer.
    #[error("{0}")]
    Fft(#[from] realfft::FftError),
}

impl PulseError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<&str> for PulseError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PulseError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
