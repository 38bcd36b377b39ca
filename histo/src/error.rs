use thiserror::Error;

/// The error type shared by every stage of the histogram pipeline
#[derive(Error, Debug)]
pub enum HistoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed input: {0}")]
    Format(String),

    #[error("Payload decode error: {0}")]
    Decode(String),

    #[error("Sample count overflow: {0}")]
    Overflow(String),

    #[error("Buffer pool invariant violated (this is a bug): {0}")]
    PoolInvariant(String),

    #[error("Bin index {index} is out of range for {bins} bins")]
    BinIndexOutOfRange { index: usize, bins: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker task panicked (this is a bug): {0}")]
    TaskPanic(String),

    #[error("Task cancelled after an earlier failure")]
    Cancelled,
}

impl HistoError {
    /// A short name of the failure class, used for the one line diagnostic
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "IoError",
            Self::Format(_) => "FormatError",
            Self::Decode(_) => "DecodeError",
            Self::Overflow(_) => "OverflowError",
            Self::PoolInvariant(_) => "PoolInvariantViolation",
            Self::BinIndexOutOfRange { .. } => "BinIndexOutOfRange",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::TaskPanic(_) => "TaskPanic",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Programming-error classes, these should never be recovered from
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            Self::PoolInvariant(_) | Self::BinIndexOutOfRange { .. } | Self::TaskPanic(_)
        )
    }

    pub(crate) fn format<S: Into<String>>(msg: S) -> Self {
        Self::Format(msg.into())
    }

    pub(crate) fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, HistoError>;
