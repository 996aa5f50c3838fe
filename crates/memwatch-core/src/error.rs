use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Null pointer in chain at level {level} (read from {address:#x})")]
    NullPointerInChain { level: usize, address: u64 },

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    UnreadableMemory { address: u64, message: String },

    #[error("Target process is gone")]
    ProcessGone,

    #[error("Read truncated: requested {requested} bytes, got {read}")]
    Truncated { requested: usize, read: usize },

    #[error("Read of {requested} bytes exceeds the {max} byte limit")]
    ReadTooLarge { requested: usize, max: usize },

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Failed to open process: {0}")]
    ProcessOpenFailed(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Config parse error: {0}")]
    ConfigParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn unreadable(address: u64, message: impl Into<String>) -> Self {
        Error::UnreadableMemory {
            address,
            message: message.into(),
        }
    }

    /// Whether the failure means the target has to be reattached.
    ///
    /// Everything else is routine for a volatile target and should simply be
    /// retried on the next poll.
    pub fn is_process_gone(&self) -> bool {
        matches!(self, Error::ProcessGone)
    }
}
