/// Error taxonomy shared by every module
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad user input: pattern, range, domain or URL format
    #[error("{0}")]
    Validation(String),

    /// Duplicate name, domain or redirect source
    #[error("{0}")]
    Uniqueness(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The key-value store rejected a read or write
    #[error("storage error: {0}")]
    Storage(String),

    /// A host API (tabs, storage, declarativeNetRequest) is missing
    #[error("{0} is not available outside the extension host")]
    CollaboratorUnavailable(&'static str),

    /// A host API is present but the call failed
    #[error("host error: {0}")]
    Host(String),

    /// Another mutating operation is still running on this session
    #[error("another operation is already in progress")]
    Busy,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
