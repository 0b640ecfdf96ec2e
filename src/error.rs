use thiserror::Error;

/// Error types for the vox-keys crate
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("Store access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("Not an identity: {0}")]
    NotAnIdentity(String),

    #[error("Wrong password")]
    WrongPassword,

    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    #[error("Generation failure: {0}")]
    GenerationFailure(String),

    #[error("Export failure: {0}")]
    ExportFailure(String),

    #[error("Store insertion failure: {0}")]
    StoreInsertionFailure(String),

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<bincode::Error> for KeyError {
    fn from(err: bincode::Error) -> Self {
        KeyError::SerializationError(err.to_string())
    }
}

/// Result type for vox-keys operations
pub type Result<T> = std::result::Result<T, KeyError>;
