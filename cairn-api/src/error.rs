#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Document not found {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid path {0:?}")]
    InvalidPath(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),
}

impl Error {
    /// Whether retrying the same operation later could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Unavailable(_) | Error::Unknown(_) => true,
            Error::PermissionDenied
            | Error::NotFound(_)
            | Error::InvalidPath(_)
            | Error::NullByteInString(_) => false,
        }
    }
}
