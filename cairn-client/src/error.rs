use crate::api;

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Invalid text: {0}")]
    Validation(String),

    #[error("Not signed in")]
    Unauthenticated,

    #[error("Remote write failed")]
    RemoteWriteFailed(#[source] api::Error),

    #[error("Live query failed")]
    Subscription(#[source] api::Error),
}

impl Error {
    /// Logs a failed store write and wraps it for the caller
    pub(crate) fn remote_write(what: &str, err: api::Error) -> Error {
        tracing::error!(?err, transient = err.is_transient(), "{what} failed");
        Error::RemoteWriteFailed(err)
    }

    /// Whether submitting the same action again later could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::RemoteWriteFailed(e) | Error::Subscription(e) => e.is_transient(),
            Error::Validation(_) | Error::Unauthenticated => false,
        }
    }
}
