use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing token or challenge response")]
    MissingFields,

    #[error("challenge was not accepted")]
    ChallengeFailed,

    /// The token expired or was already used.
    #[error("verification link expired or unknown")]
    UnknownToken,

    #[error("siteverify request failed: {0}")]
    Siteverify(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] topicbridge_store::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
