use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid secret name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("invalid expiry timestamp `{value}`: {reason}")]
    InvalidExpiry { value: String, reason: String },
    #[error("secret `{name}` already exists")]
    AlreadyExists { name: String },
    #[error("secret `{name}` not found")]
    NotFound { name: String },
    #[error("concurrent update conflict on secret `{name}`")]
    Conflict { name: String },
    #[error("signature validation failed for secret `{name}`")]
    SignatureInvalid { name: String },
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        Error::NotFound { name: name.into() }
    }

    pub(crate) fn already_exists(name: impl Into<String>) -> Self {
        Error::AlreadyExists { name: name.into() }
    }

    pub(crate) fn conflict(name: impl Into<String>) -> Self {
        Error::Conflict { name: name.into() }
    }

    pub(crate) fn storage(err: impl ToString) -> Self {
        Error::Storage(err.to_string())
    }
}
