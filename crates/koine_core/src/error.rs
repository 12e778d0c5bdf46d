use thiserror::Error;

#[derive(Debug, Error)]
pub enum KoineError {
    #[error("configuration error: {message}")]
    Configuration { message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("invariant violation: {message}")]
    Invariant { message: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl KoineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

pub type KoineResult<T> = Result<T, KoineError>;

impl From<sea_orm::DbErr> for KoineError {
    fn from(value: sea_orm::DbErr) -> Self {
        KoineError::storage(value.to_string())
    }
}
