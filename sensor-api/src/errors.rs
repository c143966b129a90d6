use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Raw driver text is kept as the display so that API clients see the
    /// underlying failure verbatim.
    #[error("{0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    BadRequest(String),
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest(message.into())
    }

    /// Whether the failure was caused by the caller rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::BadRequest(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_is_client_error() {
        let err = Error::bad_request("Missing device name");
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Missing device name");
    }

    #[test]
    fn test_database_error_keeps_driver_text() {
        let err = Error::from(sqlx::Error::PoolTimedOut);
        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), sqlx::Error::PoolTimedOut.to_string());
    }
}
