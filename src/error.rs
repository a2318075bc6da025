/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether retrying the same call could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Database(_) | AppError::Cache(_) | AppError::ExternalApi(_) => true,
            AppError::HttpClient(e) => e.is_timeout() || e.is_connect(),
            AppError::Migration(_) | AppError::InvalidConfig(_) | AppError::Internal(_) => false,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_api_error_is_transient() {
        let err = AppError::ExternalApi("503".to_string());
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "External API error: 503");
    }

    #[test]
    fn test_config_error_is_not_transient() {
        let err = AppError::InvalidConfig("bad".to_string());
        assert!(!err.is_transient());
    }
}
