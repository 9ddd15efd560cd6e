use thiserror::Error;

/// Errors surfaced by the points engine.
///
/// Domain kinds map one-to-one to caller-visible failures and are never
/// retried internally; `Storage`/`Ranking` wrap infrastructure failures.
#[derive(Error, Debug)]
pub enum PointsError {
    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("cannot delete point type with active balances")]
    PointTypeInUse,

    #[error("duplicate point type name")]
    DuplicatePointTypeName,

    #[error("point type not found")]
    PointTypeNotFound,

    #[error("point type already deleted")]
    PointTypeAlreadyDeleted,

    #[error("reward not found")]
    RewardNotFound,

    #[error("reward out of stock")]
    RewardOutOfStock,

    #[error("distribution already executed for period")]
    DistributionAlreadyDone,

    #[error("unauthorized operation")]
    UnauthorizedOperation,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("ranking store error: {0}")]
    Ranking(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PointsError {
    /// True when the wrapped storage error is a Postgres unique violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Storage(e) => {
                if let Some(db_error) = e.as_database_error() {
                    matches!(db_error.code().as_deref(), Some("23505"))
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PointsError>;
