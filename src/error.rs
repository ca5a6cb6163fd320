use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("slug `{0}` is already defined for this learner")]
    DuplicateSlug(String),
    #[error("invalid slug `{0}`: use lowercase letters, digits and `_`, starting with a letter")]
    InvalidSlug(String),
    #[error("default field `{0}` cannot be deleted, only deactivated")]
    ProtectedDefault(String),
    #[error("no task definition with slug `{0}`")]
    UnknownSlug(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("no task definition with slug `{0}`")]
    UnknownSlug(String),
    #[error("unknown weekday `{0}`")]
    UnknownWeekday(String),
    #[error("task `{slug}` requires an integer value, got `{value}`")]
    NotAnInteger { slug: String, value: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("tier thresholds must satisfy 0 < needs_work_max < good_max <= 1 (got {needs_work_max}, {good_max})")]
    ThresholdOrder { needs_work_max: f64, good_max: f64 },
    #[error("unknown scope `{0}`, expected `progress` or `final`")]
    UnknownScope(String),
    #[error("unknown tier `{0}`, expected `excellent`, `good` or `needsWork`")]
    UnknownTier(String),
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("stored value could not be decoded: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no learner with email `{0}`")]
    LearnerNotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    /// Pool exhaustion and shutdown are reported as the store being unavailable.
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
