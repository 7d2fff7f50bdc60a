//! Error types for the raid engine.

use thiserror::Error;

/// Failures of the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures reported by the chat platform.
///
/// The `*NotFound` variants mean the referenced entity is gone for good and
/// are the trigger for self-healing the raid record that points at it.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("channel {0} does not exist")]
    ChannelNotFound(u64),

    #[error("message {0} does not exist")]
    MessageNotFound(crate::raid::MessageRef),

    #[error("member {0} is not in the guild")]
    MemberNotFound(u64),

    #[error("platform error: {0}")]
    Platform(String),
}

/// Errors returned by raid mutations.
#[derive(Debug, Error)]
pub enum RaidError {
    #[error("you are already signed up for this raid")]
    AlreadyJoined,

    #[error("you are not signed up for this raid")]
    NotJoined,

    #[error("no raid is bound to channel {0}")]
    RaidNotFound(u64),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl RaidError {
    /// Caller mistakes, as opposed to system faults.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RaidError::AlreadyJoined | RaidError::NotJoined | RaidError::RaidNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RaidError>;
