//! Boundary toward the chat platform.

pub mod discord;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::GatewayError;
use crate::raid::MessageRef;
use crate::status::RaidStatus;

pub use discord::DiscordGateway;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub id: u64,
    pub display_name: String,
    pub roles: Vec<u64>,
}

/// A direct reply to a question sent with `Gateway::ask`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message: MessageRef,
    pub content: String,
}

/// Everything the raid engine needs from the platform.
///
/// Entities that no longer exist must be reported with the matching
/// `*NotFound` error so the engine can drop its references to them.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn channel(&self, channel_id: u64) -> GatewayResult<ChannelInfo>;

    /// Succeeds when the message still exists.
    async fn message(&self, message: MessageRef) -> GatewayResult<()>;

    async fn send_message(&self, channel_id: u64, content: &str) -> GatewayResult<MessageRef>;

    /// Replaces a status message with `header` as text and `status` as embed.
    async fn edit_status(
        &self,
        message: MessageRef,
        header: &str,
        status: &RaidStatus,
    ) -> GatewayResult<()>;

    async fn delete_message(&self, message: MessageRef) -> GatewayResult<()>;

    async fn pin_message(&self, message: MessageRef) -> GatewayResult<()>;

    async fn react(&self, message: MessageRef, emoji: &str) -> GatewayResult<()>;

    async fn rename_channel(&self, channel_id: u64, name: &str) -> GatewayResult<()>;

    /// Creates a sibling of `source` (same category and permissions) and
    /// returns its id.
    async fn clone_channel(&self, source_channel_id: u64, name: &str) -> GatewayResult<u64>;

    async fn delete_channel(&self, channel_id: u64) -> GatewayResult<()>;

    async fn member(&self, member_id: u64) -> GatewayResult<MemberInfo>;

    /// Sends `prompt` privately and waits up to `timeout` for one reply.
    /// `Ok(None)` means nobody answered in time.
    async fn ask(
        &self,
        member_id: u64,
        prompt: &str,
        timeout: Duration,
    ) -> GatewayResult<Option<Reply>>;
}
