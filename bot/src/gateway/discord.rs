use async_trait::async_trait;
use serenity::all::{
    ChannelId, ChannelType, Context, CreateChannel, CreateMessage, EditChannel, EditMessage,
    GuildId, MessageId, ReactionType, UserId,
};
use std::time::Duration;

use super::{ChannelInfo, Gateway, GatewayResult, MemberInfo, Reply};
use crate::error::GatewayError;
use crate::raid::MessageRef;
use crate::status::RaidStatus;
use crate::ui::{render_status, Decorations};

/// `Gateway` on top of a connected serenity client.
pub struct DiscordGateway {
    ctx: Context,
    guild_id: GuildId,
    decorations: Decorations,
}

impl DiscordGateway {
    pub fn new(ctx: Context, guild_id: GuildId, decorations: Decorations) -> Self {
        Self {
            ctx,
            guild_id,
            decorations,
        }
    }
}

/// 404 means the entity is gone; anything else is a platform fault.
fn classify(err: serenity::Error, not_found: GatewayError) -> GatewayError {
    if let serenity::Error::Http(http) = &err {
        if http.status_code().map(|s| s.as_u16()) == Some(404) {
            return not_found;
        }
    }
    GatewayError::Platform(err.to_string())
}

fn channel_err(channel_id: u64) -> impl FnOnce(serenity::Error) -> GatewayError {
    move |e| classify(e, GatewayError::ChannelNotFound(channel_id))
}

fn message_err(message: MessageRef) -> impl FnOnce(serenity::Error) -> GatewayError {
    move |e| classify(e, GatewayError::MessageNotFound(message))
}

fn ids(message: MessageRef) -> (ChannelId, MessageId) {
    (
        ChannelId::new(message.channel_id),
        MessageId::new(message.message_id),
    )
}

#[async_trait]
impl Gateway for DiscordGateway {
    async fn channel(&self, channel_id: u64) -> GatewayResult<ChannelInfo> {
        let channel = ChannelId::new(channel_id)
            .to_channel(&self.ctx)
            .await
            .map_err(channel_err(channel_id))?;
        let name = channel.guild().map(|c| c.name).unwrap_or_default();
        Ok(ChannelInfo {
            id: channel_id,
            name,
        })
    }

    async fn message(&self, message: MessageRef) -> GatewayResult<()> {
        let (channel, id) = ids(message);
        channel
            .message(&self.ctx, id)
            .await
            .map_err(message_err(message))?;
        Ok(())
    }

    async fn send_message(&self, channel_id: u64, content: &str) -> GatewayResult<MessageRef> {
        let sent = ChannelId::new(channel_id)
            .send_message(&self.ctx, CreateMessage::new().content(content))
            .await
            .map_err(channel_err(channel_id))?;
        Ok(MessageRef::new(channel_id, sent.id.get()))
    }

    async fn edit_status(
        &self,
        message: MessageRef,
        header: &str,
        status: &RaidStatus,
    ) -> GatewayResult<()> {
        let (channel, id) = ids(message);
        let edit = EditMessage::new()
            .content(header)
            .embed(render_status(status, &self.decorations));
        channel
            .edit_message(&self.ctx, id, edit)
            .await
            .map_err(message_err(message))?;
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> GatewayResult<()> {
        let (channel, id) = ids(message);
        channel
            .delete_message(&self.ctx, id)
            .await
            .map_err(message_err(message))
    }

    async fn pin_message(&self, message: MessageRef) -> GatewayResult<()> {
        let (channel, id) = ids(message);
        channel.pin(&self.ctx, id).await.map_err(message_err(message))
    }

    async fn react(&self, message: MessageRef, emoji: &str) -> GatewayResult<()> {
        let (channel, id) = ids(message);
        channel
            .create_reaction(&self.ctx, id, ReactionType::Unicode(emoji.to_string()))
            .await
            .map_err(message_err(message))
    }

    async fn rename_channel(&self, channel_id: u64, name: &str) -> GatewayResult<()> {
        ChannelId::new(channel_id)
            .edit(&self.ctx, EditChannel::new().name(name))
            .await
            .map_err(channel_err(channel_id))?;
        Ok(())
    }

    async fn clone_channel(&self, source_channel_id: u64, name: &str) -> GatewayResult<u64> {
        let source = ChannelId::new(source_channel_id)
            .to_channel(&self.ctx)
            .await
            .map_err(channel_err(source_channel_id))?
            .guild()
            .ok_or(GatewayError::ChannelNotFound(source_channel_id))?;

        let mut builder = CreateChannel::new(name)
            .kind(ChannelType::Text)
            .permissions(source.permission_overwrites.clone());
        if let Some(parent) = source.parent_id {
            builder = builder.category(parent);
        }
        if let Some(topic) = source.topic.clone() {
            builder = builder.topic(topic);
        }

        let created = self
            .guild_id
            .create_channel(&self.ctx, builder)
            .await
            .map_err(|e| GatewayError::Platform(e.to_string()))?;
        Ok(created.id.get())
    }

    async fn delete_channel(&self, channel_id: u64) -> GatewayResult<()> {
        ChannelId::new(channel_id)
            .delete(&self.ctx)
            .await
            .map_err(channel_err(channel_id))?;
        Ok(())
    }

    async fn member(&self, member_id: u64) -> GatewayResult<MemberInfo> {
        let member = self
            .guild_id
            .member(&self.ctx, UserId::new(member_id))
            .await
            .map_err(|e| classify(e, GatewayError::MemberNotFound(member_id)))?;
        Ok(MemberInfo {
            id: member_id,
            display_name: member.display_name().to_string(),
            roles: member.roles.iter().map(|r| r.get()).collect(),
        })
    }

    async fn ask(
        &self,
        member_id: u64,
        prompt: &str,
        timeout: Duration,
    ) -> GatewayResult<Option<Reply>> {
        let user = UserId::new(member_id);
        let dm = user
            .create_dm_channel(&self.ctx)
            .await
            .map_err(|e| classify(e, GatewayError::MemberNotFound(member_id)))?;
        dm.id
            .send_message(&self.ctx, CreateMessage::new().content(prompt))
            .await
            .map_err(|e| GatewayError::Platform(e.to_string()))?;

        let reply = dm
            .id
            .await_reply(&self.ctx)
            .author_id(user)
            .timeout(timeout)
            .await;

        Ok(reply.map(|m| Reply {
            message: MessageRef::new(m.channel_id.get(), m.id.get()),
            content: m.content,
        }))
    }
}
