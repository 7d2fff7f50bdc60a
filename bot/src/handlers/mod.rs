use once_cell::sync::OnceCell;
use serenity::all::{ChannelId, Context, EventHandler, GuildChannel, GuildId, Message, MessageId, Ready};
use serenity::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::{RaidContext, RaidEngine};
use crate::gateway::DiscordGateway;
use crate::raid::MessageRef;
use crate::registry::Registry;
use crate::scheduler::Scheduler;
use crate::ui::Decorations;
use crate::venues::Venues;

/// Wires the engine once the gateway connection is up and forwards deletions
/// made outside the bot.
pub struct Handler {
    config: Config,
    registry: Arc<Registry>,
    venues: Arc<dyn Venues>,
    engine: OnceCell<Arc<RaidEngine>>,
}

impl Handler {
    pub fn new(config: Config, registry: Arc<Registry>, venues: Arc<dyn Venues>) -> Self {
        Self {
            config,
            registry,
            venues,
            engine: OnceCell::new(),
        }
    }

    pub fn engine(&self) -> Option<&Arc<RaidEngine>> {
        self.engine.get()
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, "connected");

        // reconnects fire ready again
        if self.engine.get().is_some() {
            return;
        }

        let guild_id = GuildId::new(self.config.guild_id);
        let decorations = Decorations::fetch(&ctx.http, guild_id).await;
        let gateway = Arc::new(DiscordGateway::new(ctx, guild_id, decorations));
        let engine = RaidEngine::new(RaidContext {
            registry: Arc::clone(&self.registry),
            gateway,
            venues: Arc::clone(&self.venues),
            timings: self.config.timings.clone(),
        });

        if self.engine.set(Arc::clone(&engine)).is_err() {
            return;
        }
        Scheduler::new(engine).spawn();
        tracing::info!(raids = self.registry.len(), "raid scheduler started");
    }

    async fn channel_delete(&self, _ctx: Context, channel: GuildChannel, _messages: Option<Vec<Message>>) {
        if let Some(engine) = self.engine() {
            engine.forget_channel(channel.id.get()).await;
        }
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        if let Some(engine) = self.engine() {
            engine
                .forget_message(MessageRef::new(channel_id.get(), deleted_message_id.get()))
                .await;
        }
    }
}
