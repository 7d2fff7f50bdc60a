use dotenvy::dotenv;
use raid_bot::config::Config;
use raid_bot::handlers::Handler;
use raid_bot::registry::Registry;
use raid_bot::store;
use raid_bot::venues::VenueTable;
use serenity::all::{Client, GatewayIntents};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let store = store::connect(&config.store).await?;
    let registry = Arc::new(Registry::load(store).await?);

    let venues = match VenueTable::load(&config.venues_path) {
        Ok(table) => table,
        Err(e) => {
            tracing::warn!(path = %config.venues_path.display(), error = %e, "no venues loaded");
            VenueTable::new([])
        }
    };

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    let handler = Handler::new(config.clone(), registry, Arc::new(venues));

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await?;

    client.start().await?;
    Ok(())
}
