use anyhow::Context as _;
use serenity::Client;
use serenity::all::GatewayIntents;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod display;
mod handler;
mod tracker;

use crate::config::ConfigStore;
use crate::display::DisplayCache;
use crate::handler::Handler;
use crate::tracker::Tracker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let token = std::env::var("DISCORD_TOKEN")
        .context("DISCORD_TOKEN must be set in the environment or .env")?;
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "guild_config.json".to_string());
    let store = ConfigStore::load(&config_path).context("failed to load guild configuration")?;

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let mut client = Client::builder(&token, intents)
        .event_handler(Handler::default())
        .type_map_insert::<Tracker>(Arc::new(Tracker::new()))
        .type_map_insert::<DisplayCache>(Arc::new(DisplayCache::new()))
        .type_map_insert::<ConfigStore>(Arc::new(store))
        .await
        .context("failed to build Discord client")?;

    tracing::info!("starting voice join-order bot");
    client.start().await.map_err(Into::into)
}
