use serenity::all::{
    CommandDataOptionValue, CommandInteraction, CommandOptionType, CreateCommand,
    CreateCommandOption, CreateInteractionResponse, CreateInteractionResponseMessage, Mentionable,
};
use serenity::prelude::*;

use crate::config::{ConfigStore, GuildConfig};
use crate::handler::{reconcile_guild, shared};

pub fn register() -> CreateCommand {
    CreateCommand::new("setchannels")
        .description("Set voice, text, and log channels for this server")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Channel, "voice", "Voice channel to track")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Channel,
                "text",
                "Text channel for join order display",
            )
            .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Channel, "log", "Text channel for join logs")
                .required(true),
        )
}

pub async fn handle_setchannels(ctx: &Context, cmd: &CommandInteraction) {
    let Some(guild_id) = cmd.guild_id else {
        respond(ctx, cmd, "This command only works in a server.").await;
        return;
    };

    let channel_option = |name: &str| {
        cmd.data
            .options
            .iter()
            .find(|option| option.name == name)
            .and_then(|option| match &option.value {
                CommandDataOptionValue::Channel(channel_id) => Some(*channel_id),
                _ => None,
            })
    };

    let (Some(voice), Some(text), Some(log)) = (
        channel_option("voice"),
        channel_option("text"),
        channel_option("log"),
    ) else {
        respond(ctx, cmd, "All three channel options are required.").await;
        return;
    };

    let config = GuildConfig {
        voice_channel_id: voice,
        text_channel_id: text,
        log_channel_id: log,
    };

    let store = shared::<ConfigStore>(ctx).await;
    if let Err(err) = store.set(guild_id, config).await {
        tracing::error!(%guild_id, "failed to persist channel config: {err:#}");
        respond(ctx, cmd, "❌ Failed to save channels").await;
        return;
    }

    respond(
        ctx,
        cmd,
        &format!(
            "✅ Channels set:\nVoice: {}\nText: {}\nLog: {}",
            voice.mention(),
            text.mention(),
            log.mention()
        ),
    )
    .await;

    // Tracking starts now, not at the next restart: pick up anyone
    // already sitting in the voice channel.
    reconcile_guild(ctx, guild_id, config).await;
}

async fn respond(ctx: &Context, cmd: &CommandInteraction, text: &str) {
    let response = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new().content(text),
    );
    if let Err(err) = cmd.create_response(&ctx.http, response).await {
        tracing::warn!("failed to respond to /setchannels: {err:?}");
    }
}
