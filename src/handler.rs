use serenity::all::{ChannelId, GuildId, Interaction, Mentionable, Ready, UserId};
use serenity::async_trait;
use serenity::model::voice::VoiceState;
use serenity::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::commands;
use crate::config::{ConfigStore, GuildConfig};
use crate::display::{self, DisplayCache};
use crate::tracker::Tracker;

/// Fetches a shared service installed into the client's type map at
/// startup.
pub(crate) async fn shared<K>(ctx: &Context) -> K::Value
where
    K: TypeMapKey,
    K::Value: Clone,
{
    let data = ctx.data.read().await;
    data.get::<K>()
        .expect("service installed in Client::builder")
        .clone()
}

#[derive(Default)]
pub struct Handler {
    reconciled: AtomicBool,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!("connected as {}", ready.user.name);

        for guild in &ready.guilds {
            if let Err(err) = guild.id.create_command(&ctx.http, commands::register()).await {
                tracing::error!(guild_id = %guild.id, "failed to register /setchannels: {err}");
            }
        }
    }

    // Voice states are only trustworthy once the guild cache is filled,
    // so the startup reconciliation hangs off cache_ready rather than
    // ready. Guarded against gateway reconnects re-firing it.
    async fn cache_ready(&self, ctx: Context, _guilds: Vec<GuildId>) {
        if self.reconciled.swap(true, Ordering::AcqRel) {
            return;
        }
        reconcile_all(&ctx).await;
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let store = shared::<ConfigStore>(&ctx).await;
        let Some(config) = store.get(guild_id).await else {
            // Guild not configured; tracking is silently disabled.
            return;
        };

        let old_channel = old.as_ref().and_then(|state| state.channel_id);
        let new_channel = new.channel_id;
        let tracked = config.voice_channel_id;
        let joined = new_channel == Some(tracked) && old_channel != Some(tracked);
        let left = old_channel == Some(tracked) && new_channel != Some(tracked);
        if !joined && !left {
            // Mute toggles and moves between untracked channels.
            return;
        }

        let user_id = new.user_id;
        let tracker = shared::<Tracker>(&ctx).await;
        let cell = tracker.guild(guild_id).await;
        // Serialization point: same-guild transitions apply in lock
        // order; other guilds proceed independently.
        let mut state = cell.lock().await;

        if joined {
            let outcome = state.on_join(user_id);
            if !outcome.newly_present && !outcome.needs_log {
                // Duplicate or replayed event; nothing changed.
                return;
            }
            if outcome.needs_log {
                let name = member_tag(&ctx, guild_id, user_id).await;
                send_join_log(&ctx, config.log_channel_id, &name).await;
            }
        } else if !state.on_leave(user_id) {
            // The leaver was never tracked.
            return;
        }

        let cache = shared::<DisplayCache>(&ctx).await;
        if let Err(err) =
            display::update(&ctx, &cache, guild_id, config.text_channel_id, state.order()).await
        {
            tracing::warn!(%guild_id, "display update failed: {err}");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(cmd) = interaction {
            if cmd.data.name == "setchannels" {
                commands::handle_setchannels(&ctx, &cmd).await;
            }
        }
    }
}

/// Startup pass: align every configured guild with the occupants the
/// cache already knows about.
async fn reconcile_all(ctx: &Context) {
    let store = shared::<ConfigStore>(ctx).await;
    for (guild_id, config) in store.configured_guilds().await {
        reconcile_guild(ctx, guild_id, config).await;
    }
}

/// Aligns one guild's tracker with actual channel occupancy, emits log
/// lines for occupants seen for the first time, and renders the display.
/// Also run when a guild is configured mid-flight via /setchannels.
pub async fn reconcile_guild(ctx: &Context, guild_id: GuildId, config: GuildConfig) {
    let occupants = current_occupants(ctx, guild_id, config.voice_channel_id);

    let tracker = shared::<Tracker>(ctx).await;
    let cell = tracker.guild(guild_id).await;
    let mut state = cell.lock().await;

    let to_log = state.reconcile(&occupants);
    tracing::info!(
        %guild_id,
        occupants = occupants.len(),
        newly_logged = to_log.len(),
        "reconciled voice channel occupancy"
    );
    for user_id in to_log {
        let name = member_tag(ctx, guild_id, user_id).await;
        send_join_log(ctx, config.log_channel_id, &name).await;
    }

    let cache = shared::<DisplayCache>(ctx).await;
    if let Err(err) =
        display::update(ctx, &cache, guild_id, config.text_channel_id, state.order()).await
    {
        tracing::warn!(%guild_id, "initial display render failed: {err}");
    }
}

/// Current occupants of a voice channel, straight from the guild cache.
fn current_occupants(ctx: &Context, guild_id: GuildId, voice_channel_id: ChannelId) -> Vec<UserId> {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return Vec::new();
    };
    guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(voice_channel_id))
        .map(|state| state.user_id)
        .collect()
}

/// Best-effort delivery; tracker state is already committed either way.
async fn send_join_log(ctx: &Context, log_channel_id: ChannelId, name: &str) {
    if let Err(err) = log_channel_id
        .say(&ctx.http, format!("{name} JOINED"))
        .await
    {
        tracing::warn!(channel_id = %log_channel_id, "join log delivery failed: {err}");
    }
}

/// Tag of a guild member for the join log, degrading to a mention if the
/// member cannot be resolved.
async fn member_tag(ctx: &Context, guild_id: GuildId, user_id: UserId) -> String {
    let cached = ctx
        .cache
        .guild(guild_id)
        .and_then(|guild| guild.members.get(&user_id).map(|member| member.user.tag()));
    if let Some(tag) = cached {
        return tag;
    }
    match user_id.to_user(ctx).await {
        Ok(user) => user.tag(),
        Err(_) => user_id.mention().to_string(),
    }
}
