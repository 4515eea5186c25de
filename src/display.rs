use serenity::all::{ChannelId, EditMessage, GetMessages, GuildId, Mentionable, MessageId, UserId};
use serenity::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const HEADER: &str = "🔊 **Voice Join Order**";
const EMPTY_LINE: &str = "No one is in the channel.";
const PLACEHOLDER: &str = "Waiting for members...";

/// History window searched when the cached message id is cold or stale.
const SCAN_LIMIT: u8 = 10;

/// Renders the join order as the display message body: a fixed header,
/// then one numbered mention per occupant.
pub fn render(order: &[UserId]) -> String {
    if order.is_empty() {
        return format!("{HEADER}\n{EMPTY_LINE}");
    }
    let mut text = String::from(HEADER);
    for (index, user_id) in order.iter().enumerate() {
        text.push_str(&format!("\n{}. {}", index + 1, user_id.mention()));
    }
    text
}

/// Remembered display message per guild. The cached id is authoritative;
/// a history scan is only the recovery path when it is missing or the
/// message has been deleted out from under us.
pub struct DisplayCache {
    messages: RwLock<HashMap<GuildId, MessageId>>,
}

impl DisplayCache {
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(HashMap::new()),
        }
    }

    async fn get(&self, guild_id: GuildId) -> Option<MessageId> {
        self.messages.read().await.get(&guild_id).copied()
    }

    async fn remember(&self, guild_id: GuildId, message_id: MessageId) {
        self.messages.write().await.insert(guild_id, message_id);
    }

    async fn forget(&self, guild_id: GuildId) {
        self.messages.write().await.remove(&guild_id);
    }
}

impl TypeMapKey for DisplayCache {
    type Value = Arc<DisplayCache>;
}

/// Overwrites the guild's display message with the current join order,
/// creating the message if the channel has none from us yet.
pub async fn update(
    ctx: &Context,
    cache: &DisplayCache,
    guild_id: GuildId,
    text_channel_id: ChannelId,
    order: &[UserId],
) -> serenity::Result<()> {
    let text = render(order);

    if let Some(message_id) = cache.get(guild_id).await {
        match text_channel_id
            .edit_message(&ctx.http, message_id, EditMessage::new().content(text.as_str()))
            .await
        {
            Ok(_) => return Ok(()),
            Err(err) => {
                tracing::debug!(%guild_id, %message_id, "cached display message is stale: {err}");
                cache.forget(guild_id).await;
            }
        }
    }

    let message_id = match find_own_message(ctx, text_channel_id).await? {
        Some(message_id) => message_id,
        None => {
            text_channel_id
                .say(&ctx.http, format!("{HEADER}\n{PLACEHOLDER}"))
                .await?
                .id
        }
    };
    text_channel_id
        .edit_message(&ctx.http, message_id, EditMessage::new().content(text))
        .await?;
    cache.remember(guild_id, message_id).await;
    Ok(())
}

/// Newest message in the channel's recent history authored by the bot.
async fn find_own_message(
    ctx: &Context,
    channel_id: ChannelId,
) -> serenity::Result<Option<MessageId>> {
    let own_id = ctx.cache.current_user().id;
    let recent = channel_id
        .messages(&ctx.http, GetMessages::new().limit(SCAN_LIMIT))
        .await?;
    Ok(recent
        .into_iter()
        .find(|message| message.author.id == own_id)
        .map(|message| message.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_numbered_mentions_in_order() {
        let order = [UserId::new(1), UserId::new(2), UserId::new(3)];
        assert_eq!(
            render(&order),
            "🔊 **Voice Join Order**\n1. <@1>\n2. <@2>\n3. <@3>"
        );
    }

    #[test]
    fn renders_fixed_empty_state_line() {
        assert_eq!(render(&[]), "🔊 **Voice Join Order**\nNo one is in the channel.");
    }

    #[test]
    fn single_occupant_has_no_trailing_newline() {
        assert_eq!(render(&[UserId::new(7)]), "🔊 **Voice Join Order**\n1. <@7>");
    }

    #[tokio::test]
    async fn cache_remembers_and_forgets_per_guild() {
        let cache = DisplayCache::new();
        let guild = GuildId::new(1);
        assert!(cache.get(guild).await.is_none());

        cache.remember(guild, MessageId::new(42)).await;
        assert_eq!(cache.get(guild).await, Some(MessageId::new(42)));
        assert!(cache.get(GuildId::new(2)).await.is_none());

        cache.forget(guild).await;
        assert!(cache.get(guild).await.is_none());
    }
}
