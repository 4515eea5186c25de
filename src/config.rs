use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use serenity::all::{ChannelId, GuildId};
use serenity::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Channel triple configured for one guild.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GuildConfig {
    pub voice_channel_id: ChannelId,
    pub text_channel_id: ChannelId,
    pub log_channel_id: ChannelId,
}

/// Guild configuration, held in memory and mirrored to a JSON file.
///
/// Reads are served from the in-memory map; every write rewrites the
/// whole file. A guild with no entry is simply untracked.
pub struct ConfigStore {
    path: PathBuf,
    guilds: RwLock<HashMap<GuildId, GuildConfig>>,
}

impl ConfigStore {
    /// Loads the store from `path`. A missing file starts empty;
    /// malformed JSON is a startup error rather than silent data loss.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let guilds = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("malformed config file {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("cannot read config file {}", path.display()));
            }
        };
        Ok(Self {
            path,
            guilds: RwLock::new(guilds),
        })
    }

    pub async fn get(&self, guild_id: GuildId) -> Option<GuildConfig> {
        self.guilds.read().await.get(&guild_id).copied()
    }

    /// Every configured guild, for startup reconciliation.
    pub async fn configured_guilds(&self) -> Vec<(GuildId, GuildConfig)> {
        self.guilds
            .read()
            .await
            .iter()
            .map(|(id, config)| (*id, *config))
            .collect()
    }

    pub async fn set(&self, guild_id: GuildId, config: GuildConfig) -> Result<()> {
        let snapshot = {
            let mut guilds = self.guilds.write().await;
            guilds.insert(guild_id, config);
            guilds.clone()
        };
        let raw = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(&self.path, raw)
            .await
            .with_context(|| format!("cannot write config file {}", self.path.display()))?;
        Ok(())
    }
}

impl TypeMapKey for ConfigStore {
    type Value = Arc<ConfigStore>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(n: u64) -> GuildConfig {
        GuildConfig {
            voice_channel_id: ChannelId::new(n),
            text_channel_id: ChannelId::new(n + 1),
            log_channel_id: ChannelId::new(n + 2),
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guild_config.json");

        let store = ConfigStore::load(&path).unwrap();
        store.set(GuildId::new(1), config(100)).await.unwrap();
        store.set(GuildId::new(2), config(200)).await.unwrap();

        let reloaded = ConfigStore::load(&path).unwrap();
        let first = reloaded.get(GuildId::new(1)).await.unwrap();
        assert_eq!(first.voice_channel_id, ChannelId::new(100));
        assert_eq!(first.text_channel_id, ChannelId::new(101));
        assert_eq!(first.log_channel_id, ChannelId::new(102));
        assert_eq!(reloaded.configured_guilds().await.len(), 2);
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path().join("nope.json")).unwrap();
        assert!(store.configured_guilds().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_guild_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path().join("guild_config.json")).unwrap();
        store.set(GuildId::new(1), config(100)).await.unwrap();
        assert!(store.get(GuildId::new(2)).await.is_none());
    }

    #[test]
    fn malformed_file_is_a_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guild_config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(ConfigStore::load(&path).is_err());
    }

    #[tokio::test]
    async fn overwriting_a_guild_replaces_its_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guild_config.json");
        let store = ConfigStore::load(&path).unwrap();
        store.set(GuildId::new(1), config(100)).await.unwrap();
        store.set(GuildId::new(1), config(500)).await.unwrap();

        let current = store.get(GuildId::new(1)).await.unwrap();
        assert_eq!(current.voice_channel_id, ChannelId::new(500));
        assert_eq!(ConfigStore::load(&path).unwrap().configured_guilds().await.len(), 1);
    }
}
