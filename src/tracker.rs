use serenity::all::{GuildId, UserId};
use serenity::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Side effects owed after a join transition.
pub struct JoinOutcome {
    /// The member was appended to the join order.
    pub newly_present: bool,
    /// First join this epoch; a log line should be emitted.
    pub needs_log: bool,
}

/// Join order and log bookkeeping for one guild's tracked voice channel.
///
/// `order` holds the current occupants in the order they joined, without
/// duplicates. `logged_once` remembers everyone who has ever been logged
/// since process start; it is retained on leave, so a member who drops
/// out and rejoins keeps their place at the tail of `order` but is not
/// logged a second time.
pub struct GuildTrackingState {
    order: Vec<UserId>,
    logged_once: HashSet<UserId>,
}

impl GuildTrackingState {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            logged_once: HashSet::new(),
        }
    }

    pub fn order(&self) -> &[UserId] {
        &self.order
    }

    /// The member entered the tracked channel. Appends to the join order
    /// unless already present, so replayed or duplicated gateway events
    /// cannot reorder anyone.
    pub fn on_join(&mut self, user_id: UserId) -> JoinOutcome {
        let newly_present = if self.order.contains(&user_id) {
            false
        } else {
            self.order.push(user_id);
            true
        };
        let needs_log = self.logged_once.insert(user_id);
        JoinOutcome {
            newly_present,
            needs_log,
        }
    }

    /// The member left the tracked channel. Unknown ids are ignored.
    pub fn on_leave(&mut self, user_id: UserId) -> bool {
        let before = self.order.len();
        self.order.retain(|id| *id != user_id);
        self.order.len() != before
    }

    /// Aligns the state with the channel's actual occupants, for startup
    /// or a freshly configured guild. Occupants the tracker has never
    /// seen are appended (their true join order is unrecoverable) and
    /// returned so the caller can emit their log lines. Nothing is
    /// removed. Calling twice with the same set changes nothing.
    pub fn reconcile(&mut self, occupants: &[UserId]) -> Vec<UserId> {
        let mut to_log = Vec::new();
        for &user_id in occupants {
            if !self.order.contains(&user_id) {
                self.order.push(user_id);
            }
            if self.logged_once.insert(user_id) {
                to_log.push(user_id);
            }
        }
        to_log
    }
}

/// Registry of per-guild tracking state, created on first use.
///
/// Each guild's state sits behind its own mutex: simultaneous gateway
/// dispatches for one guild apply their mutations in lock order, while
/// other guilds stay unblocked. Holding the guild lock through the
/// display pass also keeps that guild's message edits in order.
pub struct Tracker {
    guilds: RwLock<HashMap<GuildId, Arc<Mutex<GuildTrackingState>>>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self {
            guilds: RwLock::new(HashMap::new()),
        }
    }

    pub async fn guild(&self, guild_id: GuildId) -> Arc<Mutex<GuildTrackingState>> {
        if let Some(state) = self.guilds.read().await.get(&guild_id) {
            return state.clone();
        }
        self.guilds
            .write()
            .await
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(GuildTrackingState::new())))
            .clone()
    }
}

impl TypeMapKey for Tracker {
    type Value = Arc<Tracker>;
}
