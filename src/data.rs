use std::{ops::Deref, path::PathBuf, sync::Arc};

use crate::automod::{
    AutomodMetrics, AutomodSettings, CompiledPattern, HardPunishmentDispatcher, InMemoryLockStore,
    SettingsSource, SoftPunisher, WordEntry, WordFilter, WorkerPool, error::SettingsError,
    normalize,
};
use crate::config::BotConfig;
use crate::discord::{DiscordAuditLog, DiscordGateway};
use crate::moderation::ModerationService;
use dashmap::DashMap;
use poise::serenity_prelude::{self as serenity, ChannelId, GuildId, RoleId, UserId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const fn default_true() -> bool {
    true
}

/// Guild automod configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: u64,
    #[serde(default)]
    pub words: Vec<WordEntry>,
    #[serde(default = "default_true")]
    pub word_filter_enabled: bool,
    /// DM members before a hard punishment is applied
    #[serde(default)]
    pub dm_on_violation: bool,
    #[serde(default)]
    pub muted_role_id: Option<u64>,
    /// Roles exempt from the word filter on top of the permission check
    #[serde(default)]
    pub moderator_role_ids: Vec<u64>,
    #[serde(default)]
    pub filter_log_channel_id: Option<u64>,
}

impl GuildSettings {
    #[must_use]
    pub const fn new(guild_id: u64) -> Self {
        Self {
            guild_id,
            words: Vec::new(),
            word_filter_enabled: true,
            dm_on_violation: false,
            muted_role_id: None,
            moderator_role_ids: Vec::new(),
            filter_log_channel_id: None,
        }
    }

    /// Read-only view handed to the filter, with the pattern compiled
    #[must_use]
    pub fn snapshot(&self) -> AutomodSettings {
        let pattern = if self.word_filter_enabled {
            CompiledPattern::from_words(self.words.iter().map(|entry| entry.word.as_str()))
        } else {
            None
        };
        AutomodSettings {
            pattern,
            words: self.words.clone().into(),
            dm_on_violation: self.dm_on_violation,
            muted_role_id: self.muted_role_id.filter(|id| *id != 0).map(RoleId::new),
        }
    }
}

/// Settings plus the snapshot compiled from them
#[derive(Debug, Clone)]
struct GuildEntry {
    settings: GuildSettings,
    snapshot: AutomodSettings,
}

impl From<GuildSettings> for GuildEntry {
    fn from(settings: GuildSettings) -> Self {
        let snapshot = settings.snapshot();
        Self { settings, snapshot }
    }
}

/// Every guild's settings, persisted as YAML
#[derive(Debug)]
pub struct GuildSettingsStore {
    guilds: DashMap<GuildId, GuildEntry>,
    path: PathBuf,
}

impl GuildSettingsStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            guilds: DashMap::new(),
            path: path.into(),
        }
    }

    /// Load settings from `path`. A missing or unreadable file yields an
    /// empty store.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let store = Self::new(path);
        let Ok(contents) = tokio::fs::read_to_string(&store.path).await else {
            info!("No guild settings at {}, starting empty", store.path.display());
            return store;
        };
        match serde_yaml::from_str::<Vec<GuildSettings>>(&contents) {
            Ok(guilds) => {
                for settings in guilds {
                    store.upsert(settings);
                }
                info!("Loaded settings for {} guild(s)", store.guilds.len());
            }
            Err(e) => warn!("Failed to parse {}: {e}", store.path.display()),
        }
        store
    }

    /// # Errors
    /// Returns an error if the file cannot be written.
    pub async fn save(&self) -> Result<(), crate::Error> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut guilds: Vec<GuildSettings> = self
            .guilds
            .iter()
            .map(|entry| entry.value().settings.clone())
            .collect();
        guilds.sort_by_key(|settings| settings.guild_id);
        let yaml = serde_yaml::to_string(&guilds)?;
        tokio::fs::write(&self.path, yaml).await?;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, guild_id: GuildId) -> Option<GuildSettings> {
        self.guilds.get(&guild_id).map(|entry| entry.settings.clone())
    }

    /// Replace a guild's settings and recompile its pattern.
    pub fn upsert(&self, settings: GuildSettings) {
        if settings.guild_id == 0 {
            warn!("Ignoring guild settings without a guild id");
            return;
        }
        self.guilds
            .insert(GuildId::new(settings.guild_id), settings.into());
    }

    /// Edit a guild's settings in place, creating them if needed.
    pub fn update<F>(&self, guild_id: GuildId, edit: F) -> GuildSettings
    where
        F: FnOnce(&mut GuildSettings),
    {
        let mut entry = self
            .guilds
            .entry(guild_id)
            .or_insert_with(|| GuildSettings::new(guild_id.get()).into());
        let mut settings = entry.settings.clone();
        edit(&mut settings);
        *entry = settings.clone().into();
        settings
    }

    /// Add `entry`, replacing any entry with the same normalized word.
    /// Returns `false` if the word normalizes to nothing.
    pub fn add_word(&self, guild_id: GuildId, mut entry: WordEntry) -> bool {
        entry.word = normalize(&entry.word);
        if entry.word.is_empty() {
            return false;
        }
        self.update(guild_id, |settings| {
            settings.words.retain(|existing| normalize(&existing.word) != entry.word);
            settings.words.push(entry);
        });
        true
    }

    /// Remove the entry matching `word` after normalization.
    pub fn remove_word(&self, guild_id: GuildId, word: &str) -> bool {
        let needle = normalize(word);
        let mut removed = false;
        self.update(guild_id, |settings| {
            let before = settings.words.len();
            settings.words.retain(|existing| normalize(&existing.word) != needle);
            removed = settings.words.len() != before;
        });
        removed
    }

    pub fn set_filter_enabled(&self, guild_id: GuildId, enabled: bool) {
        self.update(guild_id, |settings| settings.word_filter_enabled = enabled);
    }

    #[must_use]
    pub fn moderator_roles(&self, guild_id: GuildId) -> Vec<RoleId> {
        self.guilds
            .get(&guild_id)
            .map(|entry| {
                entry
                    .settings
                    .moderator_role_ids
                    .iter()
                    .filter(|id| **id != 0)
                    .map(|id| RoleId::new(*id))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn filter_log_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.guilds
            .get(&guild_id)
            .and_then(|entry| entry.settings.filter_log_channel_id)
            .filter(|id| *id != 0)
            .map(ChannelId::new)
    }

    #[must_use]
    pub fn dm_on_violation(&self, guild_id: GuildId) -> bool {
        self.guilds
            .get(&guild_id)
            .is_some_and(|entry| entry.settings.dm_on_violation)
    }
}

#[async_trait::async_trait]
impl SettingsSource for GuildSettingsStore {
    async fn acquire(&self, guild_id: GuildId) -> Result<AutomodSettings, SettingsError> {
        Ok(self
            .guilds
            .get(&guild_id)
            .map_or_else(AutomodSettings::disabled, |entry| entry.snapshot.clone()))
    }
}

#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("config", &self.config)
            .field("settings", &self.settings)
            .field("metrics", &self.metrics.snapshot())
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub struct DataInner {
    pub config: BotConfig,
    pub settings: Arc<GuildSettingsStore>,
    pub locks: InMemoryLockStore,
    pub moderation: ModerationService,
    pub filter: WordFilter,
    pub metrics: Arc<AutomodMetrics>,
}

impl Data {
    /// Wire the automod pipeline to Discord.
    ///
    /// # Errors
    /// Returns an error if the match worker threads cannot be started.
    pub fn build(
        config: BotConfig,
        http: Arc<serenity::Http>,
        system_actor: UserId,
        settings: Arc<GuildSettingsStore>,
    ) -> Result<Self, crate::automod::AutomodError> {
        let metrics = Arc::new(AutomodMetrics::new());
        let locks = InMemoryLockStore::new();
        let moderation = ModerationService::new(Arc::clone(&http));
        let worker = WorkerPool::new(config.worker_threads, config.worker_queue_depth)?;

        let soft = SoftPunisher::new(
            Arc::new(DiscordGateway::new(Arc::clone(&http))),
            Arc::new(DiscordAuditLog::new(Arc::clone(&http), Arc::clone(&settings))),
            config.alert_ttl(),
            Arc::clone(&metrics),
        );
        let hard = HardPunishmentDispatcher::new(
            Arc::new(moderation.clone()),
            Arc::new(locks.clone()),
            system_actor,
            config.dedupe_ttl(),
            Arc::clone(&metrics),
        );
        let filter = WordFilter::new(
            Arc::clone(&settings) as Arc<dyn SettingsSource>,
            Arc::new(worker),
            soft,
            hard,
            config.worker_timeout(),
            Arc::clone(&metrics),
        );

        Ok(Self(Arc::new(DataInner {
            config,
            settings,
            locks,
            moderation,
            filter,
            metrics,
        })))
    }
}
