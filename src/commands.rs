use crate::automod::{HardPunishment, ModerationFlags, WordEntry};
use crate::moderation::manual::{ManualActionError, manual_ban};
use crate::moderation::{ActionPayload, DmOptions};
use crate::{Data, Error};
use poise::serenity_prelude::{self as serenity, Mentionable};
use poise::{Context, CreateReply, command};
use std::fmt::Write as _;
use std::time::Duration;

/// Discord's message length cap, with room for the header line
const LIST_LIMIT: usize = 1900;
/// Longest timed action offered by the commands, one year in minutes
const MAX_DURATION_MINUTES: u64 = 525_600;

async fn reply_ephemeral(ctx: Context<'_, Data, Error>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

/// Clamp to the longest duration the commands allow.
fn minutes_to_duration(minutes: u64) -> Duration {
    Duration::from_secs(minutes.min(MAX_DURATION_MINUTES) * 60)
}

fn ban_summary(subject: &str, duration: Option<Duration>, reason: Option<&str>) -> String {
    let mut summary = match duration {
        Some(duration) => format!("Banned {subject} for {} minute(s).", duration.as_secs() / 60),
        None => format!("Banned {subject}."),
    };
    if let Some(reason) = reason {
        let _ = write!(summary, " Reason: {reason}");
    }
    summary
}

/// Ban a member from the server
///
/// Shares the automod dedupe keys, so a ban already in flight for the same
/// member is reported instead of repeated.
#[command(
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS",
    required_bot_permissions = "BAN_MEMBERS"
)]
pub async fn ban(
    ctx: Context<'_, Data, Error>,
    #[description = "Member to ban"] user: serenity::User,
    #[description = "Reason for the ban"] reason: Option<String>,
    #[description = "Unban after this many minutes, permanent when omitted"]
    #[min = 1]
    #[max = 525_600]
    duration_minutes: Option<u64>,
    #[description = "Days of messages to delete (0-7)"]
    #[min = 0]
    #[max = 7]
    purge_days: Option<u8>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    if user.id == ctx.author().id {
        return reply_ephemeral(ctx, "You cannot ban yourself.").await;
    }

    let data = ctx.data();
    let duration = duration_minutes.map(minutes_to_duration);
    let mut payload = ActionPayload::new(guild_id, user.id, ctx.channel_id(), ctx.author().id)
        .with_duration(duration);
    payload.reason.clone_from(&reason);
    let dm = DmOptions {
        send: data.settings.dm_on_violation(guild_id),
    };

    match manual_ban(
        &data.moderation,
        &data.locks,
        data.config.dedupe_ttl(),
        payload,
        purge_days.unwrap_or(0).min(7),
        dm,
    )
    .await
    {
        Ok(log) => {
            let summary = ban_summary(&user.mention().to_string(), log.payload.timed(), reason.as_deref());
            ctx.say(summary).await?;
            Ok(())
        }
        Err(e @ (ManualActionError::InProgress | ManualActionError::LockUnavailable)) => {
            reply_ephemeral(ctx, e.to_string()).await
        }
        Err(ManualActionError::Moderation(e)) => Err(e.into()),
    }
}

/// Escalation choices offered by `/filterword add`
#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum PunishmentChoice {
    #[name = "none"]
    None,
    #[name = "warning"]
    Warning,
    #[name = "kick"]
    Kick,
    #[name = "mute"]
    Mute,
    #[name = "softban"]
    SoftBan,
    #[name = "ban"]
    Ban,
}

impl From<PunishmentChoice> for HardPunishment {
    fn from(choice: PunishmentChoice) -> Self {
        match choice {
            PunishmentChoice::None => Self::None,
            PunishmentChoice::Warning => Self::Warning,
            PunishmentChoice::Kick => Self::Kick,
            PunishmentChoice::Mute => Self::Mute,
            PunishmentChoice::SoftBan => Self::SoftBan,
            PunishmentChoice::Ban => Self::Ban,
        }
    }
}

fn describe_flags(flags: ModerationFlags) -> String {
    if flags.is_empty() {
        return "none".to_string();
    }
    flags
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_entry(entry: &WordEntry) -> String {
    let mut line = format!("`{}`: {}", entry.word, describe_flags(entry.soft_punish));
    if entry.hard_punish != HardPunishment::None {
        let _ = write!(line, "; {}", entry.hard_punish);
        if let Some(duration) = entry.duration() {
            let _ = write!(line, " for {}m", duration.as_secs() / 60);
        }
    }
    line
}

fn word_list(entries: &[WordEntry]) -> String {
    let mut list = String::new();
    for (shown, entry) in entries.iter().enumerate() {
        let line = describe_entry(entry);
        if list.len() + line.len() + 1 > LIST_LIMIT {
            let _ = write!(list, "...and {} more", entries.len() - shown);
            break;
        }
        list.push_str(&line);
        list.push('\n');
    }
    list
}

/// Manage the server's filtered words
#[command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    subcommands("filterword_add", "filterword_remove", "filterword_list", "filterword_toggle"),
    subcommand_required
)]
pub async fn filterword(_ctx: Context<'_, Data, Error>) -> Result<(), Error> {
    Ok(())
}

/// Add or replace a filtered word
#[command(slash_command, guild_only, rename = "add")]
pub async fn filterword_add(
    ctx: Context<'_, Data, Error>,
    #[description = "Word to filter"] word: String,
    #[description = "Delete the message (default on)"] delete: Option<bool>,
    #[description = "Post to the filter log channel (default on)"] log: Option<bool>,
    #[description = "Warn in the channel (default off)"] alert: Option<bool>,
    #[description = "Escalation applied to the author"] punishment: Option<PunishmentChoice>,
    #[description = "Mute or ban length in minutes"]
    #[min = 1]
    #[max = 525_600]
    duration_minutes: Option<u64>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };

    let mut flags = ModerationFlags::empty();
    flags.set(ModerationFlags::DELETE, delete.unwrap_or(true));
    flags.set(ModerationFlags::LOG, log.unwrap_or(true));
    flags.set(ModerationFlags::ALERT, alert.unwrap_or(false));
    let hard = punishment.map_or(HardPunishment::None, HardPunishment::from);
    let duration = duration_minutes.map(minutes_to_duration);
    let entry = WordEntry::new(word).with_soft(flags).with_hard(hard, duration);

    let settings = &ctx.data().settings;
    if !settings.add_word(guild_id, entry) {
        return reply_ephemeral(ctx, "That word has no letters left after normalization.").await;
    }
    settings.save().await?;

    let added = settings
        .get(guild_id)
        .map(|guild| word_list(&guild.words))
        .unwrap_or_default();
    reply_ephemeral(ctx, format!("Word filter updated:\n{added}")).await
}

/// Remove a filtered word
#[command(slash_command, guild_only, rename = "remove")]
pub async fn filterword_remove(
    ctx: Context<'_, Data, Error>,
    #[description = "Word to stop filtering"] word: String,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let settings = &ctx.data().settings;
    if !settings.remove_word(guild_id, &word) {
        return reply_ephemeral(ctx, "That word is not filtered.").await;
    }
    settings.save().await?;
    reply_ephemeral(ctx, "Word removed.").await
}

/// Show the filtered words
#[command(slash_command, guild_only, rename = "list")]
pub async fn filterword_list(ctx: Context<'_, Data, Error>) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let Some(guild) = ctx.data().settings.get(guild_id).filter(|g| !g.words.is_empty()) else {
        return reply_ephemeral(ctx, "No words are filtered.").await;
    };
    let state = if guild.word_filter_enabled { "enabled" } else { "disabled" };
    reply_ephemeral(ctx, format!("Word filter is {state}.\n{}", word_list(&guild.words))).await
}

/// Turn the word filter on or off
#[command(slash_command, guild_only, rename = "toggle")]
pub async fn filterword_toggle(
    ctx: Context<'_, Data, Error>,
    #[description = "Whether the filter runs"] enabled: bool,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let settings = &ctx.data().settings;
    settings.set_filter_enabled(guild_id, enabled);
    settings.save().await?;
    let state = if enabled { "enabled" } else { "disabled" };
    reply_ephemeral(ctx, format!("Word filter {state}.")).await
}
