use crate::automod::eligibility::is_moderator;
use crate::automod::{FilterOutcome, IncomingMessage};
use crate::{Data, EVENT_TARGET};
use poise::serenity_prelude::{
    self as serenity, Context, EventHandler, GuildId, Message, Permissions, Ready, RoleId,
};
use tracing::{debug, info, warn};

pub struct Handler {
    pub data: Data,
}

/// Authors whose permissions could not be resolved are exempt, so an
/// unknown administrator is never punished.
fn exempt_from_filter(permissions: Option<Permissions>, member_roles: &[RoleId], moderator_roles: &[RoleId]) -> bool {
    permissions.is_none_or(|permissions| is_moderator(permissions, member_roles, moderator_roles))
}

/// The author's guild permissions, from the cache or else over HTTP.
async fn author_permissions(ctx: &Context, guild_id: GuildId, msg: &Message) -> Option<Permissions> {
    let member = msg.member.as_deref()?;
    let cached = ctx
        .cache
        .guild(guild_id)
        .map(|guild| guild.partial_member_permissions(msg.author.id, member));
    if cached.is_some() {
        return cached;
    }

    match guild_id.to_partial_guild(ctx).await {
        Ok(guild) => Some(guild.partial_member_permissions(msg.author.id, member)),
        Err(e) => {
            debug!(target: EVENT_TARGET, %guild_id, "Could not resolve author permissions: {e}");
            None
        }
    }
}

/// Moderator status and channel sendability for a guild message.
async fn author_context(ctx: &Context, guild_id: GuildId, msg: &Message, data: &Data) -> (bool, bool) {
    let moderator_roles = data.settings.moderator_roles(guild_id);
    let member_roles = msg
        .member
        .as_deref()
        .map(|member| member.roles.clone())
        .unwrap_or_default();
    let permissions = author_permissions(ctx, guild_id, msg).await;

    // Threads are not in the channel map and always accept messages.
    let sendable = ctx.cache.guild(guild_id).is_none_or(|guild| {
        guild
            .channels
            .get(&msg.channel_id)
            .is_none_or(serenity::GuildChannel::is_text_based)
    });

    (
        exempt_from_filter(permissions, &member_roles, &moderator_roles),
        sendable,
    )
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!(target: EVENT_TARGET, "Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                target: EVENT_TARGET,
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!(target: EVENT_TARGET, "Cache ready! The bot is in {guild_count} guild(s)");
    }

    /// Hands guild messages to the word filter without blocking the gateway.
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot || msg.webhook_id.is_some() || msg.content.is_empty() {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        let (author_is_moderator, channel_sendable) = author_context(&ctx, guild_id, &msg, &self.data).await;
        let incoming = IncomingMessage {
            guild_id,
            channel_id: msg.channel_id,
            message_id: msg.id,
            author_id: msg.author.id,
            author_is_moderator,
            channel_sendable,
            content: msg.content,
        };

        let filter = self.data.filter.clone();
        tokio::spawn(async move {
            let outcome = filter.run(&incoming).await;
            if let FilterOutcome::Dispatched { word, soft, hard } = &outcome {
                debug!(
                    target: EVENT_TARGET,
                    guild_id = %incoming.guild_id,
                    message_id = %incoming.message_id,
                    word = %word,
                    soft = ?soft,
                    hard = ?hard,
                    "Word filter dispatched"
                );
            }
        });
    }
}
