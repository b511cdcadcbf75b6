//! Serenity-backed soft punishment plumbing

use crate::automod::error::GatewayError;
use crate::automod::soft::{AuditEntry, AuditLogSink, LazyAuditEntry, LogCategory, MessageGateway};
use crate::data::GuildSettingsStore;
use poise::serenity_prelude::{
    self as serenity, ChannelId, Colour, CreateEmbed, CreateEmbedFooter, CreateMessage, GuildId, Http,
    Mentionable, MessageId, Timestamp,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

fn gateway_error(error: serenity::Error) -> GatewayError {
    if let serenity::Error::Http(http_error) = &error {
        match http_error.status_code().map(|status| status.as_u16()) {
            Some(404) => return GatewayError::NotFound,
            Some(403) => return GatewayError::Forbidden(error.to_string()),
            _ => {}
        }
    }
    GatewayError::Api(error.to_string())
}

/// Message deletes and self-expiring alerts over HTTP
pub struct DiscordGateway {
    http: Arc<Http>,
}

impl DiscordGateway {
    #[must_use]
    pub const fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait::async_trait]
impl MessageGateway for DiscordGateway {
    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<(), GatewayError> {
        channel_id
            .delete_message(&*self.http, message_id)
            .await
            .map_err(gateway_error)
    }

    async fn send_temporary(&self, channel_id: ChannelId, content: String, lifetime: Duration) -> Result<(), GatewayError> {
        let message = channel_id
            .say(&*self.http, content)
            .await
            .map_err(gateway_error)?;

        let http = Arc::clone(&self.http);
        tokio::spawn(async move {
            tokio::time::sleep(lifetime).await;
            if let Err(e) = message.delete(&*http).await {
                debug!(message_id = %message.id, "Alert already gone: {e}");
            }
        });
        Ok(())
    }
}

/// Audit entries posted as embeds to the guild's log channel
pub struct DiscordAuditLog {
    http: Arc<Http>,
    settings: Arc<GuildSettingsStore>,
}

impl DiscordAuditLog {
    #[must_use]
    pub const fn new(http: Arc<Http>, settings: Arc<GuildSettingsStore>) -> Self {
        Self { http, settings }
    }

    fn channel_for(&self, guild_id: GuildId, category: LogCategory) -> Option<ChannelId> {
        match category {
            LogCategory::FilterWords => self.settings.filter_log_channel(guild_id),
        }
    }
}

/// Discord rejects embeds with longer descriptions
const EMBED_DESCRIPTION_LIMIT: usize = 4096;

/// Cut `content` to the embed limit on a char boundary, marking the cut.
fn fit_description(content: String) -> String {
    if content.chars().count() <= EMBED_DESCRIPTION_LIMIT {
        return content;
    }
    let mut fitted: String = content.chars().take(EMBED_DESCRIPTION_LIMIT - 1).collect();
    fitted.push('…');
    fitted
}

fn audit_embed(entry: AuditEntry, category: LogCategory) -> CreateEmbed {
    CreateEmbed::new()
        .title(entry.title)
        .description(fit_description(entry.content))
        .field("User", entry.actor_id.mention().to_string(), true)
        .field("Channel", entry.channel_id.mention().to_string(), true)
        .footer(CreateEmbedFooter::new(category.to_string()))
        .colour(Colour::RED)
        .timestamp(Timestamp::now())
}

impl AuditLogSink for DiscordAuditLog {
    fn emit(&self, guild_id: GuildId, category: LogCategory, render: LazyAuditEntry) {
        let Some(channel_id) = self.channel_for(guild_id, category) else {
            return;
        };
        let embed = audit_embed(render(), category);
        let http = Arc::clone(&self.http);
        tokio::spawn(async move {
            let message = CreateMessage::new().embed(embed);
            if let Err(e) = channel_id.send_message(&*http, message).await {
                warn!(%guild_id, %channel_id, %category, "Failed to post audit log entry: {e}");
            }
        });
    }
}
