pub mod automod;
pub mod commands;
pub mod config;
pub mod data;
pub mod discord;
pub mod handlers;
pub mod logging;
pub mod moderation;

pub const BOT_NAME: &str = "wordwarden";
pub const COMMAND_TARGET: &str = "wordwarden::command";
pub const ERROR_TARGET: &str = "wordwarden::error";
pub const EVENT_TARGET: &str = "wordwarden::handlers";
pub const CONSOLE_TARGET: &str = "wordwarden";
pub const AUTOMOD_TARGET: &str = "wordwarden::automod";
pub const MODERATION_TARGET: &str = "wordwarden::moderation";

pub use data::{Data, DataInner, GuildSettings, GuildSettingsStore};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
