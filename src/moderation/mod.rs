//! Moderation actions for Wordwarden
//!
//! Executes warnings, kicks, mutes, softbans and bans against Discord, keeps
//! a log of every action and reverses timed ones when they expire.

mod action;
mod error;
mod handler;
pub mod manual;
mod record;
mod service;
mod store;

#[cfg(test)]
pub use action::MockActionExecutor;
pub use action::{ActionExecutor, ActionKind, ActionPayload, DmOptions};
pub use error::{ModerationError, ModerationResult};
pub use handler::{ActionHandler, ActionHandlerRegistry};
pub use record::{ActionLog, ActionState};
pub use service::{ModerationService, ReversalCheck, ReversalTask};
pub use store::ActionLogStore;
