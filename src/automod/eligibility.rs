//! Who the word filter ignores

use poise::serenity_prelude::{Permissions, RoleId};

/// Permissions that make a member a moderator for filtering purposes
pub const MODERATOR_PERMISSIONS: Permissions = Permissions::ADMINISTRATOR
    .union(Permissions::MANAGE_GUILD)
    .union(Permissions::MANAGE_MESSAGES);

/// Whether a member with `permissions` and `member_roles` is exempt from the filter.
#[must_use]
pub fn is_moderator(permissions: Permissions, member_roles: &[RoleId], moderator_roles: &[RoleId]) -> bool {
    permissions.intersects(MODERATOR_PERMISSIONS)
        || member_roles.iter().any(|role| moderator_roles.contains(role))
}
