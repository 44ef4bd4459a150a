use crate::models::Role;

const ADMIN_PREFIX: &str = "admin-";
const ADMIN_DOMAIN: &str = "@surprisesender.com";
const LEGACY_ADMIN: &str = "user@example.com";

/// Map an email address to its role.
///
/// `admin-<digits>@surprisesender.com` and the legacy demo account
/// `user@example.com` are administrators; everyone else is a plain user.
pub fn resolve_role(email: &str) -> Role {
    if email == LEGACY_ADMIN || is_numbered_admin(email) {
        Role::Admin
    } else {
        Role::User
    }
}

fn is_numbered_admin(email: &str) -> bool {
    email
        .strip_prefix(ADMIN_PREFIX)
        .and_then(|rest| rest.strip_suffix(ADMIN_DOMAIN))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Company shown for accounts that never entered one.
pub fn default_company(role: Role) -> &'static str {
    match role {
        Role::Admin => "Admin Corp",
        Role::User => "User Company",
    }
}
