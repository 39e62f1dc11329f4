//! Identity lookup. Credentials and tokens are handled by the calling layer.
use crate::error::{MarketError, MarketResult};
use crate::store::{self, Store};
use crate::types::{Role, TimeStamp, UserProfile, has_role};
use crate::utils;

pub trait Directory: Send + Sync {
    fn profile(&self, user_id: &str) -> MarketResult<Option<UserProfile>>;
}

/// Resolve `user_id` or fail with `NotFound`.
pub(crate) fn require_user(directory: &dyn Directory, user_id: &str) -> MarketResult<UserProfile> {
    directory
        .profile(user_id)?
        .ok_or_else(|| MarketError::NotFound(format!("user {user_id}")))
}

/// Resolve `user_id` and check it holds `role`.
pub(crate) fn require_role(
    directory: &dyn Directory,
    user_id: &str,
    role: Role,
    action: &str,
) -> MarketResult<UserProfile> {
    let user = require_user(directory, user_id)?;
    if !has_role(&user, role) {
        return Err(MarketError::Forbidden(format!(
            "only a {} may {action}",
            role.as_str()
        )));
    }
    Ok(user)
}

/// Directory backed by the `users` tree.
#[derive(Clone)]
pub struct StoredDirectory {
    store: Store,
}

impl StoredDirectory {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn register(&self, name: &str, roles: &[Role]) -> MarketResult<UserProfile> {
        if name.trim().is_empty() {
            return Err(MarketError::InvalidArgument("name must not be blank".into()));
        }
        if roles.is_empty() {
            return Err(MarketError::InvalidArgument(
                "a user needs at least one role".into(),
            ));
        }
        let mut unique = Vec::with_capacity(roles.len());
        for role in roles {
            if !unique.contains(role) {
                unique.push(*role);
            }
        }

        let profile = UserProfile {
            id: utils::new_id("user_")?,
            name: name.trim().to_string(),
            roles: unique,
            created_at: TimeStamp::new(),
        };
        store::put(&self.store.users, &profile.id, &profile)?;
        tracing::info!(user_id = %profile.id, roles = ?profile.roles, "user registered");

        Ok(profile)
    }
}

impl Directory for StoredDirectory {
    fn profile(&self, user_id: &str) -> MarketResult<Option<UserProfile>> {
        store::get(&self.store.users, user_id)
    }
}
