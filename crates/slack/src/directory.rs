use std::sync::Arc;
use std::time::Duration;

use tokenbot_core::cache::TtlCache;
use tokenbot_core::domain::grant::HANDLE_PREFIX;

use crate::client::{SlackApi, SlackApiError, SlackUser};

const MEMBERS_KEY: &str = "members";

/// Workspace members by handle, refreshed from `users.list` at most once per
/// `ttl`.
#[derive(Clone)]
pub struct UserDirectory {
    api: Arc<dyn SlackApi>,
    members: TtlCache<&'static str, Arc<Vec<SlackUser>>>,
    ttl: Duration,
}

impl UserDirectory {
    pub fn new(api: Arc<dyn SlackApi>, ttl: Duration) -> Self {
        Self { api, members: TtlCache::new(), ttl }
    }

    async fn members(&self) -> Result<Arc<Vec<SlackUser>>, SlackApiError> {
        let api = Arc::clone(&self.api);
        self.members
            .get_or_refresh(MEMBERS_KEY, self.ttl, || async move {
                api.list_users().await.map(Arc::new)
            })
            .await
    }

    /// Resolves `@name` (or bare `name`) to a platform user id.
    pub async fn user_id_for(&self, handle: &str) -> Result<Option<String>, SlackApiError> {
        let name = handle.trim().trim_start_matches(HANDLE_PREFIX);
        let members = self.members().await?;
        Ok(members
            .iter()
            .find(|user| !user.deleted && user.name == name)
            .map(|user| user.id.clone()))
    }

    /// User name for an id, straight from `users.info`.
    pub async fn name_for(&self, user_id: &str) -> Result<String, SlackApiError> {
        self.api.user_info(user_id).await.map(|user| user.name)
    }

    pub async fn refresh(&self) {
        self.members.invalidate(&MEMBERS_KEY).await;
    }
}
