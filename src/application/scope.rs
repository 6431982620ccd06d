//! Per-request unit of work.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::application::entity_manager::EntityManager;
use crate::application::hooks::{Dispatcher, HookContext, HookError, HookName, HookRegistry, Payload};
use crate::application::repos::{Database, RepoError};
use crate::application::repository::Repository;
use crate::cache::CacheManager;
use crate::domain::entities::User;
use crate::domain::schema::Entity;

/// Identity of the request a unit of work serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub remote_addr: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            remote_addr: None,
        }
    }

    pub fn with_remote_addr(mut self, remote_addr: impl Into<String>) -> Self {
        self.remote_addr = Some(remote_addr.into());
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything one request reads and writes through.
///
/// The scope owns its [`EntityManager`], so repositories and hook handlers
/// borrowed from it all share a single transaction.
pub struct RequestScope {
    entity_manager: EntityManager,
    cache: CacheManager,
    hooks: Arc<HookRegistry>,
    request: RequestContext,
    user: Option<User>,
}

impl RequestScope {
    pub fn new(
        database: Arc<dyn Database>,
        cache: CacheManager,
        hooks: Arc<HookRegistry>,
        request: RequestContext,
    ) -> Self {
        Self {
            entity_manager: EntityManager::new(database),
            cache,
            hooks,
            request,
            user: None,
        }
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    pub fn entity_manager(&mut self) -> &mut EntityManager {
        &mut self.entity_manager
    }

    pub fn repository<E: Entity>(&mut self) -> Repository<'_, E> {
        Repository::new(&mut self.entity_manager, &self.cache)
    }

    pub fn dispatcher(&mut self) -> Dispatcher<'_> {
        Dispatcher::new(
            &self.hooks,
            HookContext {
                entity_manager: &mut self.entity_manager,
                cache: &self.cache,
                request: &self.request,
                user: self.user.as_ref(),
            },
        )
    }

    pub async fn dispatch(&mut self, hook: HookName, payload: Payload) -> Result<Payload, HookError> {
        self.dispatcher().execute(hook, payload).await
    }

    pub async fn commit(&mut self) -> Result<(), RepoError> {
        debug!(request_id = %self.request.request_id, "committing request scope");
        self.entity_manager.commit().await
    }

    pub async fn rollback(&mut self) -> Result<(), RepoError> {
        debug!(request_id = %self.request.request_id, "rolling back request scope");
        self.entity_manager.rollback().await
    }
}
