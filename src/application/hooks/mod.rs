//! Extension hooks.
//!
//! Extensions are compiled-in values implementing [`Extension`]; each
//! contributes handlers for named hook points. A [`HookRegistry`] is built
//! once at startup from the configured extension list and shared by `Arc`.
//! Per request, a [`Dispatcher`] threads a [`Payload`] through every
//! handler registered for a hook, in registration order.

mod dispatcher;
mod names;
mod payload;
mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::application::entity_manager::EntityManager;
use crate::application::repos::RepoError;
use crate::application::repository::Repository;
use crate::application::scope::RequestContext;
use crate::cache::CacheManager;
use crate::domain::entities::User;
use crate::domain::schema::Entity;

pub use dispatcher::Dispatcher;
pub use names::{Action, HookName, Phase, Target};
pub use payload::Payload;
pub use registry::{HookRegistry, HookRegistryBuilder};

#[derive(Debug, Error)]
pub enum HookError {
    #[error("unknown extension `{0}`")]
    UnknownExtension(String),
    #[error("unknown hook name `{0}`")]
    UnknownHook(String),
    #[error("hook payload mismatch: expected {expected}, found {found}")]
    PayloadMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("operation rejected by hook: {reason}")]
    Rejected { reason: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl HookError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Request-scoped state a handler runs against.
///
/// The entity manager is the one the triggering operation uses, so writes
/// made by a handler share its commit or rollback.
pub struct HookContext<'a> {
    pub entity_manager: &'a mut EntityManager,
    pub cache: &'a CacheManager,
    pub request: &'a RequestContext,
    pub user: Option<&'a User>,
}

impl HookContext<'_> {
    pub fn repository<E: Entity>(&mut self) -> Repository<'_, E> {
        Repository::new(self.entity_manager, self.cache)
    }
}

#[async_trait]
pub trait HookHandler: Send + Sync {
    /// Receive the running payload and return the one the next handler sees.
    async fn call(&self, ctx: &mut HookContext<'_>, payload: Payload)
    -> Result<Payload, HookError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> HookHandler for FnHandler<F>
where
    F: Fn(&HookContext<'_>, Payload) -> Result<Payload, HookError> + Send + Sync + 'static,
{
    async fn call(
        &self,
        ctx: &mut HookContext<'_>,
        payload: Payload,
    ) -> Result<Payload, HookError> {
        (self.0)(ctx, payload)
    }
}

/// Wrap a synchronous transform as a handler.
pub fn handler_fn<F>(transform: F) -> Arc<dyn HookHandler>
where
    F: Fn(&HookContext<'_>, Payload) -> Result<Payload, HookError> + Send + Sync + 'static,
{
    Arc::new(FnHandler(transform))
}

/// A named bundle of hook handlers.
pub trait Extension: Send + Sync {
    fn name(&self) -> &'static str;

    fn hooks(&self) -> Vec<(HookName, Arc<dyn HookHandler>)>;
}
