use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::HookSettings;

use super::{Extension, HookError, HookHandler, HookName};

/// Hook name to ordered handler list. Immutable once built.
#[derive(Default)]
pub struct HookRegistry {
    handlers: HashMap<HookName, Vec<Arc<dyn HookHandler>>>,
    extensions: Vec<&'static str>,
}

impl HookRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> HookRegistryBuilder {
        HookRegistryBuilder::default()
    }

    /// Resolve the configured extension names against `catalog`, keeping
    /// the configured order.
    pub fn from_config(
        settings: &HookSettings,
        catalog: &[Arc<dyn Extension>],
    ) -> Result<Self, HookError> {
        let mut builder = Self::builder();
        for name in &settings.extensions {
            let extension = catalog
                .iter()
                .find(|candidate| candidate.name() == name.as_str())
                .ok_or_else(|| HookError::UnknownExtension(name.clone()))?;
            builder = builder.extension(extension.as_ref());
        }
        let registry = builder.build();
        info!(
            extensions = ?registry.extensions,
            handlers = registry.handler_count(),
            "hook registry ready"
        );
        Ok(registry)
    }

    /// Handlers for `name` in registration order.
    pub fn handlers(&self, name: HookName) -> &[Arc<dyn HookHandler>] {
        self.handlers.get(&name).map_or(&[], Vec::as_slice)
    }

    pub fn extensions(&self) -> &[&'static str] {
        &self.extensions
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[derive(Default)]
pub struct HookRegistryBuilder {
    registry: HookRegistry,
}

impl HookRegistryBuilder {
    /// Append every handler of `extension` after those already registered.
    pub fn extension(mut self, extension: &dyn Extension) -> Self {
        for (name, handler) in extension.hooks() {
            debug!(extension = extension.name(), hook = %name, "registering hook handler");
            self = self.handler(name, handler);
        }
        self.registry.extensions.push(extension.name());
        self
    }

    pub fn handler(mut self, name: HookName, handler: Arc<dyn HookHandler>) -> Self {
        self.registry
            .handlers
            .entry(name)
            .or_default()
            .push(handler);
        self
    }

    pub fn build(self) -> HookRegistry {
        self.registry
    }
}
