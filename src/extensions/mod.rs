//! Compiled-in extensions selectable through `hooks.extensions`.

mod audit;
mod normalize;

use std::sync::Arc;

use crate::application::hooks::Extension;

pub use audit::AuditExtension;
pub use normalize::NormalizeExtension;

/// Every extension the binary ships, by configuration name.
pub fn catalog() -> Vec<Arc<dyn Extension>> {
    vec![Arc::new(NormalizeExtension), Arc::new(AuditExtension)]
}
