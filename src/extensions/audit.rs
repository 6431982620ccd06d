//! Audit trail of entity mutations.
//!
//! Each entry is written in the unit of work of the operation it records,
//! so it commits or rolls back together with that operation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::application::entity_manager::Commit;
use crate::application::hooks::{
    Action, Extension, HookContext, HookError, HookHandler, HookName, Payload, Target,
};
use crate::domain::entities::AuditLog;
use crate::domain::schema::Entity;

pub struct AuditExtension;

impl Extension for AuditExtension {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn hooks(&self) -> Vec<(HookName, Arc<dyn HookHandler>)> {
        let mut hooks: Vec<(HookName, Arc<dyn HookHandler>)> = Vec::new();
        for target in Target::ALL {
            for action in Action::ALL.into_iter().filter(|action| action.is_mutation()) {
                let hook = HookName::after(target, action);
                hooks.push((hook, Arc::new(AuditHandler { hook })));
            }
        }
        let hook = HookName::AfterUserRegister;
        hooks.push((hook, Arc::new(AuditHandler { hook })));
        hooks
    }
}

struct AuditHandler {
    hook: HookName,
}

#[async_trait]
impl HookHandler for AuditHandler {
    async fn call(
        &self,
        ctx: &mut HookContext<'_>,
        payload: Payload,
    ) -> Result<Payload, HookError> {
        let actor = match (&payload, ctx.user) {
            (_, Some(user)) => user.id,
            (Payload::User(registered), None) => registered.id,
            _ => None,
        };

        let mut entry = AuditLog::new(actor, self.hook.to_string());
        if let Some((table, id)) = payload.entity_ref() {
            entry.entity_table = Some(table.to_string());
            entry.entity_id = id;
        }
        entry.request_id = Some(ctx.request.request_id.to_string());

        ctx.repository::<AuditLog>()
            .insert(&mut entry, Commit::Deferred)
            .await?;
        trace!(hook = %self.hook, table = AuditLog::TABLE, id = ?entry.id(), "audit entry staged");
        Ok(payload)
    }
}
