use tracing::{trace, warn};

use super::{HookContext, HookError, HookName, HookRegistry, Payload};

/// Runs hook chains for one request.
pub struct Dispatcher<'a> {
    registry: &'a HookRegistry,
    context: HookContext<'a>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a HookRegistry, context: HookContext<'a>) -> Self {
        Self { registry, context }
    }

    /// Thread `payload` through every handler of `hook`, one at a time.
    ///
    /// Each handler receives the previous handler's output. The first
    /// failure aborts the chain; handlers that already ran are not undone.
    pub async fn execute(&mut self, hook: HookName, payload: Payload) -> Result<Payload, HookError> {
        let handlers = self.registry.handlers(hook);
        let mut current = payload;
        for (position, handler) in handlers.iter().enumerate() {
            trace!(hook = %hook, position, "running hook handler");
            current = handler
                .call(&mut self.context, current)
                .await
                .inspect_err(|err| {
                    warn!(hook = %hook, position, error = %err, "hook handler failed; chain aborted");
                })?;
        }
        Ok(current)
    }

    /// Like [`Dispatcher::execute`] for a raw name; names outside the
    /// vocabulary have no handlers and pass the payload through.
    pub async fn execute_named(&mut self, name: &str, payload: Payload) -> Result<Payload, HookError> {
        match name.parse::<HookName>() {
            Ok(hook) => self.execute(hook, payload).await,
            Err(_) => Ok(payload),
        }
    }

    /// Typed wrapper: run `hook` over `value` and convert the result back.
    pub async fn run<T>(&mut self, hook: HookName, value: T) -> Result<T, HookError>
    where
        T: Into<Payload> + TryFrom<Payload, Error = HookError>,
    {
        T::try_from(self.execute(hook, value.into()).await?)
    }
}
