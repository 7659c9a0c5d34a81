pub mod behaviours;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use fleetd_domain::{Command, Validatable};

use crate::errors::{CoreError, CoreResult};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The handler a concrete command dispatches to. One impl per `Command`
/// type; registered with the mediator at startup.
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    async fn handle(&self, command: C) -> CoreResult<C::Output>;
}

trait ErasedHandler: Send + Sync {
    fn dispatch<'a>(&'a self, command: Box<dyn Any + Send>) -> BoxFuture<'a, CoreResult<Box<dyn Any + Send>>>;
}

struct Adapter<C: Command, H: CommandHandler<C>> {
    handler: H,
    validate: Option<fn(&C) -> Result<(), String>>,
    command_name: &'static str,
}

impl<C, H> ErasedHandler for Adapter<C, H>
where
    C: Command + Debug,
    C::Output: Debug,
    H: CommandHandler<C>,
{
    fn dispatch<'a>(&'a self, command: Box<dyn Any + Send>) -> BoxFuture<'a, CoreResult<Box<dyn Any + Send>>> {
        Box::pin(async move {
            let command = *command.downcast::<C>().map_err(|_| CoreError::Programmer("command downcast mismatch".into()))?;

            let started = behaviours::log_start(self.command_name, &command);

            let result: CoreResult<C::Output> = async {
                if let Some(validate) = self.validate {
                    validate(&command).map_err(CoreError::Validation)?;
                }
                self.handler.handle(command).await
            }
            .await;

            behaviours::log_outcome(self.command_name, started, &result);
            result.map(|output| Box::new(output) as Box<dyn Any + Send>)
        })
    }
}

/// Dispatches commands to their registered handler by concrete type,
/// wrapping every call in logging (outermost) and, for commands that
/// implement `Validatable`, validation (innermost, just before the
/// handler runs).
///
/// Registration takes `&self` rather than `&mut self` so `Root` can hand an
/// `Arc<Mediator>` to a handler (`scout_markets` needs the container
/// manager, which in turn needs the mediator) and keep registering
/// afterwards; the lock never spans an `.await`, since `send` clones the
/// `Arc<dyn ErasedHandler>` out before dispatching.
#[derive(Default)]
pub struct Mediator {
    handlers: RwLock<HashMap<TypeId, Arc<dyn ErasedHandler>>>,
}

impl Mediator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for commands with no invariants of their own.
    pub fn register<C, H>(&self, command_name: &'static str, handler: H)
    where
        C: Command + Debug,
        C::Output: Debug,
        H: CommandHandler<C> + 'static,
    {
        let adapter: Arc<dyn ErasedHandler> = Arc::new(Adapter::<C, H> { handler, validate: None, command_name });
        self.handlers.write().unwrap().insert(TypeId::of::<C>(), adapter);
    }

    /// Registers a handler whose command implements `Validatable`; its
    /// `validate()` runs before `handler.handle()` on every dispatch.
    pub fn register_validated<C, H>(&self, command_name: &'static str, handler: H)
    where
        C: Command + Validatable + Debug,
        C::Output: Debug,
        H: CommandHandler<C> + 'static,
    {
        let adapter: Arc<dyn ErasedHandler> = Arc::new(Adapter::<C, H> { handler, validate: Some(C::validate), command_name });
        self.handlers.write().unwrap().insert(TypeId::of::<C>(), adapter);
    }

    pub async fn send<C>(&self, command: C) -> CoreResult<C::Output>
    where
        C: Command,
    {
        let erased = self
            .handlers
            .read()
            .unwrap()
            .get(&TypeId::of::<C>())
            .cloned()
            .ok_or_else(|| CoreError::Programmer(format!("no handler registered for {:?}", TypeId::of::<C>())))?;

        let boxed = Box::new(command) as Box<dyn Any + Send>;
        let output = erased.dispatch(boxed).await?;
        output
            .downcast::<C::Output>()
            .map(|b| *b)
            .map_err(|_| CoreError::Programmer("handler output downcast mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetd_domain::DockCommand;
    use fleetd_domain::{ScoutMarketsCommand, ShipSymbol, SystemSymbol};

    struct EchoDockHandler;

    #[async_trait]
    impl CommandHandler<DockCommand> for EchoDockHandler {
        async fn handle(&self, _command: DockCommand) -> CoreResult<()> {
            Ok(())
        }
    }

    struct CountingScoutHandler;

    #[async_trait]
    impl CommandHandler<ScoutMarketsCommand> for CountingScoutHandler {
        async fn handle(&self, _command: ScoutMarketsCommand) -> CoreResult<u32> {
            Ok(3)
        }
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let mediator = Mediator::new();
        mediator.register("dock", EchoDockHandler);

        let result = mediator.send(DockCommand { ship_symbol: ShipSymbol("ship-1".into()) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn validation_rejects_bad_command_before_handler_runs() {
        let mediator = Mediator::new();
        mediator.register_validated("scout_markets", CountingScoutHandler);

        let err = mediator
            .send(ScoutMarketsCommand { ship_symbol: ShipSymbol("ship-1".into()), system_symbol: SystemSymbol("".into()) })
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn unregistered_command_is_a_programmer_error() {
        let mediator = Mediator::new();
        let err = mediator.send(DockCommand { ship_symbol: ShipSymbol("ship-1".into()) }).await.unwrap_err();
        assert!(matches!(err, CoreError::Programmer(_)));
    }
}
