use std::sync::Arc;

use async_trait::async_trait;
use fleetd_domain::DockCommand;

use crate::errors::{CoreError, CoreResult, GameApiError};
use crate::mediator::CommandHandler;
use crate::st_client::StClientTrait;

pub struct DockCommandHandler {
    client: Arc<dyn StClientTrait>,
}

impl DockCommandHandler {
    pub fn new(client: Arc<dyn StClientTrait>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandHandler<DockCommand> for DockCommandHandler {
    async fn handle(&self, command: DockCommand) -> CoreResult<()> {
        self.client
            .dock_ship(command.ship_symbol.clone())
            .await
            .map_err(|e| CoreError::RemoteApi(GameApiError::Other(e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use fleetd_domain::fixtures::dock_response;
    use fleetd_domain::ShipSymbol;

    use super::*;
    use crate::st_client::MockStClientTrait;

    #[tokio::test]
    async fn handle_docks_the_named_ship() {
        let mut mock = MockStClientTrait::new();
        mock.expect_dock_ship().withf(|s| s.0 == "SHIP-1").returning(|_| Ok(dock_response("X1", "X1-A1")));

        let handler = DockCommandHandler::new(Arc::new(mock));
        handler.handle(DockCommand { ship_symbol: ShipSymbol("SHIP-1".to_string()) }).await.unwrap();
    }

    #[tokio::test]
    async fn handle_wraps_a_client_error_as_remote_api() {
        let mut mock = MockStClientTrait::new();
        mock.expect_dock_ship().returning(|_| Err(anyhow::anyhow!("request failed: 409 Conflict")));

        let handler = DockCommandHandler::new(Arc::new(mock));
        let err = handler.handle(DockCommand { ship_symbol: ShipSymbol("SHIP-1".to_string()) }).await.unwrap_err();

        assert!(matches!(err, CoreError::RemoteApi(GameApiError::Other(_))));
    }
}
