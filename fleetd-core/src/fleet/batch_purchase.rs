use std::sync::Arc;

use async_trait::async_trait;
use fleetd_domain::{BatchPurchaseShipCommand, ShipType};
use fleetd_store::{Bmc, Ctx};
use tracing::info;

use crate::errors::{CoreError, CoreResult, GameApiError};
use crate::mediator::CommandHandler;
use crate::st_client::StClientTrait;

fn remote(e: anyhow::Error) -> CoreError {
    CoreError::RemoteApi(GameApiError::Other(e))
}

fn parse_ship_type(raw: &str) -> CoreResult<ShipType> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).map_err(|e| CoreError::Validation(format!("unknown ship type {raw}: {e}")))
}

/// Loops `count` purchases of one ship type from one shipyard (§4.7
/// supplement). Stops early, without failing the container, the moment
/// credits run short or the shipyard stops listing the type — grounded on
/// how `batch_contract` tolerates a single failed iteration.
pub struct BatchPurchaseShipCommandHandler {
    client: Arc<dyn StClientTrait>,
    bmc: Arc<dyn Bmc>,
}

impl BatchPurchaseShipCommandHandler {
    pub fn new(client: Arc<dyn StClientTrait>, bmc: Arc<dyn Bmc>) -> Self {
        Self { client, bmc }
    }
}

#[async_trait]
impl CommandHandler<BatchPurchaseShipCommand> for BatchPurchaseShipCommandHandler {
    async fn handle(&self, command: BatchPurchaseShipCommand) -> CoreResult<u32> {
        let ship_type = parse_ship_type(&command.ship_type)?;

        let mut purchased = 0u32;
        for _ in 0..command.count {
            let shipyard = self.client.get_shipyard(command.shipyard_waypoint.clone()).await.map_err(remote)?.data;
            self.bmc.shipyard_bmc().save_shipyard_data(&Ctx::Anonymous, shipyard.clone()).await?;

            let Some(ships) = &shipyard.ships else {
                return Err(CoreError::Validation("shipyard does not publish detailed prices".into()));
            };
            let Some(listing) = ships.iter().find(|s| s.r#type == ship_type) else {
                info!(purchased, "shipyard no longer lists this ship type, stopping");
                break;
            };

            let agent = self.client.get_agent().await.map_err(remote)?.data;
            if agent.credits < listing.purchase_price as i64 {
                info!(purchased, credits = agent.credits, price = listing.purchase_price, "insufficient credits for next purchase, stopping");
                break;
            }

            self.client.purchase_ship(ship_type, command.shipyard_waypoint.clone()).await.map_err(remote)?;
            purchased += 1;
            info!(purchased, requested = command.count, "purchased ship");
        }

        Ok(purchased)
    }
}

#[cfg(test)]
mod test {
    use fleetd_domain::fixtures::shipyard_with_listing;
    use fleetd_domain::{Agent, AgentResponse, AgentSymbol, Data, FactionSymbol, PurchaseShipResponseBody, ShipPurchaseTransaction, ShipSymbol, ShipType, WaypointSymbol};
    use fleetd_store::InMemoryBmc;

    use super::*;
    use crate::st_client::MockStClientTrait;

    fn agent_with_credits(credits: i64) -> AgentResponse {
        AgentResponse { data: Agent { account_id: None, symbol: AgentSymbol("AGENT".to_string()), headquarters: WaypointSymbol("X1-A1".to_string()), credits, starting_faction: FactionSymbol::COSMIC, ship_count: 1 } }
    }

    #[tokio::test]
    async fn purchases_up_to_the_requested_count() {
        let mut mock = MockStClientTrait::new();
        mock.expect_get_shipyard().returning(|_| Ok(Data { data: shipyard_with_listing("X1-A1", ShipType::SHIP_PROBE, 10_000) }));
        mock.expect_get_agent().returning(|| Ok(agent_with_credits(1_000_000)));
        mock.expect_purchase_ship().returning(|ship_type, waypoint| {
            Ok(Data {
                data: PurchaseShipResponseBody {
                    ship: fleetd_domain::fixtures::ship_at("NEW-1", "X1", &waypoint.0, 100),
                    transaction: ShipPurchaseTransaction {
                        ship_symbol: ShipSymbol("NEW-1".to_string()),
                        ship_type,
                        waypoint_symbol: waypoint,
                        agent_symbol: AgentSymbol("AGENT".to_string()),
                        price: 10_000,
                        timestamp: chrono::Utc::now(),
                    },
                    agent: agent_with_credits(990_000).data,
                },
            })
        });

        let bmc: Arc<dyn Bmc> = Arc::new(InMemoryBmc::new());
        let handler = BatchPurchaseShipCommandHandler::new(Arc::new(mock), bmc);

        let purchased = handler
            .handle(BatchPurchaseShipCommand { shipyard_waypoint: WaypointSymbol("X1-A1".to_string()), ship_type: "SHIP_PROBE".to_string(), count: 3 })
            .await
            .unwrap();

        assert_eq!(purchased, 3);
    }

    #[tokio::test]
    async fn stops_early_when_credits_run_out() {
        let mut mock = MockStClientTrait::new();
        mock.expect_get_shipyard().returning(|_| Ok(Data { data: shipyard_with_listing("X1-A1", ShipType::SHIP_PROBE, 10_000) }));
        mock.expect_get_agent().returning(|| Ok(agent_with_credits(5_000)));

        let bmc: Arc<dyn Bmc> = Arc::new(InMemoryBmc::new());
        let handler = BatchPurchaseShipCommandHandler::new(Arc::new(mock), bmc);

        let purchased = handler
            .handle(BatchPurchaseShipCommand { shipyard_waypoint: WaypointSymbol("X1-A1".to_string()), ship_type: "SHIP_PROBE".to_string(), count: 3 })
            .await
            .unwrap();

        assert_eq!(purchased, 0);
    }

    #[tokio::test]
    async fn rejects_an_unknown_ship_type_before_calling_the_client() {
        let mock = MockStClientTrait::new();
        let bmc: Arc<dyn Bmc> = Arc::new(InMemoryBmc::new());
        let handler = BatchPurchaseShipCommandHandler::new(Arc::new(mock), bmc);

        let err = handler
            .handle(BatchPurchaseShipCommand { shipyard_waypoint: WaypointSymbol("X1-A1".to_string()), ship_type: "NOT_A_SHIP".to_string(), count: 1 })
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Validation(_)));
    }
}
