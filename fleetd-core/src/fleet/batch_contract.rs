use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fleetd_domain::{BatchContractCommand, Contract, Delivery, MarketData, ShipSymbol, SystemSymbol};
use fleetd_store::{Bmc, Ctx};
use tracing::{info, warn};

use crate::container::cancellation;
use crate::errors::{CoreError, CoreResult, GameApiError};
use crate::fleet::navigate::navigate_to;
use crate::graph_provider::GraphProvider;
use crate::mediator::CommandHandler;
use crate::ship_repository::ShipRepository;
use crate::st_client::StClientTrait;

fn remote(e: anyhow::Error) -> CoreError {
    CoreError::RemoteApi(GameApiError::Other(e))
}

fn cheapest_market_for(markets: &[MarketData], trade_symbol: &fleetd_domain::TradeGoodSymbol) -> Option<(fleetd_domain::WaypointSymbol, i32)> {
    markets
        .iter()
        .filter_map(|m| m.trade_goods.as_ref().map(|goods| (m.symbol.clone(), goods)))
        .filter_map(|(wp, goods)| goods.iter().find(|g| &g.symbol == trade_symbol).map(|g| (wp, g.purchase_price)))
        .min_by_key(|(_, price)| *price)
}

fn next_undelivered(contract: &Contract) -> Option<&Delivery> {
    contract.terms.deliver.iter().find(|d| d.units_fulfilled < d.units_required)
}

pub struct BatchContractCommandHandler {
    client: Arc<dyn StClientTrait>,
    ship_repository: Arc<ShipRepository>,
    graph_provider: Arc<GraphProvider>,
    bmc: Arc<dyn Bmc>,
}

impl BatchContractCommandHandler {
    pub fn new(client: Arc<dyn StClientTrait>, ship_repository: Arc<ShipRepository>, graph_provider: Arc<GraphProvider>, bmc: Arc<dyn Bmc>) -> Self {
        Self { client, ship_repository, graph_provider, bmc }
    }

    /// One negotiate → evaluate → accept → buy → deliver → fulfil pass.
    /// Returns whether the contract ended up fulfilled this pass.
    async fn run_one(&self, ship_symbol: &ShipSymbol, system_symbol: &SystemSymbol, profit_total: &mut i64) -> CoreResult<bool> {
        let ctx = Ctx::Anonymous;

        let mut contract = match self.bmc.contract_bmc().get_youngest_contract(&ctx, system_symbol).await? {
            Some(existing) if !existing.fulfilled => existing,
            _ => match self.client.negotiate_contract(ship_symbol.clone()).await {
                Ok(response) => response.data.contract,
                Err(GameApiError::ContractAlreadyActive) => self
                    .client
                    .list_contracts_page(crate::pagination::PaginationInput { page: 1, limit: 20 })
                    .await
                    .map_err(remote)?
                    .data
                    .into_iter()
                    .find(|c| !c.fulfilled)
                    .ok_or_else(|| CoreError::Validation("agent reports an active contract but none was found".into()))?,
                Err(other) => return Err(CoreError::RemoteApi(other)),
            },
        };

        if !contract.accepted {
            let response = self.client.accept_contract(&contract.id).await.map_err(remote)?;
            contract = response.data.contract;
            *profit_total += contract.terms.payment.on_accepted;
        }
        self.bmc.contract_bmc().upsert_contract(&ctx, system_symbol, contract.clone(), Utc::now()).await?;

        let Some(delivery) = next_undelivered(&contract).cloned() else {
            let response = self.client.fulfill_contract(&contract.id).await.map_err(remote)?;
            *profit_total += contract.terms.payment.on_fulfilled;
            self.bmc.contract_bmc().upsert_contract(&ctx, system_symbol, response.data.contract, Utc::now()).await?;
            return Ok(true);
        };

        let units_needed = delivery.units_required - delivery.units_fulfilled;
        let markets = self.bmc.market_bmc().get_latest_market_data_for_system(&ctx, system_symbol).await?;
        let (buy_at, _price) = cheapest_market_for(&markets, &delivery.trade_symbol)
            .ok_or_else(|| CoreError::Validation(format!("no known market sells {}", delivery.trade_symbol)))?;

        navigate_to(&self.client, &self.ship_repository, &self.graph_provider, ship_symbol, &buy_at).await?;
        self.client.dock_ship(ship_symbol.clone()).await.map_err(remote)?;
        let purchase = self.client.purchase_trade_good(ship_symbol.clone(), units_needed, delivery.trade_symbol.clone()).await.map_err(remote)?;
        *profit_total -= purchase.data.transaction.total_price as i64;

        navigate_to(&self.client, &self.ship_repository, &self.graph_provider, ship_symbol, &delivery.destination_symbol).await?;
        self.client.dock_ship(ship_symbol.clone()).await.map_err(remote)?;
        let delivered = self.client.deliver_contract(&contract.id, ship_symbol.clone(), delivery.trade_symbol.clone(), units_needed).await.map_err(remote)?;
        self.bmc.contract_bmc().upsert_contract(&ctx, system_symbol, delivered.data.contract, Utc::now()).await?;

        Ok(false)
    }
}

#[async_trait]
impl CommandHandler<BatchContractCommand> for BatchContractCommandHandler {
    async fn handle(&self, command: BatchContractCommand) -> CoreResult<u32> {
        let ship = self
            .ship_repository
            .find_by_symbol(&command.ship_symbol)
            .await
            .map_err(remote)?
            .ok_or_else(|| CoreError::Validation(format!("ship {} not found", command.ship_symbol.0)))?;
        let system_symbol = ship.nav.system_symbol.clone();

        let mut fulfilled = 0u32;
        let mut failed = 0u32;
        let mut profit_total: i64 = 0;
        let mut remaining = command.iterations;

        loop {
            if cancellation::is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            if remaining == Some(0) {
                break;
            }

            match self.run_one(&command.ship_symbol, &system_symbol, &mut profit_total).await {
                Ok(true) => fulfilled += 1,
                Ok(false) => {}
                Err(e) => {
                    failed += 1;
                    warn!(ship_symbol = %command.ship_symbol.0, error = %e, "batch contract iteration failed, continuing");
                }
            }

            if let Some(r) = remaining.as_mut() {
                *r -= 1;
            }
        }

        info!(ship_symbol = %command.ship_symbol.0, fulfilled, failed, profit_total, "batch contract run complete");
        Ok(fulfilled)
    }
}
