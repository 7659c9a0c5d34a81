use std::sync::Arc;

use fleetd_store::{Bmc, DbBmc, DbModelManager};
use sqlx::{Pool, Postgres};

use crate::configuration::DaemonConfig;
use crate::container::manager::ContainerManager;
use crate::fleet::{
    BatchContractCommandHandler, BatchPurchaseShipCommandHandler, DockCommandHandler, NavigateCommandHandler, ScoutMarketsCommandHandler, ScoutTourCommandHandler,
};
use crate::graph_provider::GraphProvider;
use crate::mediator::Mediator;
use crate::reqwest_helpers::create_client;
use crate::ship_repository::ShipRepository;
use crate::st_client::{StClient, StClientTrait};

/// Everything the daemon needs, built once at startup and handed to the IPC
/// layer. Constructing a `Root` wires every fleet command handler into a
/// single `Mediator` (§3: the mediator owns the full set of registrations,
/// there is no per-request wiring).
pub struct Root {
    pub bmc: Arc<dyn Bmc>,
    pub mediator: Arc<Mediator>,
    pub client: Arc<dyn StClientTrait>,
    pub graph_provider: Arc<GraphProvider>,
    pub ship_repository: Arc<ShipRepository>,
    pub container_manager: Arc<ContainerManager>,
}

impl Root {
    pub fn build(config: &DaemonConfig, pool: Pool<Postgres>) -> Self {
        let bmc: Arc<dyn Bmc> = Arc::new(DbBmc::new(DbModelManager::new(pool)));

        let http_client = create_client(Some(config.spacetraders_account_token.clone()), None);
        let client: Arc<dyn StClientTrait> =
            Arc::new(StClient::try_with_base_url(http_client, &config.spacetraders_api_base_url).expect("spacetraders_api_base_url must be a valid url"));

        let graph_provider = Arc::new(GraphProvider::new(bmc.clone(), client.clone()));
        let ship_repository = Arc::new(ShipRepository::new(client.clone()));

        let mediator = Arc::new(Mediator::new());
        mediator.register_validated("navigate", NavigateCommandHandler::new(client.clone(), ship_repository.clone(), graph_provider.clone()));
        mediator.register("dock", DockCommandHandler::new(client.clone()));
        mediator.register_validated("scout_tour", ScoutTourCommandHandler::new(client.clone(), ship_repository.clone(), graph_provider.clone(), bmc.clone()));
        mediator.register("batch_contract", BatchContractCommandHandler::new(client.clone(), ship_repository.clone(), graph_provider.clone(), bmc.clone()));
        mediator.register_validated("batch_purchase_ship", BatchPurchaseShipCommandHandler::new(client.clone(), bmc.clone()));

        let container_manager = Arc::new(ContainerManager::new(bmc.clone(), mediator.clone(), ship_repository.clone()));

        // scout_markets deploys containers through the manager that shares
        // this same mediator, so it can only be registered once the manager
        // exists; `Mediator::register*` takes `&self` for exactly this.
        mediator.register_validated(
            "scout_markets",
            ScoutMarketsCommandHandler::new(bmc.clone(), ship_repository.clone(), graph_provider.clone(), container_manager.clone()),
        );

        Self { bmc, mediator, client, graph_provider, ship_repository, container_manager }
    }
}
