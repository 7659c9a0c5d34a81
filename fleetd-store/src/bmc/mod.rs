use crate::bmc::assignment_bmc::{DbShipAssignmentBmc, InMemoryShipAssignmentBmc, ShipAssignmentBmcTrait};
use crate::bmc::container_bmc::{ContainerBmcTrait, DbContainerBmc, InMemoryContainerBmc};
use crate::bmc::contract_bmc::{ContractBmcTrait, DbContractBmc, InMemoryContractBmc};
use crate::bmc::graph_bmc::{DbGraphBmc, GraphBmcTrait, InMemoryGraphBmc};
use crate::bmc::market_bmc::{DbMarketBmc, InMemoryMarketBmc, MarketBmcTrait};
use crate::shipyard_bmc::{DbShipyardBmc, InMemoryShipyardBmc, ShipyardBmcTrait};
use crate::DbModelManager;
use mockall::automock;
use std::fmt::Debug;
use std::sync::Arc;

pub mod assignment_bmc;
pub mod container_bmc;
pub mod contract_bmc;
pub mod graph_bmc;
pub mod market_bmc;

pub use assignment_bmc::*;
pub use container_bmc::*;
pub use contract_bmc::*;
pub use graph_bmc::*;
pub use market_bmc::*;

/// Aggregates every store access point behind one object so callers take a
/// single `Arc<dyn Bmc>` rather than wiring each sub-store by hand.
#[automock]
pub trait Bmc: Send + Sync + Debug {
    fn container_bmc(&self) -> Arc<dyn ContainerBmcTrait>;
    fn assignment_bmc(&self) -> Arc<dyn ShipAssignmentBmcTrait>;
    fn graph_bmc(&self) -> Arc<dyn GraphBmcTrait>;
    fn contract_bmc(&self) -> Arc<dyn ContractBmcTrait>;
    fn shipyard_bmc(&self) -> Arc<dyn ShipyardBmcTrait>;
    fn market_bmc(&self) -> Arc<dyn MarketBmcTrait>;
}

#[derive(Debug, Clone)]
pub struct DbBmc {
    pub db_model_manager: DbModelManager,
    container_bmc: Arc<DbContainerBmc>,
    assignment_bmc: Arc<DbShipAssignmentBmc>,
    graph_bmc: Arc<DbGraphBmc>,
    contract_bmc: Arc<DbContractBmc>,
    shipyard_bmc: Arc<DbShipyardBmc>,
    market_bmc: Arc<DbMarketBmc>,
}

impl DbBmc {
    pub fn new(mm: DbModelManager) -> Self {
        Self {
            db_model_manager: mm.clone(),
            container_bmc: Arc::new(DbContainerBmc { mm: mm.clone() }),
            assignment_bmc: Arc::new(DbShipAssignmentBmc { mm: mm.clone() }),
            graph_bmc: Arc::new(DbGraphBmc { mm: mm.clone() }),
            contract_bmc: Arc::new(DbContractBmc { mm: mm.clone() }),
            shipyard_bmc: Arc::new(DbShipyardBmc { mm: mm.clone() }),
            market_bmc: Arc::new(DbMarketBmc { mm: mm.clone() }),
        }
    }
}

impl Bmc for DbBmc {
    fn container_bmc(&self) -> Arc<dyn ContainerBmcTrait> {
        self.container_bmc.clone() as Arc<dyn ContainerBmcTrait>
    }

    fn assignment_bmc(&self) -> Arc<dyn ShipAssignmentBmcTrait> {
        self.assignment_bmc.clone() as Arc<dyn ShipAssignmentBmcTrait>
    }

    fn graph_bmc(&self) -> Arc<dyn GraphBmcTrait> {
        self.graph_bmc.clone() as Arc<dyn GraphBmcTrait>
    }

    fn contract_bmc(&self) -> Arc<dyn ContractBmcTrait> {
        self.contract_bmc.clone() as Arc<dyn ContractBmcTrait>
    }

    fn shipyard_bmc(&self) -> Arc<dyn ShipyardBmcTrait> {
        self.shipyard_bmc.clone() as Arc<dyn ShipyardBmcTrait>
    }

    fn market_bmc(&self) -> Arc<dyn MarketBmcTrait> {
        self.market_bmc.clone() as Arc<dyn MarketBmcTrait>
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBmc {
    pub in_mem_container_bmc: Arc<InMemoryContainerBmc>,
    pub in_mem_assignment_bmc: Arc<InMemoryShipAssignmentBmc>,
    pub in_mem_graph_bmc: Arc<InMemoryGraphBmc>,
    pub in_mem_contract_bmc: Arc<InMemoryContractBmc>,
    pub in_mem_shipyard_bmc: Arc<InMemoryShipyardBmc>,
    pub in_mem_market_bmc: Arc<InMemoryMarketBmc>,
}

impl InMemoryBmc {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Bmc for InMemoryBmc {
    fn container_bmc(&self) -> Arc<dyn ContainerBmcTrait> {
        self.in_mem_container_bmc.clone() as Arc<dyn ContainerBmcTrait>
    }

    fn assignment_bmc(&self) -> Arc<dyn ShipAssignmentBmcTrait> {
        self.in_mem_assignment_bmc.clone() as Arc<dyn ShipAssignmentBmcTrait>
    }

    fn graph_bmc(&self) -> Arc<dyn GraphBmcTrait> {
        self.in_mem_graph_bmc.clone() as Arc<dyn GraphBmcTrait>
    }

    fn contract_bmc(&self) -> Arc<dyn ContractBmcTrait> {
        self.in_mem_contract_bmc.clone() as Arc<dyn ContractBmcTrait>
    }

    fn shipyard_bmc(&self) -> Arc<dyn ShipyardBmcTrait> {
        self.in_mem_shipyard_bmc.clone() as Arc<dyn ShipyardBmcTrait>
    }

    fn market_bmc(&self) -> Arc<dyn MarketBmcTrait> {
        self.in_mem_market_bmc.clone() as Arc<dyn MarketBmcTrait>
    }
}
