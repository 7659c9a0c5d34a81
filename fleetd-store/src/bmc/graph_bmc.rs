use crate::{db, Ctx, DbModelManager};
use anyhow::*;
use async_trait::async_trait;
use fleetd_domain::{SystemGraph, SystemSymbol};
use mockall::automock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::RwLock;

#[automock]
#[async_trait]
pub trait GraphBmcTrait: Send + Sync + Debug {
    async fn get_graph(&self, ctx: &Ctx, system_symbol: &SystemSymbol) -> Result<Option<SystemGraph>>;
    async fn put_graph(&self, ctx: &Ctx, graph: SystemGraph) -> Result<()>;
}

#[derive(Debug)]
pub struct DbGraphBmc {
    pub(crate) mm: DbModelManager,
}

#[async_trait]
impl GraphBmcTrait for DbGraphBmc {
    async fn get_graph(&self, _ctx: &Ctx, system_symbol: &SystemSymbol) -> Result<Option<SystemGraph>> {
        db::select_system_graph(self.mm.pool(), system_symbol).await
    }

    async fn put_graph(&self, _ctx: &Ctx, graph: SystemGraph) -> Result<()> {
        db::upsert_system_graph(self.mm.pool(), &graph).await
    }
}

#[derive(Debug, Default)]
struct InMemoryGraphs {
    graphs: HashMap<SystemSymbol, SystemGraph>,
}

#[derive(Debug)]
pub struct InMemoryGraphBmc {
    state: Arc<RwLock<InMemoryGraphs>>,
}

impl Default for InMemoryGraphBmc {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGraphBmc {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryGraphs::default())),
        }
    }
}

#[async_trait]
impl GraphBmcTrait for InMemoryGraphBmc {
    async fn get_graph(&self, _ctx: &Ctx, system_symbol: &SystemSymbol) -> Result<Option<SystemGraph>> {
        Ok(self.state.read().await.graphs.get(system_symbol).cloned())
    }

    async fn put_graph(&self, _ctx: &Ctx, graph: SystemGraph) -> Result<()> {
        self.state.write().await.graphs.insert(graph.system_symbol.clone(), graph);
        Ok(())
    }
}
