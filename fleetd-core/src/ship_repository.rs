use std::sync::Arc;

use fleetd_domain::{Ship, ShipSymbol};

use crate::pagination::{fetch_all_pages, PaginationInput};
use crate::st_client::StClientTrait;

/// Thin wrapper over the game API for ship lookups. Deliberately does not
/// cache: a ship's position, fuel, and cargo change on every command the
/// fleet runs, so a cached copy would be stale before the next caller read
/// it. Every call here is a live round-trip.
pub struct ShipRepository {
    client: Arc<dyn StClientTrait>,
}

impl ShipRepository {
    pub fn new(client: Arc<dyn StClientTrait>) -> Self {
        Self { client }
    }

    pub async fn find_by_symbol(&self, ship_symbol: &ShipSymbol) -> anyhow::Result<Option<Ship>> {
        match self.client.get_ship(ship_symbol.clone()).await {
            Ok(data) => Ok(Some(data.data)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn find_all(&self) -> anyhow::Result<Vec<Ship>> {
        let client = self.client.clone();
        fetch_all_pages(move |pagination: PaginationInput| {
            let client = client.clone();
            async move { client.list_ships(pagination).await }
        })
        .await
    }
}

fn is_not_found(e: &anyhow::Error) -> bool {
    e.to_string().contains("404")
}

#[cfg(test)]
mod test {
    use anyhow::anyhow;
    use fleetd_domain::fixtures::ship_at;

    use super::*;
    use crate::st_client::MockStClientTrait;

    #[tokio::test]
    async fn find_by_symbol_returns_the_ship_on_success() {
        let mut mock = MockStClientTrait::new();
        mock.expect_get_ship()
            .withf(|s| s.0 == "SHIP-1")
            .returning(|s| Ok(fleetd_domain::Data { data: ship_at(&s.0, "X1", "X1-A1", 100) }));

        let repository = ShipRepository::new(Arc::new(mock));
        let ship = repository.find_by_symbol(&ShipSymbol("SHIP-1".to_string())).await.unwrap();

        assert_eq!(ship.unwrap().symbol, ShipSymbol("SHIP-1".to_string()));
    }

    #[tokio::test]
    async fn find_by_symbol_returns_none_on_a_404() {
        let mut mock = MockStClientTrait::new();
        mock.expect_get_ship().returning(|_| Err(anyhow!("request failed: 404 Not Found")));

        let repository = ShipRepository::new(Arc::new(mock));
        let ship = repository.find_by_symbol(&ShipSymbol("SHIP-1".to_string())).await.unwrap();

        assert!(ship.is_none());
    }

    #[tokio::test]
    async fn find_by_symbol_propagates_other_errors() {
        let mut mock = MockStClientTrait::new();
        mock.expect_get_ship().returning(|_| Err(anyhow!("request failed: 500 Internal Server Error")));

        let repository = ShipRepository::new(Arc::new(mock));
        let err = repository.find_by_symbol(&ShipSymbol("SHIP-1".to_string())).await.unwrap_err();

        assert!(err.to_string().contains("500"));
    }
}
