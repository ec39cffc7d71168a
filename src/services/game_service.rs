use async_trait::async_trait;

use crate::errors::Result;
use crate::models::Game;
use crate::services::ApiClient;

/// Catalog lookup port. The tracker and lifecycle controller only ever need
/// a game's display fields, so the surface is a single read.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn get_game_by_id(&self, game_id: i64) -> Result<Game>;
}

#[derive(Clone)]
pub struct GameService {
    api: ApiClient,
}

impl GameService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl CatalogSource for GameService {
    async fn get_game_by_id(&self, game_id: i64) -> Result<Game> {
        self.api.get(&format!("games/{}", game_id)).await
    }
}
