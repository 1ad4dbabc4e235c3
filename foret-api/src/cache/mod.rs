//! Cache clé-valeur partagé (Redis) et cache de tuiles
//!
//! Le client Redis est créé au démarrage et partagé par toutes les requêtes
//! de tuiles. Une erreur de lecture est traitée comme un miss ; une erreur
//! d'écriture est journalisée puis avalée.

pub mod tiles;

use anyhow::{Context, Result};
use deadpool_redis::{Config as RedisConfig, Pool, Runtime};

pub use tiles::TileCache;

/// Crée le pool de connexions Redis
pub fn create_redis_pool(url: &str) -> Result<Pool> {
    RedisConfig::from_url(url)
        .create_pool(Some(Runtime::Tokio1))
        .context("Failed to create Redis pool")
}

/// Teste la connexion au cache
pub async fn ping(pool: &Pool) -> Result<()> {
    let mut conn = pool
        .get()
        .await
        .context("Failed to get connection from Redis pool")?;
    let _: String = deadpool_redis::redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .context("Redis ping failed")?;
    Ok(())
}
