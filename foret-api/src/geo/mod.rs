//! Requêtes spatiales PostGIS
//!
//! Producteurs MVT (forêt, limites administratives, cadastre) et analyse de
//! polygone. Toutes les requêtes passent par le pool de connexions ; les
//! tuples sont liés en paramètres positionnels.

pub mod admin;
pub mod analyse;
pub mod cadastre;
pub mod foret;
pub mod pool;

pub use analyse::{PolygonStats, SpeciesRow, TfvRow};
pub use pool::create_pool;

use deadpool_postgres::{Object, Pool};

use crate::error::ApiError;

/// Accès aux requêtes spatiales, partagé par tous les handlers
#[derive(Clone)]
pub struct Queries {
    pool: Pool,
}

impl Queries {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Emprunte une connexion au pool
    pub(crate) async fn client(&self) -> Result<Object, ApiError> {
        Ok(self.pool.get().await?)
    }
}
