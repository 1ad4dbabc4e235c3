//! Configuration du service
//!
//! Tout vient des variables d'environnement (un `.env` est chargé au
//! démarrage), avec des défauts pour un poste de développement.

use std::path::PathBuf;

/// Configuration de la base PostgreSQL/PostGIS
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    pub pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            dbname: "foret".into(),
            user: "postgres".into(),
            password: None,
            pool_size: 20,
        }
    }
}

impl DatabaseConfig {
    /// Charge la configuration depuis les variables d'environnement
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".into()),
            port: std::env::var("POSTGRES_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("POSTGRES_DB").unwrap_or_else(|_| "foret".into()),
            user: std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".into()),
            password: std::env::var("POSTGRES_PASSWORD").ok(),
            pool_size: std::env::var("POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
        }
    }
}

/// Configuration principale du service
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,

    pub redis_host: String,
    pub redis_port: u16,

    /// Port d'écoute HTTP
    pub backend_port: u16,

    /// Origine autorisée par le CORS
    pub cors_origin: String,

    /// Capacité du niveau mémoire du cache de tuiles (0 pour le désactiver)
    pub tile_memory_capacity: usize,

    /// URL de base du flux WFS d'index des dalles LiDAR HD
    pub wfs_base_url: String,

    /// Répertoire du cache disque (dalles brutes + PNG CHM)
    pub lidar_cache_dir: PathBuf,

    /// Plafond de dalles par requête d'analyse
    pub lidar_max_tiles: usize,

    /// Applique l'heuristique Lambert-93 quand l'EPSG d'une dalle est absent
    pub lidar_assume_lambert93: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            redis_host: "localhost".into(),
            redis_port: 6379,
            backend_port: 8080,
            cors_origin: "http://localhost:3000".into(),
            tile_memory_capacity: 256,
            wfs_base_url: "https://data.geopf.fr/wfs/ows".into(),
            lidar_cache_dir: PathBuf::from("/tmp/lidar-cache"),
            lidar_max_tiles: 25,
            lidar_assume_lambert93: true,
        }
    }
}

impl Config {
    /// Charge la configuration depuis les variables d'environnement
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database: DatabaseConfig::from_env(),
            redis_host: std::env::var("REDIS_HOST").unwrap_or(defaults.redis_host),
            redis_port: std::env::var("REDIS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.redis_port),
            backend_port: std::env::var("BACKEND_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.backend_port),
            cors_origin: std::env::var("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            tile_memory_capacity: std::env::var("TILE_MEMORY_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.tile_memory_capacity),
            wfs_base_url: std::env::var("WFS_BASE_URL").unwrap_or(defaults.wfs_base_url),
            lidar_cache_dir: std::env::var("LIDAR_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.lidar_cache_dir),
            lidar_max_tiles: std::env::var("LIDAR_MAX_TILES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.lidar_max_tiles),
            lidar_assume_lambert93: std::env::var("LIDAR_ASSUME_LAMBERT93")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.lidar_assume_lambert93),
        }
    }

    /// URL de connexion Redis
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.redis_host, self.redis_port)
    }
}
