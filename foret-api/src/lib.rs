//! # foret-api
//!
//! Service de tuiles et d'analyses entre un visualiseur cartographique et
//! une base PostGIS : tuiles MVT (BD Forêt, limites administratives,
//! cadastre) avec cache Redis à deux niveaux, analyse de polygone contre la
//! couche forêt, et pipeline LiDAR HD de hauteur de canopée (CHM).
//!
//! ## Features
//!
//! - Cache de tuiles single-flight avec entrées négatives (tuile vide ⇒ 204)
//! - Requêtes MVT PostGIS paramétrées, allow-list des couches administratives
//! - Analyse de polygone : résumé, ventilation TFV normalisée, essences
//! - Pipeline LiDAR : index WFS, téléchargement parallèle avec cache disque,
//!   décodage GeoTIFF autonome, CHM = MNS − MNT, rendu PNG

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod geo;
pub mod lidar;
pub mod server;
pub mod tiles;

pub use config::Config;
pub use error::ApiError;
pub use geo::Queries;
pub use server::AppState;
