//! Pipeline d'analyse LiDAR HD : hauteur de canopée sur un polygone
//!
//! Étapes : emprise du polygone → index WFS des dalles MNS/MNT →
//! appariement par position de grille → téléchargement/décodage parallèle →
//! CHM par paire → statistiques de mosaïque → rendu PNG → emprise WGS84.
//!
//! Les tâches de téléchargement vivent dans le `JoinSet` de la requête :
//! si la requête est annulée ou qu'une dalle échoue, le JoinSet est lâché et
//! toutes les tâches sœurs s'arrêtent.

pub mod bounds;
pub mod chm;
pub mod fetch;
pub mod render;
pub mod wfs;

pub use render::ChmImageStore;

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use geotiff_lite::Raster;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ApiError;

/// Résultat d'une analyse LiDAR
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LidarResult {
    pub has_coverage: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub min_height: f64,
    pub max_height: f64,
    pub mean_height: f64,
    pub median_height: f64,
    /// Identifiant du PNG d'overlay, servi par `/lidar/chm/:id`
    pub chm_image_id: String,
    /// Emprise `[ouest, sud, est, nord]` en EPSG:4326
    pub bounds: [f64; 4],
}

impl LidarResult {
    fn without_coverage(message: impl Into<String>) -> Self {
        Self {
            has_coverage: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    fn with_coverage_but(message: impl Into<String>) -> Self {
        Self {
            has_coverage: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Service d'analyse LiDAR, partagé par les requêtes
pub struct LidarService {
    http: reqwest::Client,
    wfs_base_url: String,
    cache_dir: PathBuf,
    max_tiles: usize,
    assume_lambert93: bool,
    images: ChmImageStore,
}

impl LidarService {
    pub fn new(config: &Config, images: ChmImageStore) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("foret-api/0.1")
            .build()
            .context("Failed to build LiDAR HTTP client")?;

        Ok(Self {
            http,
            wfs_base_url: config.wfs_base_url.clone(),
            cache_dir: config.lidar_cache_dir.clone(),
            max_tiles: config.lidar_max_tiles,
            assume_lambert93: config.lidar_assume_lambert93,
            images,
        })
    }

    /// Analyse la canopée sur le polygone GeoJSON (EPSG:4326).
    pub async fn analyze(&self, geojson: &str) -> Result<LidarResult, ApiError> {
        let polygon_bbox = bounds::geojson_bbox(geojson)?;

        // Index des dalles MNS sur l'emprise
        let mns_tiles = wfs::query_tiles(
            &self.http,
            &self.wfs_base_url,
            wfs::MNS_LAYER,
            polygon_bbox,
            self.max_tiles + 5,
        )
        .await?;

        if mns_tiles.is_empty() {
            return Ok(LidarResult::without_coverage(
                "No LIDAR HD coverage available for this area. LIDAR HD data is being \
                 progressively published by IGN and does not yet cover all of France.",
            ));
        }
        if mns_tiles.len() > self.max_tiles {
            return Ok(LidarResult::without_coverage(format!(
                "Area too large: {} LIDAR tiles required (max {}). Please draw a smaller polygon.",
                mns_tiles.len(),
                self.max_tiles
            )));
        }

        // Dalles MNT correspondantes
        let mnt_tiles = wfs::query_tiles(
            &self.http,
            &self.wfs_base_url,
            wfs::MNT_LAYER,
            polygon_bbox,
            self.max_tiles + 5,
        )
        .await?;

        let pairs = wfs::match_tile_pairs(mns_tiles, mnt_tiles);
        if pairs.is_empty() {
            return Ok(LidarResult::without_coverage(
                "LIDAR HD MNS tiles found but matching MNT tiles are missing.",
            ));
        }

        info!(pairs = pairs.len(), "fetching LiDAR MNS/MNT tile pairs");
        if let Err(e) = tokio::fs::create_dir_all(&self.cache_dir).await {
            warn!(error = %e, "failed to create LiDAR cache dir");
        }

        let (mns_rasters, mnt_rasters) = self.fetch_pairs(&pairs).await?;

        // CHM par paire ; les valeurs exploitables de toutes les paires
        // alimentent un seul vecteur de travail
        let mut all_values = Vec::new();
        let mut merged_bbox: Option<[f64; 4]> = None;
        let mut first_chm: Option<Raster> = None;

        for (mns, mnt) in mns_rasters.iter().zip(&mnt_rasters) {
            let pair_chm = chm::compute_chm(mns, mnt);
            chm::collect_valid(&pair_chm, &mut all_values);

            merged_bbox = Some(match merged_bbox {
                None => pair_chm.bbox,
                Some(b) => [
                    b[0].min(pair_chm.bbox[0]),
                    b[1].min(pair_chm.bbox[1]),
                    b[2].max(pair_chm.bbox[2]),
                    b[3].max(pair_chm.bbox[3]),
                ],
            });
            if first_chm.is_none() {
                first_chm = Some(pair_chm);
            }
        }

        let native_epsg = mns_rasters[0].epsg;
        // Les rasters sources ne servent plus : libérer avant le rendu
        drop(mns_rasters);
        drop(mnt_rasters);

        if all_values.is_empty() {
            return Ok(LidarResult::with_coverage_but(
                "LIDAR tiles found but all values are NoData in this area.",
            ));
        }

        let Some(stats) = chm::canopy_stats(&all_values) else {
            return Ok(LidarResult::with_coverage_but(
                "LIDAR tiles found but no canopy height detected in this area.",
            ));
        };
        drop(all_values);

        // Rendu de la première paire uniquement ; les statistiques restent
        // calculées sur la mosaïque entière
        let image_id = new_image_id();
        let first_chm = first_chm.ok_or_else(|| ApiError::upstream("no CHM raster"))?;
        let png = render::render_chm_png(&first_chm, stats.max)?;
        self.images.put(&image_id, &png).await?;

        // Emprise WGS84, avec repli sur l'emprise du polygone
        let merged_bbox = merged_bbox.unwrap_or(polygon_bbox);
        let mut wgs84_bounds =
            bounds::estimate_wgs84_bounds(merged_bbox, native_epsg, self.assume_lambert93);
        if !bounds::is_valid_wgs84(&wgs84_bounds) {
            wgs84_bounds = polygon_bbox;
        }

        Ok(LidarResult {
            has_coverage: true,
            message: None,
            min_height: stats.min,
            max_height: stats.max,
            mean_height: stats.mean,
            median_height: stats.median,
            chm_image_id: image_id,
            bounds: wgs84_bounds,
        })
    }

    /// Télécharge et décode toutes les paires en parallèle.
    ///
    /// La première erreur est remontée ; lâcher le `JoinSet` interrompt les
    /// téléchargements restants.
    async fn fetch_pairs(
        &self,
        pairs: &[(wfs::WfsTile, wfs::WfsTile)],
    ) -> Result<(Vec<Raster>, Vec<Raster>), ApiError> {
        let n = pairs.len();
        let mut set: JoinSet<(usize, bool, Result<Raster, ApiError>)> = JoinSet::new();

        for (idx, (mns_tile, mnt_tile)) in pairs.iter().enumerate() {
            for (is_mns, tile) in [(true, mns_tile.clone()), (false, mnt_tile.clone())] {
                let http = self.http.clone();
                let cache_dir = self.cache_dir.clone();
                set.spawn(async move {
                    let result = fetch::download_and_decode(&http, &cache_dir, &tile).await;
                    (idx, is_mns, result)
                });
            }
        }

        let mut mns_rasters: Vec<Option<Raster>> = (0..n).map(|_| None).collect();
        let mut mnt_rasters: Vec<Option<Raster>> = (0..n).map(|_| None).collect();

        while let Some(joined) = set.join_next().await {
            let (idx, is_mns, result) =
                joined.map_err(|e| ApiError::upstream(format!("tile fetch task failed: {e}")))?;
            let raster = result?;
            if is_mns {
                mns_rasters[idx] = Some(raster);
            } else {
                mnt_rasters[idx] = Some(raster);
            }
        }

        let mns: Vec<Raster> = mns_rasters.into_iter().flatten().collect();
        let mnt: Vec<Raster> = mnt_rasters.into_iter().flatten().collect();
        if mns.len() != n || mnt.len() != n {
            return Err(ApiError::upstream("incomplete tile pair download"));
        }
        Ok((mns, mnt))
    }
}

/// Identifiant de contenu dérivé de l'horloge : `chm_<nanos unix>`
fn new_image_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("chm_{nanos}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_image_id_shape() {
        let id = new_image_id();
        assert!(render::valid_image_id(&id));
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = LidarResult {
            has_coverage: true,
            chm_image_id: "chm_1".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"hasCoverage\":true"));
        assert!(json.contains("\"chmImageId\":\"chm_1\""));
        // message absent quand None
        assert!(!json.contains("message"));
    }

    #[test]
    fn test_no_coverage_results() {
        let r = LidarResult::without_coverage("no tiles");
        assert!(!r.has_coverage);
        assert_eq!(r.message.as_deref(), Some("no tiles"));

        let r = LidarResult::with_coverage_but("all nodata");
        assert!(r.has_coverage);
        assert!(r.chm_image_id.is_empty());
    }
}
