//! Index des dalles LiDAR HD via le flux WFS de la Géoplateforme
//!
//! Deux collections sont interrogées : le modèle numérique de surface (MNS)
//! et le modèle numérique de terrain (MNT). Les dalles sont ensuite
//! appariées par leur position de grille, extraite du nom.

use serde::Deserialize;

use crate::error::ApiError;

/// Couche d'index des dalles MNS
pub const MNS_LAYER: &str = "IGNF_MNS-LIDAR-HD:dalle";

/// Couche d'index des dalles MNT
pub const MNT_LAYER: &str = "IGNF_MNT-LIDAR-HD:dalle";

/// Une dalle MNS ou MNT de l'index WFS
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WfsTile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub name_download: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub projection: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub bbox: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: WfsTile,
}

/// Interroge l'index WFS pour une couche et une emprise WGS84.
///
/// `count` plafonne le nombre de features retournées par le serveur.
pub async fn query_tiles(
    http: &reqwest::Client,
    base_url: &str,
    type_name: &str,
    bbox: [f64; 4],
    count: usize,
) -> Result<Vec<WfsTile>, ApiError> {
    let count_param = count.to_string();
    let bbox_param = format!(
        "{:.6},{:.6},{:.6},{:.6},EPSG:4326",
        bbox[0], bbox[1], bbox[2], bbox[3]
    );

    let resp = http
        .get(base_url)
        .query(&[
            ("SERVICE", "WFS"),
            ("VERSION", "2.0.0"),
            ("REQUEST", "GetFeature"),
            ("TYPENAMES", type_name),
            ("OUTPUTFORMAT", "application/json"),
            ("COUNT", count_param.as_str()),
            ("BBOX", bbox_param.as_str()),
        ])
        .send()
        .await
        .map_err(|e| ApiError::upstream(format!("WFS request failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(ApiError::upstream(format!("WFS returned {status}")));
    }

    let fc: FeatureCollection = resp
        .json()
        .await
        .map_err(|e| ApiError::upstream(format!("parsing WFS response: {e}")))?;

    Ok(fc.features.into_iter().map(|f| f.properties).collect())
}

/// Position de grille extraite d'un nom de dalle, par exemple
/// `LHD_FXX_0599_6329_MNS_O_0M50_LAMB93_IGN69` → `0599_6329`.
pub fn grid_key(name: &str) -> Option<String> {
    let parts: Vec<&str> = name.split('_').collect();
    if parts.len() < 5 {
        return None;
    }
    // Motif : LHD_{zone}_{X}_{Y}_{produit}_...
    Some(format!("{}_{}", parts[2], parts[3]))
}

/// Apparie les dalles MNS et MNT par position de grille.
/// Les dalles sans correspondance sont écartées.
pub fn match_tile_pairs(mns: Vec<WfsTile>, mnt: Vec<WfsTile>) -> Vec<(WfsTile, WfsTile)> {
    let mut mnt_by_key = std::collections::HashMap::new();
    for tile in mnt {
        if let Some(key) = grid_key(&tile.name) {
            mnt_by_key.insert(key, tile);
        }
    }

    let mut pairs = Vec::new();
    for tile in mns {
        let Some(key) = grid_key(&tile.name) else {
            continue;
        };
        if let Some(mnt_tile) = mnt_by_key.remove(&key) {
            pairs.push((tile, mnt_tile));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(name: &str) -> WfsTile {
        WfsTile {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_grid_key() {
        assert_eq!(
            grid_key("LHD_FXX_0599_6329_MNS_O_0M50_LAMB93_IGN69"),
            Some("0599_6329".to_string())
        );
        assert_eq!(grid_key("LHD_FXX_0599"), None);
        assert_eq!(grid_key(""), None);
    }

    #[test]
    fn test_match_pairs_by_grid_key() {
        let mns = vec![
            tile("LHD_FXX_0599_6329_MNS_O_0M50_LAMB93_IGN69"),
            tile("LHD_FXX_0600_6329_MNS_O_0M50_LAMB93_IGN69"),
        ];
        let mnt = vec![
            // L'ordre ne compte pas, seule la clé de grille apparie
            tile("LHD_FXX_0600_6329_MNT_O_0M50_LAMB93_IGN69"),
            tile("LHD_FXX_0599_6329_MNT_O_0M50_LAMB93_IGN69"),
        ];

        let pairs = match_tile_pairs(mns, mnt);
        assert_eq!(pairs.len(), 2);
        for (mns_tile, mnt_tile) in &pairs {
            assert_eq!(grid_key(&mns_tile.name), grid_key(&mnt_tile.name));
        }
    }

    #[test]
    fn test_unpaired_tiles_are_dropped() {
        let mns = vec![
            tile("LHD_FXX_0599_6329_MNS_O_0M50_LAMB93_IGN69"),
            tile("LHD_FXX_0601_6330_MNS_O_0M50_LAMB93_IGN69"),
        ];
        let mnt = vec![tile("LHD_FXX_0599_6329_MNT_O_0M50_LAMB93_IGN69")];

        let pairs = match_tile_pairs(mns, mnt);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].0.name.contains("0599_6329"));
    }

    #[test]
    fn test_wfs_feature_collection_shape() {
        let body = r#"{
            "totalFeatures": 1,
            "features": [{
                "properties": {
                    "name": "LHD_FXX_0599_6329_MNS_O_0M50_LAMB93_IGN69",
                    "name_download": "dalle.tif",
                    "url": "https://example.org/wms?LAYERS=mns",
                    "projection": "EPSG:2154",
                    "format": "image/geotiff",
                    "bbox": "599000,6328000,600000,6329000",
                    "width": 2000,
                    "height": 2000
                }
            }]
        }"#;
        let fc: FeatureCollection = serde_json::from_str(body).unwrap();
        assert_eq!(fc.features.len(), 1);
        assert_eq!(fc.features[0].properties.width, 2000);
    }
}
