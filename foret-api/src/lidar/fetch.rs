//! Téléchargement des dalles raster avec cache disque
//!
//! Chaque dalle est demandée au service WMS en GeoTIFF natif, écrite dans le
//! cache disque sous son nom de téléchargement (unique par dalle), puis
//! décodée. Une dalle déjà en cache est décodée directement.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geotiff_lite::Raster;
use tracing::{debug, warn};
use url::Url;

use crate::error::ApiError;

use super::wfs::WfsTile;

/// Construit l'URL de téléchargement GeoTIFF depuis l'URL WMS de l'index.
///
/// L'index fournit une requête GetMap ; on force le format GeoTIFF et on
/// recale BBOX/WIDTH/HEIGHT/CRS depuis les métadonnées de la dalle.
pub fn build_download_url(tile: &WfsTile) -> Option<String> {
    if tile.url.is_empty() {
        return None;
    }
    let Ok(mut url) = Url::parse(&tile.url) else {
        return Some(tile.url.clone());
    };

    let mut params: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
    params.insert("FORMAT".into(), "image/geotiff".into());
    params.insert("REQUEST".into(), "GetMap".into());
    params.insert("SERVICE".into(), "WMS".into());
    params.insert("VERSION".into(), "1.3.0".into());

    if !tile.bbox.is_empty() {
        params.insert("BBOX".into(), tile.bbox.clone());
    }
    if tile.width > 0 {
        params.insert("WIDTH".into(), tile.width.to_string());
    }
    if tile.height > 0 {
        params.insert("HEIGHT".into(), tile.height.to_string());
    }
    if !tile.projection.is_empty() {
        params.insert("CRS".into(), tile.projection.clone());
    }

    url.query_pairs_mut().clear().extend_pairs(params.iter());
    Some(url.to_string())
}

/// Chemin de la dalle dans le cache disque
pub fn cache_path(cache_dir: &Path, tile: &WfsTile) -> PathBuf {
    cache_dir.join(&tile.name_download)
}

/// Télécharge (ou relit du cache) puis décode une dalle.
pub async fn download_and_decode(
    http: &reqwest::Client,
    cache_dir: &Path,
    tile: &WfsTile,
) -> Result<Raster, ApiError> {
    let path = cache_path(cache_dir, tile);

    if let Ok(data) = tokio::fs::read(&path).await {
        debug!(tile = %tile.name, "raster tile served from disk cache");
        return decode(&data, tile);
    }

    let download_url = build_download_url(tile).ok_or_else(|| {
        ApiError::upstream(format!("could not construct download URL for tile {}", tile.name))
    })?;

    let resp = http
        .get(&download_url)
        .send()
        .await
        .map_err(|e| ApiError::upstream(format!("downloading tile {}: {e}", tile.name_download)))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(ApiError::upstream(format!(
            "tile download returned {status} for {}",
            tile.name_download
        )));
    }

    let data = resp
        .bytes()
        .await
        .map_err(|e| ApiError::upstream(format!("reading tile data: {e}")))?;

    // Les noms de dalles sont uniques : deux écrivains concurrents du même
    // fichier seraient inoffensifs, juste redondants
    if let Err(e) = tokio::fs::write(&path, &data).await {
        warn!(error = %e, path = %path.display(), "failed to cache raster tile");
    }

    decode(&data, tile)
}

fn decode(data: &[u8], tile: &WfsTile) -> Result<Raster, ApiError> {
    geotiff_lite::decode(data)
        .map_err(|e| ApiError::upstream(format!("decoding tile {}: {e}", tile.name_download)))
}
