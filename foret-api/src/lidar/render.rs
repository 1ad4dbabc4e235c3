//! Rendu PNG du CHM et stockage des overlays
//!
//! Rampe verte → jaune → rouge selon la hauteur de canopée, alpha 180 pour
//! les pixels de données, transparent pour le nodata et le sol. Les PNG sont
//! conservés sur disque sous leur identifiant de contenu.

use std::io::Cursor;
use std::path::PathBuf;

use geotiff_lite::Raster;
use image::{ImageFormat, Rgba, RgbaImage};

use crate::error::ApiError;

/// Échelle de visualisation par défaut quand le max observé est inexploitable
const DEFAULT_SCALE_M: f64 = 30.0;

/// Plafond d'échelle pour garder le contraste sur les très grands arbres
const MAX_SCALE_M: f64 = 50.0;

/// Rend le CHM en PNG RGBA 8 bits à la résolution native du raster.
pub fn render_chm_png(chm: &Raster, max_height: f64) -> Result<Vec<u8>, ApiError> {
    let mut scale = max_height;
    if scale <= 0.0 {
        scale = DEFAULT_SCALE_M;
    }
    if scale > MAX_SCALE_M {
        scale = MAX_SCALE_M;
    }

    let mut img = RgbaImage::new(chm.width as u32, chm.height as u32);

    for y in 0..chm.height {
        for x in 0..chm.width {
            let v = chm.get(x, y);
            if chm.is_nodata(v) || v <= 0.0 {
                img.put_pixel(x as u32, y as u32, Rgba([0, 0, 0, 0]));
                continue;
            }
            img.put_pixel(x as u32, y as u32, ramp(v as f64 / scale));
        }
    }

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| ApiError::upstream(format!("encoding CHM image: {e}")))?;
    Ok(buf.into_inner())
}

/// Rampe verte (bas) → jaune (milieu) → rouge (haut) pour `t ∈ [0, 1]`
fn ramp(t: f64) -> Rgba<u8> {
    let t = t.clamp(0.0, 1.0);
    let (r, g, b) = if t < 0.5 {
        let s = t * 2.0;
        ((s * 255.0) as u8, 200, 50)
    } else {
        let s = (t - 0.5) * 2.0;
        (255, ((1.0 - s) * 200.0) as u8, ((1.0 - s) * 50.0) as u8)
    };
    Rgba([r, g, b, 180])
}

/// Stockage disque des overlays CHM, indexés par identifiant de contenu
#[derive(Debug, Clone)]
pub struct ChmImageStore {
    dir: PathBuf,
}

impl ChmImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.png"))
    }

    /// Écrit un PNG sous son identifiant de contenu.
    pub async fn put(&self, id: &str, png: &[u8]) -> Result<(), ApiError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ApiError::upstream(format!("creating CHM image dir: {e}")))?;
        tokio::fs::write(self.path_for(id), png)
            .await
            .map_err(|e| ApiError::upstream(format!("writing CHM image {id}: {e}")))
    }

    /// Retrouve le chemin du PNG d'un identifiant connu.
    ///
    /// L'identifiant est vérifié (format `chm_<horodatage>`) pour ne jamais
    /// sortir du répertoire de stockage.
    pub async fn get(&self, id: &str) -> Result<PathBuf, ApiError> {
        if !valid_image_id(id) {
            return Err(ApiError::NotFound(format!("CHM image {id}")));
        }
        let path = self.path_for(id);
        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => Ok(path),
            _ => Err(ApiError::NotFound(format!("CHM image {id}"))),
        }
    }
}

/// Identifiant de contenu attendu : `chm_` suivi de chiffres
pub fn valid_image_id(id: &str) -> bool {
    match id.strip_prefix("chm_") {
        Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lidar::chm::CHM_NODATA;

    fn chm_raster(data: Vec<f32>) -> Raster {
        let mut r = Raster::filled(2, 2, Some(CHM_NODATA));
        r.data = data;
        r
    }

    #[test]
    fn test_ramp_endpoints() {
        assert_eq!(ramp(0.0), Rgba([0, 200, 50, 180]));
        assert_eq!(ramp(1.0), Rgba([255, 0, 0, 180]));
        // Milieu de rampe : jaune
        assert_eq!(ramp(0.5), Rgba([255, 200, 50, 180]));
    }

    #[test]
    fn test_render_produces_png_with_transparent_nodata() {
        let chm = chm_raster(vec![5.0, CHM_NODATA, 0.0, 25.0]);
        let png = render_chm_png(&chm, 25.0).unwrap();
        assert_eq!(&png[1..4], b"PNG");

        let img = image::load_from_memory(&png).unwrap().into_rgba8();
        assert_eq!(img.dimensions(), (2, 2));
        // nodata et sol (v <= 0) transparents, données opaques à 180
        assert_eq!(img.get_pixel(0, 0).0[3], 180);
        assert_eq!(img.get_pixel(1, 0).0[3], 0);
        assert_eq!(img.get_pixel(0, 1).0[3], 0);
        assert_eq!(img.get_pixel(1, 1).0[3], 180);
    }

    #[test]
    fn test_scale_defaults_and_caps() {
        let chm = chm_raster(vec![10.0; 4]);
        // max inexploitable : échelle par défaut 30 m, pas de panique
        assert!(render_chm_png(&chm, 0.0).is_ok());
        assert!(render_chm_png(&chm, -3.0).is_ok());
        // au-delà de 50 m l'échelle est plafonnée
        assert!(render_chm_png(&chm, 120.0).is_ok());
    }

    #[test]
    fn test_valid_image_id() {
        assert!(valid_image_id("chm_1722600000000000000"));
        assert!(!valid_image_id("chm_"));
        assert!(!valid_image_id("chm_../etc/passwd"));
        assert!(!valid_image_id("other_123"));
        assert!(!valid_image_id(""));
    }

    #[tokio::test]
    async fn test_store_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChmImageStore::new(dir.path());

        let chm = chm_raster(vec![5.0; 4]);
        let png = render_chm_png(&chm, 10.0).unwrap();

        store.put("chm_123456789", &png).await.unwrap();
        let path = store.get("chm_123456789").await.unwrap();
        assert!(path.ends_with("chm_123456789.png"));

        let missing = store.get("chm_999").await.unwrap_err();
        assert!(matches!(missing, ApiError::NotFound(_)));
    }
}
