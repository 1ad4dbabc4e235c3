//! Modèle de hauteur de canopée : CHM = MNS − MNT
//!
//! Le calcul se fait pixel à pixel sur le rectangle commun des deux rasters.
//! Les différences négatives (artefacts de traitement) sont ramenées à 0.

use geotiff_lite::Raster;

/// Sentinelle nodata des rasters CHM produits
pub const CHM_NODATA: f32 = -9999.0;

/// Seuil forestier standard : en dessous de 2 m, pas de canopée
pub const CANOPY_THRESHOLD: f32 = 2.0;

/// Statistiques de canopée, arrondies à 2 décimales
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChmStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

/// Calcule le CHM d'une paire MNS/MNT.
///
/// Pour chaque pixel du rectangle commun : nodata ou NaN d'un côté ⇒
/// sentinelle ; sinon `max(0, mns − mnt)`.
pub fn compute_chm(mns: &Raster, mnt: &Raster) -> Raster {
    let w = mns.width.min(mnt.width);
    let h = mns.height.min(mnt.height);

    let mut chm = Raster::filled(w, h, Some(CHM_NODATA));
    chm.bbox = mns.bbox;
    chm.epsg = mns.epsg;

    for y in 0..h {
        for x in 0..w {
            let mns_val = mns.get(x, y);
            let mnt_val = mnt.get(x, y);

            if mns.is_nodata(mns_val)
                || mnt.is_nodata(mnt_val)
                || mns_val.is_nan()
                || mnt_val.is_nan()
            {
                continue; // la sentinelle est déjà en place
            }

            chm.data[y * w + x] = (mns_val - mnt_val).max(0.0);
        }
    }

    chm
}

/// Ajoute au vecteur de travail les valeurs exploitables du CHM
/// (ni nodata, ni NaN, ni infini).
pub fn collect_valid(chm: &Raster, out: &mut Vec<f32>) {
    for &v in &chm.data {
        if chm.is_nodata(v) || !v.is_finite() {
            continue;
        }
        out.push(v);
    }
}

/// Statistiques sur les pixels de canopée (valeurs ≥ 2 m).
///
/// Retourne `None` quand aucun pixel ne dépasse le seuil. Médiane basse sur
/// les effectifs pairs.
pub fn canopy_stats(values: &[f32]) -> Option<ChmStats> {
    let mut canopy: Vec<f32> = values
        .iter()
        .copied()
        .filter(|&v| v >= CANOPY_THRESHOLD)
        .collect();
    if canopy.is_empty() {
        return None;
    }

    canopy.sort_unstable_by(|a, b| a.total_cmp(b));

    let min = canopy[0] as f64;
    let max = canopy[canopy.len() - 1] as f64;
    let sum: f64 = canopy.iter().map(|&v| v as f64).sum();
    let mean = sum / canopy.len() as f64;
    let median = canopy[(canopy.len() - 1) / 2] as f64;

    Some(ChmStats {
        min: round2(min),
        max: round2(max),
        mean: round2(mean),
        median: round2(median),
    })
}

/// Arrondi à 2 décimales
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(width: usize, height: usize, data: Vec<f32>, nodata: Option<f32>) -> Raster {
        let mut r = Raster::filled(width, height, None);
        r.data = data;
        r.nodata = nodata;
        r
    }

    #[test]
    fn test_chm_is_difference_clamped_to_zero() {
        let mns = raster(2, 2, vec![10.0, 10.0, 10.0, 10.0], None);
        let mnt = raster(2, 2, vec![5.0, 5.0, 12.0, 5.0], None);

        let chm = compute_chm(&mns, &mnt);
        assert_eq!(chm.data, vec![5.0, 5.0, 0.0, 5.0]);
    }

    #[test]
    fn test_chm_propagates_nodata_and_nan() {
        let mns = raster(2, 2, vec![10.0, -9999.0, f32::NAN, 10.0], Some(-9999.0));
        let mnt = raster(2, 2, vec![5.0, 5.0, 5.0, f32::NAN], None);

        let chm = compute_chm(&mns, &mnt);
        assert_eq!(chm.data[0], 5.0);
        assert_eq!(chm.data[1], CHM_NODATA);
        assert_eq!(chm.data[2], CHM_NODATA);
        assert_eq!(chm.data[3], CHM_NODATA);
    }

    #[test]
    fn test_chm_uses_overlapping_rectangle() {
        let mns = raster(3, 2, vec![10.0; 6], None);
        let mnt = raster(2, 3, vec![4.0; 6], None);

        let chm = compute_chm(&mns, &mnt);
        assert_eq!((chm.width, chm.height), (2, 2));
        assert_eq!(chm.data, vec![6.0; 4]);
    }

    #[test]
    fn test_collect_valid_filters_sentinels() {
        let chm = raster(2, 2, vec![5.0, CHM_NODATA, f32::INFINITY, 0.5], Some(CHM_NODATA));

        let mut values = Vec::new();
        collect_valid(&chm, &mut values);
        assert_eq!(values, vec![5.0, 0.5]);
    }

    #[test]
    fn test_stats_threshold_and_rounding() {
        // 0.5 et 1.9 sont sous le seuil de canopée
        let values = vec![0.5, 1.9, 2.0, 10.337, 4.0];
        let stats = canopy_stats(&values).unwrap();
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 10.34);
        assert_eq!(stats.median, 4.0);
        assert_eq!(stats.mean, round2((2.0 + 10.337 + 4.0) / 3.0));
    }

    #[test]
    fn test_stats_lower_median_on_even_count() {
        let values = vec![2.0, 3.0, 4.0, 5.0];
        let stats = canopy_stats(&values).unwrap();
        assert_eq!(stats.median, 3.0);
    }

    #[test]
    fn test_stats_none_below_threshold() {
        assert!(canopy_stats(&[0.1, 1.0, 1.99]).is_none());
        assert!(canopy_stats(&[]).is_none());
    }

    #[test]
    fn test_uniform_pair_gives_uniform_stats() {
        // MNS à 10 m, MNT à 5 m : canopée uniforme de 5 m
        let mns = raster(2, 2, vec![10.0; 4], None);
        let mnt = raster(2, 2, vec![5.0; 4], None);
        let chm = compute_chm(&mns, &mnt);

        let mut values = Vec::new();
        collect_valid(&chm, &mut values);
        let stats = canopy_stats(&values).unwrap();
        assert_eq!(
            stats,
            ChmStats {
                min: 5.0,
                max: 5.0,
                mean: 5.0,
                median: 5.0
            }
        );
    }
}
