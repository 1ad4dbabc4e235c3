//! Emprises et conversion approchée Lambert 93 → WGS84
//!
//! La conversion exacte n'est pas nécessaire ici : l'emprise ne sert qu'à
//! caler l'overlay CHM sur la carte. L'approximation affine autour du point
//! de référence IGN (E=700000, N=6600000 → 3°E, 46.5°N) suffit (~10 m en
//! métropole).

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::error::ApiError;

/// Fenêtre de plausibilité Lambert 93 pour la France métropolitaine :
/// X (easting) ∈ (50 000, 1 400 000), Y (northing) ∈ (5 500 000, 7 500 000)
const LAMB93_X_MIN: f64 = 50_000.0;
const LAMB93_X_MAX: f64 = 1_400_000.0;
const LAMB93_Y_MIN: f64 = 5_500_000.0;
const LAMB93_Y_MAX: f64 = 7_500_000.0;

/// Emprise `[ouest, sud, est, nord]` d'un GeoJSON Polygon/MultiPolygon
/// en EPSG:4326.
pub fn geojson_bbox(geojson: &str) -> Result<[f64; 4], ApiError> {
    #[derive(Deserialize)]
    struct Geom<'a> {
        #[serde(rename = "type")]
        typ: String,
        #[serde(borrow)]
        coordinates: &'a RawValue,
    }

    let geom: Geom = serde_json::from_str(geojson)
        .map_err(|e| ApiError::bad_input(format!("invalid GeoJSON: {e}")))?;

    let mut bbox = [0.0f64; 4];
    let mut first = true;
    let mut extend = |lon: f64, lat: f64| {
        if first {
            bbox = [lon, lat, lon, lat];
            first = false;
        } else {
            bbox[0] = bbox[0].min(lon);
            bbox[1] = bbox[1].min(lat);
            bbox[2] = bbox[2].max(lon);
            bbox[3] = bbox[3].max(lat);
        }
    };

    match geom.typ.as_str() {
        "Polygon" => {
            let rings: Vec<Vec<[f64; 2]>> = serde_json::from_str(geom.coordinates.get())
                .map_err(|e| ApiError::bad_input(format!("invalid GeoJSON: {e}")))?;
            for ring in &rings {
                for c in ring {
                    extend(c[0], c[1]);
                }
            }
        }
        "MultiPolygon" => {
            let polys: Vec<Vec<Vec<[f64; 2]>>> = serde_json::from_str(geom.coordinates.get())
                .map_err(|e| ApiError::bad_input(format!("invalid GeoJSON: {e}")))?;
            for poly in &polys {
                for ring in poly {
                    for c in ring {
                        extend(c[0], c[1]);
                    }
                }
            }
        }
        other => {
            return Err(ApiError::bad_input(format!(
                "unsupported geometry type: {other}"
            )))
        }
    }

    if first {
        return Err(ApiError::bad_input("empty geometry"));
    }
    Ok(bbox)
}

/// Convertit une emprise du CRS natif vers une approximation WGS84.
///
/// EPSG:4326 passe tel quel ; EPSG:2154 (ou EPSG absent avec des
/// coordonnées plausibles Lambert 93, si `assume_lambert93`) passe par
/// l'affine ; tout autre CRS est retourné tel quel et sera rattrapé par la
/// validation aval.
pub fn estimate_wgs84_bounds(bbox: [f64; 4], epsg: u32, assume_lambert93: bool) -> [f64; 4] {
    if epsg == 4326 {
        return bbox;
    }

    if epsg == 2154 || (epsg == 0 && assume_lambert93 && looks_like_lambert93(&bbox)) {
        return [
            lambert93_to_lon(bbox[0]),
            lambert93_to_lat(bbox[1]),
            lambert93_to_lon(bbox[2]),
            lambert93_to_lat(bbox[3]),
        ];
    }

    bbox
}

/// Vrai si l'emprise est cohérente avec du Lambert 93 métropolitain.
pub fn looks_like_lambert93(bbox: &[f64; 4]) -> bool {
    bbox[0] > LAMB93_X_MIN
        && bbox[0] < LAMB93_X_MAX
        && bbox[1] > LAMB93_Y_MIN
        && bbox[1] < LAMB93_Y_MAX
        && bbox[2] > LAMB93_X_MIN
        && bbox[2] < LAMB93_X_MAX
        && bbox[3] > LAMB93_Y_MIN
        && bbox[3] < LAMB93_Y_MAX
}

/// Vrai si l'emprise tient dans les plages WGS84 globales.
pub fn is_valid_wgs84(bbox: &[f64; 4]) -> bool {
    bbox[0] >= -180.0
        && bbox[0] <= 180.0
        && bbox[1] >= -90.0
        && bbox[1] <= 90.0
        && bbox[2] >= -180.0
        && bbox[2] <= 180.0
        && bbox[3] >= -90.0
        && bbox[3] <= 90.0
}

/// Longitude approchée depuis un easting Lambert 93
fn lambert93_to_lon(x: f64) -> f64 {
    3.0 + (x - 700_000.0) / ((46.5_f64.to_radians()).cos() * 111_320.0)
}

/// Latitude approchée depuis un northing Lambert 93
fn lambert93_to_lat(y: f64) -> f64 {
    46.5 + (y - 6_600_000.0) / 110_540.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_polygon() {
        let geojson = r#"{"type":"Polygon","coordinates":[[[2.0,48.0],[2.5,48.0],[2.5,48.4],[2.0,48.4],[2.0,48.0]]]}"#;
        let bbox = geojson_bbox(geojson).unwrap();
        assert_eq!(bbox, [2.0, 48.0, 2.5, 48.4]);
    }

    #[test]
    fn test_bbox_multipolygon() {
        let geojson = r#"{"type":"MultiPolygon","coordinates":[[[[0.0,1.0],[1.0,1.0],[1.0,2.0],[0.0,1.0]]],[[[3.0,4.0],[5.0,4.0],[5.0,6.0],[3.0,4.0]]]]}"#;
        let bbox = geojson_bbox(geojson).unwrap();
        assert_eq!(bbox, [0.0, 1.0, 5.0, 6.0]);
    }

    #[test]
    fn test_bbox_rejects_other_types() {
        let geojson = r#"{"type":"Point","coordinates":[2.0,48.0]}"#;
        assert!(matches!(geojson_bbox(geojson), Err(ApiError::BadInput(_))));
    }

    #[test]
    fn test_affine_near_paris() {
        // Tour Eiffel approximativement (comparer à 2.2945°E, 48.8584°N)
        let lon = lambert93_to_lon(648237.0);
        let lat = lambert93_to_lat(6862107.0);
        assert!((lon - 2.2945).abs() < 0.1, "lon={lon}");
        assert!((lat - 48.8584).abs() < 0.1, "lat={lat}");
    }

    #[test]
    fn test_estimate_passthrough_wgs84() {
        let bbox = [2.0, 48.0, 2.5, 48.4];
        assert_eq!(estimate_wgs84_bounds(bbox, 4326, true), bbox);
    }

    #[test]
    fn test_estimate_converts_lambert93() {
        let out = estimate_wgs84_bounds([700000.0, 6600000.0, 710000.0, 6610000.0], 2154, true);
        assert!(is_valid_wgs84(&out));
        assert!((out[0] - 3.0).abs() < 0.01);
        assert!((out[1] - 46.5).abs() < 0.01);
    }

    #[test]
    fn test_heuristic_behind_switch() {
        let projected = [700000.0, 6600000.0, 710000.0, 6610000.0];
        // EPSG absent : l'heuristique convertit seulement si activée
        let converted = estimate_wgs84_bounds(projected, 0, true);
        assert!(is_valid_wgs84(&converted));
        let untouched = estimate_wgs84_bounds(projected, 0, false);
        assert_eq!(untouched, projected);
        assert!(!is_valid_wgs84(&untouched));
    }

    #[test]
    fn test_unknown_crs_left_for_downstream_fallback() {
        // Un CRS projeté hors fenêtre Lambert reste tel quel et échoue la
        // validation WGS84 (le pipeline retombe alors sur le bbox du polygone)
        let utm = [500000.0, 4500000.0, 510000.0, 4510000.0];
        let out = estimate_wgs84_bounds(utm, 32631, true);
        assert_eq!(out, utm);
        assert!(!is_valid_wgs84(&out));
    }
}
