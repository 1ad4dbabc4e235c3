//! Analyse d'un polygone contre la couche forêt
//!
//! Trois requêtes en séquence : résumé, ventilation TFV, ventilation par
//! essence dominante. Les surfaces sont calculées après reprojection en
//! EPSG:2154 (Lambert 93), en m² puis converties en hectares (÷ 10 000).
//!
//! La ventilation TFV normalise les codes granulaires BD Forêt V2
//! (ex. FF1-09-09) et les codes TFIFN historiques (ex. AFJ, CPV, 30) vers
//! les 9 catégories terminales, côté Rust, pour garder la requête en
//! paramètres positionnels purs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

use super::Queries;

/// Résultat agrégé d'une analyse de polygone
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonStats {
    pub area_ha: f64,
    pub forest_cover_ha: f64,
    pub parcel_count: i64,
    pub tfv_breakdown: Vec<TfvRow>,
    pub species_breakdown: Vec<SpeciesRow>,
}

/// Une ligne de la ventilation par type de formation végétale
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TfvRow {
    pub code_tfv: String,
    pub lib_tfv: String,
    pub area_ha: f64,
}

/// Une ligne de la ventilation par essence dominante
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesRow {
    pub essence: String,
    pub area_ha: f64,
}

/// Normalise un code TFV brut vers l'une des 9 catégories terminales.
///
/// `FF4` est l'unique catégorie par défaut : tout code non reconnu y tombe.
pub fn normalize_tfv(raw: &str) -> &'static str {
    let raw = raw.trim();
    if raw.starts_with("FF1")
        || raw == "FF0"
        || matches!(raw, "AFJ" | "AFV" | "HFW" | "HFZ" | "QF")
    {
        "FF1"
    } else if raw.starts_with("FF2") || matches!(raw, "CPJ" | "CPV" | "CRJ" | "CRV") {
        "FF2"
    } else if raw.starts_with("FF3") || matches!(raw, "FR" | "MR") {
        "FF3"
    } else if raw.starts_with("FO1") || raw == "30" {
        "FO1"
    } else if raw.starts_with("FO2") {
        "FO2"
    } else if raw.starts_with("FO3") {
        "FO3"
    } else if raw.starts_with("LA") || raw == "40" {
        "LA"
    } else if raw == "FP" || raw == "50" {
        "FP"
    } else {
        "FF4"
    }
}

/// Libellé d'affichage d'une catégorie terminale
pub fn tfv_label(code: &str) -> &str {
    match code {
        "FF1" => "Forêt fermée feuillus",
        "FF2" => "Forêt fermée conifères",
        "FF3" => "Forêt fermée mixte",
        "FF4" => "Forêt fermée autre",
        "FO1" => "Forêt ouverte feuillus",
        "FO2" => "Forêt ouverte conifères",
        "FO3" => "Forêt ouverte mixte",
        "LA" => "Lande",
        "FP" => "Peupleraie",
        other => other,
    }
}

/// Valide le GeoJSON avant tout travail en base : JSON syntaxiquement
/// correct, de type `Polygon` ou `MultiPolygon`.
pub fn validate_polygon_geojson(geojson: &str) -> Result<(), ApiError> {
    #[derive(Deserialize)]
    struct Peek {
        #[serde(rename = "type")]
        typ: String,
    }

    let peek: Peek = serde_json::from_str(geojson)
        .map_err(|e| ApiError::bad_input(format!("invalid GeoJSON: {e}")))?;

    if peek.typ != "Polygon" && peek.typ != "MultiPolygon" {
        return Err(ApiError::bad_input(format!(
            "invalid GeoJSON: type must be Polygon or MultiPolygon, got {:?}",
            peek.typ
        )));
    }
    Ok(())
}

impl Queries {
    /// Analyse le polygone GeoJSON (EPSG:4326) contre `forest_parcels`.
    pub async fn analyze_polygon(&self, geojson: &str) -> Result<PolygonStats, ApiError> {
        validate_polygon_geojson(geojson)?;

        let client = self.client().await?;

        // ── 1. Surface du polygone + couvert forestier ───────────────────
        const SUMMARY_SQL: &str = "
            WITH poly AS (
                SELECT ST_GeomFromGeoJSON($1) AS geom
            )
            SELECT
                ST_Area(ST_Transform(poly.geom, 2154)) / 10000.0 AS polygon_area_ha,
                COALESCE(SUM(
                    ST_Area(ST_Transform(ST_Intersection(fp.geom, poly.geom), 2154)) / 10000.0
                ), 0) AS forest_cover_ha,
                COUNT(fp.id) AS parcel_count
            FROM poly
            LEFT JOIN forest_parcels fp
                ON fp.geom && poly.geom
                AND ST_Intersects(fp.geom, poly.geom)
            GROUP BY poly.geom
        ";

        let row = client.query_one(SUMMARY_SQL, &[&geojson]).await?;
        let mut stats = PolygonStats {
            area_ha: row.get(0),
            forest_cover_ha: row.get(1),
            parcel_count: row.get(2),
            ..Default::default()
        };

        // Pas de forêt dans le polygone : ventilations vides
        if stats.parcel_count == 0 {
            return Ok(stats);
        }

        // ── 2. Ventilation TFV ───────────────────────────────────────────
        const TFV_SQL: &str = "
            WITH poly AS (SELECT ST_GeomFromGeoJSON($1) AS geom)
            SELECT
                fp.code_tfv,
                SUM(
                    ST_Area(ST_Transform(ST_Intersection(fp.geom, poly.geom), 2154)) / 10000.0
                ) AS area_ha
            FROM poly
            JOIN forest_parcels fp
                ON fp.geom && poly.geom
                AND ST_Intersects(fp.geom, poly.geom)
            GROUP BY fp.code_tfv
        ";

        let mut by_code: HashMap<&'static str, f64> = HashMap::new();
        for row in client.query(TFV_SQL, &[&geojson]).await? {
            let raw: String = row.get(0);
            let area: f64 = row.get(1);
            *by_code.entry(normalize_tfv(&raw)).or_insert(0.0) += area;
        }

        stats.tfv_breakdown = by_code
            .into_iter()
            .map(|(code, area_ha)| TfvRow {
                code_tfv: code.to_string(),
                lib_tfv: tfv_label(code).to_string(),
                area_ha,
            })
            .collect();
        stats
            .tfv_breakdown
            .sort_by(|a, b| b.area_ha.total_cmp(&a.area_ha).then(a.code_tfv.cmp(&b.code_tfv)));

        // ── 3. Ventilation par essence dominante ─────────────────────────
        const SPECIES_SQL: &str = "
            WITH poly AS (SELECT ST_GeomFromGeoJSON($1) AS geom)
            SELECT
                COALESCE(NULLIF(TRIM(fp.essence1), ''), '—') AS essence,
                SUM(
                    ST_Area(ST_Transform(ST_Intersection(fp.geom, poly.geom), 2154)) / 10000.0
                ) AS area_ha
            FROM poly
            JOIN forest_parcels fp
                ON fp.geom && poly.geom
                AND ST_Intersects(fp.geom, poly.geom)
            GROUP BY essence
            ORDER BY area_ha DESC
        ";

        for row in client.query(SPECIES_SQL, &[&geojson]).await? {
            stats.species_breakdown.push(SpeciesRow {
                essence: row.get(0),
                area_ha: row.get(1),
            });
        }

        Ok(stats)
    }
}
