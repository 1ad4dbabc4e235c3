//! Tuiles MVT des limites administratives

use crate::error::ApiError;
use crate::tiles::TileCoords;

use super::Queries;

/// Couches administratives autorisées ; correspondent aux noms de tables
pub const ADMIN_LAYERS: [&str; 3] = ["regions", "departements", "communes"];

/// Vérifie qu'une couche appartient à l'allow-list.
pub fn check_layer(layer: &str) -> Result<(), ApiError> {
    if ADMIN_LAYERS.contains(&layer) {
        Ok(())
    } else {
        Err(ApiError::bad_input(format!(
            "invalid admin layer {layer:?}: must be regions, departements, or communes"
        )))
    }
}

/// Propriétés incluses dans le MVT pour chaque couche
fn layer_fields(layer: &str) -> &'static str {
    match layer {
        "regions" => "id, code, nom",
        "departements" => "id, code, nom, region_code",
        "communes" => "id, code, nom, departement_code, region_code",
        _ => "id",
    }
}

impl Queries {
    /// Produit la tuile MVT d'une couche administrative.
    ///
    /// `layer` doit appartenir à [`ADMIN_LAYERS`]. Retourne des octets vides
    /// quand aucune feature n'intersecte l'enveloppe.
    pub async fn admin_tile(&self, layer: &str, c: TileCoords) -> Result<Vec<u8>, ApiError> {
        check_layer(layer)?;
        let fields = layer_fields(layer);

        // Le nom de couche est interpolé uniquement après validation contre
        // l'allow-list ci-dessus ; les tuples passent en positionnel.
        let query = format!(
            "
            SELECT ST_AsMVT(q, '{layer}', 4096, 'geom')
            FROM (
                SELECT
                    {fields},
                    ST_AsMVTGeom(
                        ST_Transform(geom, 3857),
                        ST_TileEnvelope($1, $2, $3),
                        4096,
                        256,
                        true
                    ) AS geom
                FROM {layer}
                WHERE geom && ST_Transform(ST_TileEnvelope($1, $2, $3), 4326)
            ) q
            WHERE geom IS NOT NULL
            "
        );

        let client = self.client().await?;
        let row = client.query_one(&query, &[&c.z, &c.x, &c.y]).await?;
        let tile: Option<Vec<u8>> = row.get(0);
        Ok(tile.unwrap_or_default())
    }
}
