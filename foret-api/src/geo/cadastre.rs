//! Tuiles MVT des parcelles cadastrales

use crate::error::ApiError;
use crate::tiles::TileCoords;

use super::Queries;

impl Queries {
    /// Produit la tuile MVT des parcelles cadastrales pour `(z, x, y)`.
    ///
    /// Retourne des octets vides quand aucune parcelle n'intersecte
    /// l'enveloppe de la tuile.
    pub async fn cadastre_tile(&self, c: TileCoords) -> Result<Vec<u8>, ApiError> {
        const QUERY: &str = "
            SELECT ST_AsMVT(q, 'cadastre', 4096, 'geom')
            FROM (
                SELECT
                    id,
                    commune,
                    departement,
                    section,
                    numero,
                    ST_AsMVTGeom(
                        ST_Transform(geom, 3857),
                        ST_TileEnvelope($1, $2, $3),
                        4096,
                        256,
                        true
                    ) AS geom
                FROM cadastre_parcelles
                WHERE geom && ST_Transform(ST_TileEnvelope($1, $2, $3), 4326)
            ) q
            WHERE geom IS NOT NULL
        ";

        let client = self.client().await?;
        let row = client.query_one(QUERY, &[&c.z, &c.x, &c.y]).await?;
        let tile: Option<Vec<u8>> = row.get(0);
        Ok(tile.unwrap_or_default())
    }
}
