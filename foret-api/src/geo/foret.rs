//! Tuiles MVT de la couche forêt (BD Forêt V2)

use crate::error::ApiError;
use crate::tiles::TileCoords;

use super::Queries;

impl Queries {
    /// Produit la tuile MVT forêt pour `(z, x, y)`.
    ///
    /// Retourne des octets vides quand aucune parcelle n'intersecte
    /// l'enveloppe de la tuile.
    pub async fn forest_tile(&self, c: TileCoords) -> Result<Vec<u8>, ApiError> {
        // ST_TileEnvelope calcule l'enveloppe en EPSG:3857 (Web Mercator).
        // Les géométries stockées en 4326 sont transformées en 3857 pour
        // ST_AsMVTGeom ; le filtre spatial (&&) utilise la transformation
        // inverse de l'enveloppe pour exploiter l'index sur le CRS stocké.
        const QUERY: &str = "
            SELECT ST_AsMVT(q, 'forest', 4096, 'geom')
            FROM (
                SELECT
                    id,
                    code_tfv,
                    lib_tfv,
                    essence1,
                    departement,
                    ST_AsMVTGeom(
                        ST_Transform(geom, 3857),
                        ST_TileEnvelope($1, $2, $3),
                        4096,
                        256,
                        true
                    ) AS geom
                FROM forest_parcels
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
