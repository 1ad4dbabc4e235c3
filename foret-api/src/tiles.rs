//! Tuiles MVT : validation des coordonnées, empreintes de cache, handlers
//!
//! La couche de coordonnées ne fait aucune I/O : elle valide `(z, x, y)`,
//! retire un éventuel suffixe `.mvt`, et produit l'empreinte de cache. Les
//! handlers délèguent ensuite au cache de tuiles puis au producteur MVT.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use bytes::Bytes;

use crate::auth::Identity;
use crate::error::ApiError;
use crate::server::AppState;

/// TTL des tuiles forêt et cadastre (rafraîchies par l'importeur externe)
pub const TILE_TTL: Duration = Duration::from_secs(24 * 3600);

/// TTL des tuiles administratives (quasi statiques entre déploiements)
pub const ADMIN_TILE_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Coordonnées de tuile validées
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCoords {
    pub z: i32,
    pub x: i32,
    pub y: i32,
}

/// Valide `(z, x, y)` reçus en chaînes. Le `y` peut porter un suffixe
/// `.mvt`, retiré avant parsing.
pub fn parse_tile_coords(z: &str, x: &str, y: &str) -> Result<TileCoords, ApiError> {
    let y = y.strip_suffix(".mvt").unwrap_or(y);

    let parse = |s: &str| {
        s.parse::<i32>()
            .map_err(|_| ApiError::bad_input("invalid tile coordinates"))
    };
    let (z, x, y) = (parse(z)?, parse(x)?, parse(y)?);

    if !(0..=22).contains(&z) || x < 0 || y < 0 {
        return Err(ApiError::bad_input("tile coordinates out of range"));
    }
    Ok(TileCoords { z, x, y })
}

/// Empreinte de cache `tile:<kind>[:<layer>]:<z>:<x>:<y>`
pub fn fingerprint(kind: &str, layer: Option<&str>, c: TileCoords) -> String {
    match layer {
        Some(layer) => format!("tile:{}:{}:{}:{}:{}", kind, layer, c.z, c.x, c.y),
        None => format!("tile:{}:{}:{}:{}", kind, c.z, c.x, c.y),
    }
}

/// Tuile vide ⇒ 204 No Content ; sinon 200 avec le protobuf MVT.
fn mvt_response(bytes: Bytes) -> Response {
    if bytes.is_empty() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/x-protobuf")],
            bytes,
        )
            .into_response()
    }
}

/// GET /tiles/foret/:z/:x/:y (authentification requise)
pub async fn forest_tile(
    State(app): State<AppState>,
    identity: Option<Extension<Identity>>,
    Path((z, x, y)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    if identity.is_none() {
        return Err(ApiError::Unauthorized);
    }

    let coords = parse_tile_coords(&z, &x, &y)?;
    let key = fingerprint("foret", None, coords);
    let queries = app.queries.clone();

    let bytes = app
        .tiles
        .serve(&key, TILE_TTL, move || async move {
            queries.forest_tile(coords).await
        })
        .await?;
    Ok(mvt_response(bytes))
}

/// GET /tiles/admin/:layer/:z/:x/:y (données publiques, pas d'authentification)
pub async fn admin_tile(
    State(app): State<AppState>,
    Path((layer, z, x, y)): Path<(String, String, String, String)>,
) -> Result<Response, ApiError> {
    let coords = parse_tile_coords(&z, &x, &y)?;
    // L'allow-list est vérifiée avant tout accès cache ou base
    crate::geo::admin::check_layer(&layer)?;

    let key = fingerprint("admin", Some(&layer), coords);
    let queries = app.queries.clone();

    let bytes = app
        .tiles
        .serve(&key, ADMIN_TILE_TTL, move || async move {
            queries.admin_tile(&layer, coords).await
        })
        .await?;
    Ok(mvt_response(bytes))
}

/// GET /tiles/cadastre/:z/:x/:y (authentification requise)
pub async fn cadastre_tile(
    State(app): State<AppState>,
    identity: Option<Extension<Identity>>,
    Path((z, x, y)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    if identity.is_none() {
        return Err(ApiError::Unauthorized);
    }

    let coords = parse_tile_coords(&z, &x, &y)?;
    let key = fingerprint("cadastre", None, coords);
    let queries = app.queries.clone();

    let bytes = app
        .tiles
        .serve(&key, TILE_TTL, move || async move {
            queries.cadastre_tile(coords).await
        })
        .await?;
    Ok(mvt_response(bytes))
}
