//! Types d'erreurs du service
//!
//! Les messages renvoyés aux clients restent des catégories courtes ;
//! la cause détaillée part dans les logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Erreurs exposées par les opérations du service
#[derive(Debug, Error)]
pub enum ApiError {
    /// Entrée invalide (coordonnées, couche, GeoJSON, TIFF)
    #[error("invalid input: {0}")]
    BadInput(String),

    /// Route protégée sans identité
    #[error("authentication required")]
    Unauthorized,

    /// Ressource inconnue (image CHM)
    #[error("not found: {0}")]
    NotFound(String),

    /// Échec d'une requête SQL
    #[error("database query failed")]
    Query(#[from] tokio_postgres::Error),

    /// Pool de connexions indisponible
    #[error("database pool unavailable")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// Service externe (WFS/WMS) en échec ou réponse non-200
    #[error("upstream service failed: {0}")]
    Upstream(String),
}

impl ApiError {
    /// Crée une erreur `BadInput` avec contexte
    pub fn bad_input(reason: impl Into<String>) -> Self {
        Self::BadInput(reason.into())
    }

    /// Crée une erreur `Upstream` avec contexte
    pub fn upstream(reason: impl Into<String>) -> Self {
        Self::Upstream(reason.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadInput(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "authentication required".to_string(),
            ),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::Query(e) => {
                tracing::error!(error = %e, "database query failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "query failed".to_string(),
                )
            }
            ApiError::Pool(e) => {
                tracing::error!(error = %e, "database pool unavailable");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "query failed".to_string(),
                )
            }
            ApiError::Upstream(reason) => {
                tracing::error!(error = %reason, "upstream service failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "upstream service failed".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_input_maps_to_400() {
        let resp = ApiError::bad_input("invalid tile coordinates").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unauthorized_maps_to_401() {
        let resp = ApiError::Unauthorized.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_upstream_maps_to_500_without_detail() {
        let resp = ApiError::upstream("WFS returned 503: secret backend detail").into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
