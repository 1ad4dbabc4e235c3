//! Assemblage HTTP : état partagé, routeur, CORS, démarrage
//!
//! La couche HTTP reste mince : elle extrait les paramètres, vérifie la
//! présence d'une identité sur les routes protégées, et délègue au cache de
//! tuiles, aux requêtes spatiales ou au pipeline LiDAR.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{self, Identity};
use crate::cache::{self, TileCache};
use crate::config::Config;
use crate::error::ApiError;
use crate::geo::{self, Queries};
use crate::lidar::{ChmImageStore, LidarService};
use crate::tiles;

/// État partagé par tous les handlers
#[derive(Clone)]
pub struct AppState {
    pub queries: Queries,
    pub tiles: Arc<TileCache>,
    pub lidar: Arc<LidarService>,
    pub images: ChmImageStore,
}

/// Construit le routeur complet sur un état donné.
pub fn router(state: AppState, cors_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    Router::new()
        .route("/health", get(health))
        .route("/tiles/foret/:z/:x/:y", get(tiles::forest_tile))
        .route("/tiles/admin/:layer/:z/:x/:y", get(tiles::admin_tile))
        .route("/tiles/cadastre/:z/:x/:y", get(tiles::cadastre_tile))
        .route("/analyze/polygon", post(analyze_polygon))
        .route("/analyze/lidar", post(analyze_lidar))
        .route("/lidar/chm/:id", get(chm_image))
        .layer(middleware::from_fn(auth::identity_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initialise les ressources partagées et démarre le serveur.
pub async fn serve(config: Config) -> Result<()> {
    let pool = geo::create_pool(&config.database)?;
    geo::pool::test_connection(&pool)
        .await
        .context("PostgreSQL connection test failed")?;
    info!("connected to PostgreSQL");

    let redis = match cache::create_redis_pool(&config.redis_url()) {
        Ok(pool) => match cache::ping(&pool).await {
            Ok(()) => {
                info!("connected to Redis");
                Some(pool)
            }
            Err(e) => {
                // Le cache est un accélérateur : on démarre quand même,
                // chaque lecture échouée comptera comme un miss
                warn!(error = %e, "Redis unreachable, tiles will not be cached remotely");
                Some(pool)
            }
        },
        Err(e) => {
            warn!(error = %e, "Redis pool creation failed, running without remote cache");
            None
        }
    };

    let images = ChmImageStore::new(config.lidar_cache_dir.clone());
    let state = AppState {
        queries: Queries::new(pool),
        tiles: Arc::new(TileCache::new(redis, config.tile_memory_capacity)),
        lidar: Arc::new(LidarService::new(&config, images.clone())?),
        images,
    };

    let cors_origin: HeaderValue = config
        .cors_origin
        .parse()
        .with_context(|| format!("Invalid CORS origin: {}", config.cors_origin))?;

    let app = router(state, cors_origin);

    let addr = format!("0.0.0.0:{}", config.backend_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr, "backend server starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Corps des requêtes d'analyse : la géométrie peut arriver en objet
/// GeoJSON ou en chaîne déjà sérialisée.
#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    geometry: serde_json::Value,
}

impl AnalyzeRequest {
    fn geojson(self) -> String {
        match self.geometry {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

/// POST /analyze/polygon (authentification requise)
async fn analyze_polygon(
    State(app): State<AppState>,
    identity: Option<Extension<Identity>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<geo::PolygonStats>, ApiError> {
    if identity.is_none() {
        return Err(ApiError::Unauthorized);
    }
    let stats = app.queries.analyze_polygon(&request.geojson()).await?;
    Ok(Json(stats))
}

/// POST /analyze/lidar (authentification requise)
async fn analyze_lidar(
    State(app): State<AppState>,
    identity: Option<Extension<Identity>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<crate::lidar::LidarResult>, ApiError> {
    if identity.is_none() {
        return Err(ApiError::Unauthorized);
    }
    let result = app.lidar.analyze(&request.geojson()).await?;
    Ok(Json(result))
}

/// GET /lidar/chm/:id (PNG d'overlay, accès public)
async fn chm_image(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = id.strip_suffix(".png").unwrap_or(&id);
    let path = app.images.get(id).await?;

    let png = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("CHM image {id}")))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/png")],
        png,
    )
        .into_response())
}
