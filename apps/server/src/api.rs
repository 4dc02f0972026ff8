use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use shelfmark_core::{FuzzyMatch, SeriesLookup, ValidationError, VolumeSelection};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    config::Config,
    error::{ApiError, ApiResult},
    main_lib::AppState,
    models::{Readiness, SearchQuery, VolumesQuery},
};

pub async fn healthz() -> &'static str {
    "ok"
}

/// Always 200 while the process serves; a degraded cache is reported in
/// the body since lookups still answer from providers.
pub async fn readyz(State(state): State<Arc<AppState>>) -> Json<Readiness> {
    let cache_degraded = state.engine.cache_degraded();
    Json(Readiness {
        status: if cache_degraded { "degraded" } else { "ready" },
        cache_degraded,
        providers: state
            .engine
            .registry()
            .providers()
            .iter()
            .map(|p| p.id().to_string())
            .collect(),
        scheduler_enabled: state.engine.config().scheduler.enabled,
    })
}

async fn search_series(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<FuzzyMatch>>> {
    Ok(Json(state.engine.search(&query.q)?))
}

async fn lookup_volumes(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<VolumesQuery>,
) -> ApiResult<Json<SeriesLookup>> {
    let selection: VolumeSelection = query
        .volumes
        .parse()
        .map_err(|e: ValidationError| ApiError::BadRequest(e.to_string()))?;
    let lookup = state.engine.lookup(&name, &selection).await?;
    Ok(Json(lookup))
}

pub fn app_router(state: Arc<AppState>, config: &Config) -> Router {
    let cors = if config.cors_allow.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = config
            .cors_allow
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                    None
                }
            })
            .collect::<Vec<_>>();
        CorsLayer::new().allow_origin(origins)
    };

    let api = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/series/search", get(search_series))
        .route("/series/{name}/volumes", get(lookup_volumes));

    Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        .layer(cors)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
}
