use crate::aggregate::{aggregate_named, base_layer, point_layer};
use crate::click::resolve_click;
use crate::config::AppConfig;
use crate::error::AtlasError;
use crate::features;
use crate::store::GeometryStore;
use crate::types::{BoundaryLevel, DatasetId, LayerName};
use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use geojson::FeatureCollection;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, instrument};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn GeometryStore>,
}

/// Error body returned by every route: `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Atlas(AtlasError),
    BadRequest(String),
}

impl From<AtlasError> for ApiError {
    fn from(err: AtlasError) -> Self {
        ApiError::Atlas(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Atlas(err @ AtlasError::InvalidDataset(_)) => (StatusCode::NOT_FOUND, err.to_string()),
            ApiError::Atlas(err @ AtlasError::Busy) => (StatusCode::CONFLICT, err.to_string()),
            ApiError::Atlas(err) => {
                error!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult = Result<Json<FeatureCollection>, ApiError>;

/// Runs CPU-bound layer work off the async runtime.
async fn blocking<F>(state: AppState, work: F) -> ApiResult
where
    F: FnOnce(&dyn GeometryStore) -> Result<FeatureCollection, AtlasError> + Send + 'static,
{
    let collection = tokio::task::spawn_blocking(move || work(state.store.as_ref()))
        .await
        .map_err(|e| AtlasError::DataSource(format!("worker task failed: {e}")))??;
    Ok(Json(collection))
}

pub fn router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/get_geojson/:layer_name", get(get_layer))
        .route("/get_geojson_boundaryPolygons/:layer_name", get(get_boundary_polygons))
        .route("/get_geojson_pollutantPoints/:layer_name", get(get_pollutant_points))
        .route("/agg_point-to-boundary-overlay/:overlay", get(get_overlay))
        .route("/get_point-to-boundary-click/", post(post_click))
        .layer(CorsLayer::permissive())
        .with_state(state);

    match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}

pub async fn start_server(config: AppConfig, store: Arc<dyn GeometryStore>) -> Result<()> {
    let addr = config.server.socket_addr()?;
    let app = router(AppState { store }, Some(config.server.static_dir.clone()));

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Raw features of a dataset or a boundary level.
#[instrument(skip(state))]
async fn get_layer(State(state): State<AppState>, Path(layer_name): Path<String>) -> ApiResult {
    let layer: LayerName = layer_name.parse()?;
    blocking(state, move |store| match layer {
        LayerName::Dataset(dataset) => {
            let facilities = store.facilities(dataset)?;
            Ok(features::point_collection(facilities.iter().map(|p| p.as_ref())))
        }
        LayerName::Boundary(level) => {
            let boundaries = store.boundaries(level)?;
            Ok(features::polygon_collection(boundaries.features.iter().map(|p| p.as_ref())))
        }
    })
    .await
}

#[instrument(skip(state))]
async fn get_boundary_polygons(State(state): State<AppState>, Path(layer_name): Path<String>) -> ApiResult {
    let level: BoundaryLevel = layer_name.parse()?;
    blocking(state, move |store| Ok(features::base_collection(&base_layer(store, level)?))).await
}

#[instrument(skip(state))]
async fn get_pollutant_points(State(state): State<AppState>, Path(layer_name): Path<String>) -> ApiResult {
    let dataset: DatasetId = layer_name.parse()?;
    blocking(state, move |store| {
        Ok(features::ranked_point_collection(&point_layer(store, dataset)?))
    })
    .await
}

/// `{pointLayer}-{boundaryLayer}`; dataset names never contain `-`.
#[instrument(skip(state))]
async fn get_overlay(State(state): State<AppState>, Path(overlay): Path<String>) -> ApiResult {
    let (point_layer, boundary_layer) = overlay
        .split_once('-')
        .map(|(p, b)| (p.to_string(), b.to_string()))
        .ok_or_else(|| AtlasError::InvalidDataset(overlay.clone()))?;
    blocking(state, move |store| {
        let polygons = aggregate_named(store, &point_layer, &boundary_layer)?;
        info!(polygons = polygons.len(), "overlay aggregated");
        Ok(features::aggregated_collection(&polygons))
    })
    .await
}

/// Body is a GeoJSON Point geometry, `[lon, lat]`.
#[instrument(skip_all)]
async fn post_click(
    State(state): State<AppState>,
    body: Result<Json<geojson::Geometry>, JsonRejection>,
) -> ApiResult {
    let Json(geometry) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let (lon, lat) = match &geometry.value {
        geojson::Value::Point(position) if position.len() >= 2 => (position[0], position[1]),
        _ => return Err(ApiError::BadRequest("expected a GeoJSON Point".to_string())),
    };
    info!(lat, lon, "resolving click");
    blocking(state, move |store| {
        Ok(features::click_collection(&resolve_click(store, lat, lon)?))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;
    use serde_json::Value;

    fn state() -> AppState {
        AppState {
            store: Arc::new(fixtures::store()),
        }
    }

    fn click_body(value: Value) -> Result<Json<geojson::Geometry>, JsonRejection> {
        Ok(Json(serde_json::from_value(value).unwrap()))
    }

    #[tokio::test]
    async fn overlay_splits_at_the_first_dash() {
        let Json(fc) = get_overlay(State(state()), Path("NPRI_PM2_5-c_div".to_string()))
            .await
            .unwrap();
        assert_eq!(fc.features.len(), 2);
        let props = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(props["point_count"], json!(3));
    }

    #[tokio::test]
    async fn unknown_layers_are_not_found() {
        for overlay in ["NPRI_Hg-province", "NPRI_CO-diss_area", "NPRI_CO"] {
            let err = get_overlay(State(state()), Path(overlay.to_string())).await.unwrap_err();
            assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
        }
        let err = get_boundary_polygons(State(state()), Path("NPRI_CO".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_data_is_a_server_error() {
        let err = get_pollutant_points(State(state()), Path("NPRI_SO2".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn layer_routes_return_feature_collections() {
        let Json(points) = get_layer(State(state()), Path("NPRI_NOx".to_string())).await.unwrap();
        assert_eq!(points.features.len(), 3);
        let Json(polygons) = get_layer(State(state()), Path("c_subdiv".to_string())).await.unwrap();
        assert_eq!(polygons.features.len(), 2);

        let Json(base) = get_boundary_polygons(State(state()), Path("c_div".to_string()))
            .await
            .unwrap();
        assert_eq!(base.features[0].properties.as_ref().unwrap()["record_count"], json!(3));

        let Json(ranked) = get_pollutant_points(State(state()), Path("NPRI_PM2_5".to_string()))
            .await
            .unwrap();
        assert_eq!(ranked.features[3].properties.as_ref().unwrap()["emissions_rank"], json!(1));
    }

    #[tokio::test]
    async fn click_resolves_a_point_body() {
        let body = click_body(json!({"type": "Point", "coordinates": [6.5, 1.0]}));
        let Json(fc) = post_click(State(state()), body).await.unwrap();
        let ids: Vec<&str> = fc
            .features
            .iter()
            .map(|f| f.properties.as_ref().unwrap()["dguid"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["2021A000235", "2021A00033502", "2021A0005350201"]);
    }

    #[tokio::test]
    async fn non_point_click_body_is_a_bad_request() {
        let body = click_body(json!({"type": "LineString", "coordinates": [[0, 0], [1, 1]]}));
        let err = post_click(State(state()), body).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
