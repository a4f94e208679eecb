use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::task;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use density_viewer::core_modules::colormap::ColormapRegistry;
use density_viewer::core_modules::dataset::Detections;
use density_viewer::core_modules::image_helper;
use density_viewer::store::DataStore;
use density_viewer::{
    DatasetSchema, DensityPipeline, PipelineConfig, PointCloudResponse, ServiceError,
};

pub const API_VERSION: &str = "v0.1.0";

/// Server settings. Every flag can also come from its `DV_*` environment variable.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "density_viewer_server",
    version,
    about = "Serves normalized, density-colored point clouds"
)]
pub struct ServerConfig {
    #[arg(long = "bind", env = "DV_BIND", default_value = "0.0.0.0:5000")]
    pub bind_addr: String,
    #[arg(long, env = "DV_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,
    /// single-file, multi-dataset or image-contour
    #[arg(long, env = "DV_SCHEMA", default_value = "multi-dataset")]
    pub schema: DatasetSchema,
    /// Point record served by the single-file schema, relative to the data dir.
    #[arg(long, env = "DV_POINT_FILE", default_value = "pointcloud.json")]
    pub point_file: PathBuf,
    /// Gaussian record served by the single-file schema, relative to the data dir.
    #[arg(long, env = "DV_GAUSSIAN_FILE", default_value = "pointcloud_gaussians.json")]
    pub gaussian_file: PathBuf,
    /// Colormap used when a request names none.
    #[arg(long, env = "DV_COLORMAP", default_value = "coolwarm")]
    pub colormap: String,
    /// Overrides the schema's explanation text.
    #[arg(long, env = "DV_EXPLANATION")]
    pub explanation: Option<String>,
}

impl ServerConfig {
    /// Builds the pipeline, validating the default colormap.
    pub fn build_pipeline(&self) -> anyhow::Result<DensityPipeline> {
        let mut colormaps = ColormapRegistry::with_builtins();
        colormaps
            .set_default(&self.colormap)
            .context("invalid default colormap")?;

        let mut config = PipelineConfig::for_schema(self.schema);
        config.point_file = self.point_file.clone();
        config.gaussian_file = self.gaussian_file.clone();
        if let Some(text) = &self.explanation {
            config.explanation_text = text.clone();
        }

        Ok(DensityPipeline::new(config, DataStore::new(&self.data_dir), colormaps))
    }
}

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<DensityPipeline>,
}

impl AppState {
    pub fn new(pipeline: DensityPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Errors a handler can return, rendered as `{"msg": ...}`.
#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl From<task::JoinError> for ApiError {
    fn from(err: task::JoinError) -> Self {
        ApiError::Internal(format!("worker task failed: {err}"))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    msg: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::Service(err) => {
                let status = match err {
                    ServiceError::DatasetNotFound { .. } => StatusCode::NOT_FOUND,
                    ServiceError::UnknownColormap { .. } => StatusCode::BAD_REQUEST,
                    ServiceError::MalformedRecord(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    ServiceError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        if status.is_server_error() {
            warn!(%status, "{msg}");
        }
        (status, Json(ErrorBody { msg })).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct NameQuery {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PointCloudQuery {
    name: Option<String>,
    colormap: Option<String>,
}

/// Builds the router for the configured schema.
pub fn router(state: AppState) -> Router {
    let schema = state.pipeline.config().schema;
    let mut app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/version", get(version))
        .route("/api/colormaps", get(list_colormaps));

    app = match schema {
        DatasetSchema::SingleFile => app.route("/get-pointcloud", get(get_pointcloud)),
        DatasetSchema::MultiDataset => app
            .route("/get-pointcloud", get(get_pointcloud))
            .route("/api/get_dataset_names", get(get_dataset_names)),
        DatasetSchema::ImageContour => app
            .route("/api/get_image_names", get(get_image_names))
            .route("/api/get_image", get(get_image))
            .route("/api/get_points", get(get_points)),
    };

    app.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn version() -> impl IntoResponse {
    Json(serde_json::json!({ "version": API_VERSION }))
}

async fn list_colormaps(State(state): State<AppState>) -> impl IntoResponse {
    let colormaps = state.pipeline.colormaps();
    Json(serde_json::json!({
        "colormaps": colormaps.names(),
        "default": colormaps.default_name(),
    }))
}

async fn get_pointcloud(
    State(state): State<AppState>,
    Query(query): Query<PointCloudQuery>,
) -> Result<Json<PointCloudResponse>, ApiError> {
    let pipeline = state.pipeline.clone();
    let response = task::spawn_blocking(move || {
        pipeline.point_cloud(query.name.as_deref(), query.colormap.as_deref())
    })
    .await??;
    Ok(Json(response))
}

async fn get_dataset_names(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let pipeline = state.pipeline.clone();
    let datasets = task::spawn_blocking(move || pipeline.store().dataset_names()).await??;
    Ok(Json(serde_json::json!({ "datasets": datasets })))
}

async fn get_image_names(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let pipeline = state.pipeline.clone();
    let images = task::spawn_blocking(move || pipeline.store().image_names()).await??;
    Ok(Json(serde_json::json!({ "images": images })))
}

async fn get_image(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Result<Response, ApiError> {
    let pipeline = state.pipeline.clone();
    let png = task::spawn_blocking(move || {
        let loaded = match query.name.as_deref() {
            Some(name) => pipeline.store().image_png(name).map_err(|e| {
                warn!(image = name, "serving placeholder: {e}");
            }),
            None => Err(()),
        };
        loaded.or_else(|_| image_helper::blank_png(image_helper::PLACEHOLDER_SIZE))
    })
    .await?
    .map_err(|e| ApiError::Internal(format!("failed to encode placeholder: {e}")))?;

    let mut resp = Response::new(axum::body::Body::from(png));
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    Ok(resp)
}

async fn get_points(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Result<Json<Detections>, ApiError> {
    let pipeline = state.pipeline.clone();
    let detections = task::spawn_blocking(move || match query.name.as_deref() {
        Some(name) => pipeline.store().detections(name).unwrap_or_else(|e| {
            warn!(image = name, "serving no detections: {e}");
            Detections::default()
        }),
        None => Detections::default(),
    })
    .await?;
    Ok(Json(detections))
}

/// Binds `cfg.bind_addr` and serves the router on a background task.
pub async fn start_server(cfg: ServerConfig) -> anyhow::Result<task::JoinHandle<()>> {
    let pipeline = cfg.build_pipeline()?;
    let app = router(AppState::new(pipeline));

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;
    info!(
        "density viewer listening on http://{} (schema={}, data_dir={}, colormap={})",
        cfg.bind_addr,
        cfg.schema,
        cfg.data_dir.display(),
        cfg.colormap
    );

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("server stopped: {e}");
        }
    });
    Ok(server)
}
