//! HTTP front-end over the inference service.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{
    config::ServerConfig,
    contract::FeatureContract,
    error::{ConfigError, PredictError},
    service::Predictor,
    target::Target,
    types::{PredictionResult, RaceEntryInput},
};

#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<Predictor>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl From<PredictError> for ApiError {
    fn from(e: PredictError) -> Self {
        match e {
            PredictError::Validation(_) | PredictError::SchemaMismatch(_) => {
                Self::bad_request(e.to_string())
            }
            PredictError::NotReady => Self::unavailable(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ready: bool,
    pub targets: Vec<Target>,
    pub version: &'static str,
}

pub fn router(predictor: Arc<Predictor>, config: &ServerConfig) -> Result<Router, ConfigError> {
    let cors = config.cors.layer()?;
    Ok(Router::new()
        .route("/api/predict", post(predict))
        .route("/api/health", get(health))
        .route("/api/contract", get(contract))
        .with_state(AppState { predictor })
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

async fn predict(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PredictionResult>, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("malformed JSON body: {e}")))?;
    if !value.is_object() {
        return Err(ApiError::bad_request("request body must be a JSON object"));
    }
    let entry: RaceEntryInput = serde_json::from_value(value)
        .map_err(|e| ApiError::bad_request(format!("malformed race entry: {e}")))?;

    let predictor = Arc::clone(&state.predictor);
    let result = tokio::task::spawn_blocking(move || {
        if std::env::var("LOG_PRED").ok().as_deref() == Some("1") {
            log_feature_summary(&predictor, &entry);
        }
        predictor.predict(&entry)
    })
    .await
    .map_err(|e| ApiError::internal(format!("prediction task failed: {e}")))??;

    Ok(Json(result))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let ready = state.predictor.is_ready();
    Json(HealthResponse {
        status: if ready { "ok" } else { "loading" },
        ready,
        targets: state.predictor.targets(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn contract(State(state): State<AppState>) -> Result<Json<FeatureContract>, ApiError> {
    state
        .predictor
        .contract()
        .map(Json)
        .ok_or_else(|| ApiError::from(PredictError::NotReady))
}

/// Debug signal so an all-zero or mis-ordered vector is easy to spot.
fn log_feature_summary(predictor: &Predictor, entry: &RaceEntryInput) {
    let (Some(models), Ok(vec)) = (predictor.snapshot(), predictor.feature_vector(entry)) else {
        return;
    };
    let nz = vec.iter().filter(|x| **x != 0.0).count();
    let mean = if vec.is_empty() {
        0.0
    } else {
        vec.iter().sum::<f64>() / vec.len() as f64
    };
    let std = if vec.len() < 2 {
        0.0
    } else {
        (vec.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / vec.len() as f64).sqrt()
    };
    let sample: Vec<String> = models
        .contract
        .feature_columns
        .iter()
        .zip(&vec)
        .take(6)
        .map(|(name, v)| format!("{name}={v:.3}"))
        .collect();
    tracing::info!(
        "recv in_dim={} nonzero={} mean={:.3} std={:.3} sample=[{}]",
        vec.len(),
        nz,
        mean,
        std,
        sample.join(", ")
    );
}
