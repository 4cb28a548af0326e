use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    errors::MetricsError,
    middlewares::auth::JwtClaims,
    models::{ConfidenceMetric, LearnerId, LearnerMetrics, PronunciationMetric, StreakRecord},
    services::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TimezoneQuery {
    tz: Option<String>,
}

pub(crate) async fn get_confidence(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(learner_id): Path<String>,
) -> Result<Json<ConfidenceMetric>, ApiError> {
    let learner = authorize(&claims, &learner_id)?;
    let metric = state.facade.get_confidence(learner.as_str()).await?;
    Ok(Json(metric))
}

pub(crate) async fn get_pronunciation(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(learner_id): Path<String>,
) -> Result<Json<PronunciationMetric>, ApiError> {
    let learner = authorize(&claims, &learner_id)?;
    let metric = state.facade.get_pronunciation(learner.as_str()).await?;
    Ok(Json(metric))
}

pub(crate) async fn get_streak(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(learner_id): Path<String>,
    Query(query): Query<TimezoneQuery>,
) -> Result<Json<StreakRecord>, ApiError> {
    let learner = authorize(&claims, &learner_id)?;
    let record = state
        .facade
        .get_streak(learner.as_str(), query.tz.as_deref())
        .await?;
    Ok(Json(record))
}

pub(crate) async fn get_summary(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(learner_id): Path<String>,
    Query(query): Query<TimezoneQuery>,
) -> Result<Json<LearnerMetrics>, ApiError> {
    let learner = authorize(&claims, &learner_id)?;
    let summary = state
        .facade
        .get_summary(learner.as_str(), query.tz.as_deref())
        .await?;
    Ok(Json(summary))
}

/// Tutor/admin triggered recompute. Computes exactly what the learner would
/// get for themselves from the same history.
pub(crate) async fn recompute_for_learner(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(learner_id): Path<String>,
    Query(query): Query<TimezoneQuery>,
) -> Result<Json<LearnerMetrics>, ApiError> {
    let learner = authorize(&claims, &learner_id)?;
    tracing::info!(
        requested_by = %claims.sub,
        role = %claims.role,
        learner_id = %learner,
        "Metrics recompute requested"
    );
    let summary = state
        .facade
        .get_summary(learner.as_str(), query.tz.as_deref())
        .await?;
    Ok(Json(summary))
}

fn authorize(claims: &JwtClaims, learner_id: &str) -> Result<LearnerId, ApiError> {
    let learner = LearnerId::parse(learner_id)?;
    if !claims.can_access_learner(learner.as_str()) {
        tracing::warn!(
            caller = %claims.sub,
            learner_id = %learner,
            "Cross-learner access denied"
        );
        return Err(ApiError::forbidden(
            "Metrics of other learners require a tutor or admin role",
        ));
    }
    Ok(learner)
}

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Unavailable(String),
}

impl ApiError {
    fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }
}

impl From<MetricsError> for ApiError {
    fn from(err: MetricsError) -> Self {
        let message = err.to_string();
        match err {
            MetricsError::InvalidIdentifier(_) | MetricsError::InvalidTimezone(_) => {
                ApiError::BadRequest(message)
            }
            MetricsError::NotFound(_) => ApiError::NotFound(message),
            MetricsError::SourceUnavailable(_) => ApiError::Unavailable(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Unavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
        };

        (
            status,
            Json(json!({ "message": message, "status": status.as_u16() })),
        )
            .into_response()
    }
}
