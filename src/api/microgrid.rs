//! HTTP handlers for the three microgrid-facing routes (§11.5): run a
//! schedule, fetch the latest one, and list alerts.

use axum::extract::{Path, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::response::ApiResponse;
use crate::controller::{AppState, ClearSkyForecastSource, ForecastSourceHint};
use crate::domain::schedule::{Alert, Schedule};

#[derive(Debug, Deserialize)]
pub struct RunScheduleRequest {
    #[serde(default)]
    pub horizon_hours: Option<u32>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub forecast_source_hint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub schedule: Schedule,
}

/// `POST /microgrids/:id/schedule:run` — executes §6 `run`.
pub async fn run_schedule(
    State(state): State<AppState>,
    Path(microgrid_id): Path<Uuid>,
    Json(req): Json<RunScheduleRequest>,
) -> Result<Json<ApiResponse<ScheduleResponse>>, ApiError> {
    let horizon_hours = req.horizon_hours.unwrap_or(state.cfg.controller.default_horizon_hours);
    let date = req.date.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let hint = ForecastSourceHint(req.forecast_source_hint);

    let profile = state.repos.store.load_config(microgrid_id).await.map_err(|e| ApiError::NotFound(e.to_string()))?;
    let forecast_source = ClearSkyForecastSource { location: profile.location };

    let schedule = crate::controller::run_pipeline(&state, &forecast_source, microgrid_id, horizon_hours, date, hint)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ApiResponse::success(ScheduleResponse { schedule })))
}

/// `GET /microgrids/:id/schedule` — latest persisted schedule.
pub async fn get_latest_schedule(
    State(state): State<AppState>,
    Path(microgrid_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ScheduleResponse>>, ApiError> {
    let schedule = state
        .repos
        .store
        .load_latest_schedule(microgrid_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no schedule for microgrid {microgrid_id}")))?;
    Ok(Json(ApiResponse::success(ScheduleResponse { schedule })))
}

/// `GET /microgrids/:id/alerts` — all alerts recorded for the microgrid.
pub async fn get_alerts(
    State(state): State<AppState>,
    Path(microgrid_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Alert>>>, ApiError> {
    let alerts = state.repos.store.load_alerts(microgrid_id).await?;
    Ok(Json(ApiResponse::success(alerts)))
}
