use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use quotegate_core::{HealthReport, HistoryWindow, PriceRecord, ValidationError};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::envelope::{ApiError, Envelope, ErrorBody};
use crate::AppState;

const HEALTH_MESSAGE: &str = "Vietnamese Stock Price API is running";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub message: &'static str,
    pub backend: HealthReport,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    Json(HealthResponse {
        status: "ok",
        timestamp,
        message: HEALTH_MESSAGE,
        backend: state.facade.health().await,
    })
}

pub async fn latest(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Envelope<PriceRecord>>, ApiError> {
    let record = state.facade.get_latest(&symbol).await?;
    Ok(Json(Envelope::success(record)))
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub symbols: Vec<String>,
}

pub async fn multiple(
    State(state): State<AppState>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<Envelope<BTreeMap<String, Option<PriceRecord>>>>, ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let records = state.facade.get_multiple(&request.symbols).await?;
    Ok(Json(Envelope::success(records)))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub days: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl HistoryParams {
    fn window(&self) -> Result<HistoryWindow, ValidationError> {
        match (&self.start, &self.end, &self.days) {
            (Some(start), Some(end), None) => HistoryWindow::parse_range(start, end),
            (None, None, Some(days)) => {
                let days = days.trim().parse::<i64>().map_err(|_| {
                    ValidationError::InvalidRequest(format!("days must be an integer, got '{days}'"))
                })?;
                HistoryWindow::days(days)
            }
            (None, None, None) => Ok(HistoryWindow::default()),
            (_, _, Some(_)) => Err(ValidationError::InvalidRequest(String::from(
                "use either days or start/end, not both",
            ))),
            _ => Err(ValidationError::InvalidRequest(String::from(
                "start and end must be given together",
            ))),
        }
    }
}

pub async fn history(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Envelope<Vec<PriceRecord>>>, ApiError> {
    let Query(params) = params.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let window = params.window()?;

    let records = state.facade.get_history(&symbol, window).await?;
    if records.is_empty() {
        return Err(ApiError::not_found(format!(
            "No historical data found for {}",
            symbol.trim().to_ascii_uppercase()
        )));
    }
    Ok(Json(Envelope::counted(records)))
}

pub async fn market(
    State(state): State<AppState>,
    Path(market): Path<String>,
) -> Result<Json<Envelope<Vec<PriceRecord>>>, ApiError> {
    let records = state.facade.get_market_snapshot(&market).await?;
    if records.is_empty() {
        return Err(ApiError::not_found(format!(
            "No data found for market {}",
            market.trim().to_ascii_uppercase()
        )));
    }
    Ok(Json(Envelope::counted(records)))
}

pub async fn fallback() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            success: false,
            error: String::from("Endpoint not found"),
            detail: None,
        }),
    )
}
