//! Cost reporting and budget routes

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use http::StatusCode;
use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::Deserialize;
use tollgate_billing::{CostQueries, LedgerError};
use tollgate_core::{PeriodKind, TimeRange};

use crate::error::ApiError;

pub fn cost_router(queries: CostQueries) -> Router {
    Router::new()
        .route("/v1/costs/today", routing::get(cost_today))
        .route("/v1/costs/by-model", routing::get(cost_by_model))
        .route("/v1/costs/by-category", routing::get(cost_by_category))
        .route("/v1/budget/breaches", routing::get(breaches))
        .route("/v1/budget/thresholds", routing::get(thresholds))
        .route("/v1/budget/thresholds/{period}", routing::put(update_threshold))
        .with_state(queries)
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    from: Option<String>,
    to: Option<String>,
}

impl RangeQuery {
    fn range(&self) -> Result<TimeRange, ApiError> {
        let start = parse_bound("from", self.from.as_deref())?;
        let end = parse_bound("to", self.to.as_deref())?;
        TimeRange::new(start, end)
            .ok_or_else(|| LedgerError::InvalidRange(format!("{end} precedes {start}")).into())
    }
}

fn parse_bound(name: &str, raw: Option<&str>) -> Result<Timestamp, ApiError> {
    let raw = raw.ok_or_else(|| ApiError::InvalidQuery(format!("missing '{name}' parameter")))?;
    raw.parse()
        .map_err(|e| ApiError::InvalidQuery(format!("'{name}' is not an RFC 3339 timestamp: {e}")))
}

#[derive(Debug, Deserialize)]
struct ThresholdUpdate {
    /// `null` removes the threshold
    limit: Option<Decimal>,
}

async fn cost_today(State(queries): State<CostQueries>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(queries.cost_today(Timestamp::now()).await?))
}

async fn cost_by_model(
    State(queries): State<CostQueries>,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(queries.cost_by_model(query.range()?).await?))
}

async fn cost_by_category(
    State(queries): State<CostQueries>,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(queries.cost_by_category(query.range()?).await?))
}

async fn breaches(State(queries): State<CostQueries>) -> Result<impl IntoResponse, ApiError> {
    let breaches = queries.breached(Timestamp::now()).await?;
    Ok(Json(serde_json::json!({ "breaches": breaches })))
}

async fn thresholds(State(queries): State<CostQueries>) -> impl IntoResponse {
    let thresholds: BTreeMap<&str, Decimal> = queries
        .thresholds()
        .into_iter()
        .map(|(kind, limit)| (kind.as_str(), limit))
        .collect();
    Json(serde_json::json!({ "thresholds": thresholds }))
}

async fn update_threshold(
    State(queries): State<CostQueries>,
    Path(period): Path<String>,
    Json(update): Json<ThresholdUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let kind: PeriodKind = period.parse().map_err(ApiError::InvalidQuery)?;
    queries.update_threshold(kind, update.limit)?;

    tracing::info!(period = %kind, limit = ?update.limit, "budget threshold updated");
    Ok(StatusCode::NO_CONTENT)
}
