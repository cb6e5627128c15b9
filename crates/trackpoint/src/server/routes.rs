//! Request handlers for the collector endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use super::AppState;
use super::response::ApiError;
use crate::error::{Error, Result};
use crate::event::{CollectRequest, EventFilter, TimeRange, parse_bound};

type ApiResult = std::result::Result<Json<JsonValue>, ApiError>;

/// Query string accepted by `GET /events`.
#[derive(Debug, Default, Deserialize)]
#[allow(missing_docs)]
pub struct EventsParams {
    pub event_name: Option<String>,
    pub client_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Query string accepted by `GET /stats`.
#[derive(Debug, Default, Deserialize)]
#[allow(missing_docs)]
pub struct StatsParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// `POST /collect`
pub async fn collect_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CollectRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let id = state.ingest.collect(request).await?;
    debug!(event_id = id, "Event stored");

    Ok(Json(json!({
        "success": true,
        "event_id": id,
        "message": "Event stored",
    })))
}

/// `GET /events`
pub async fn events_handler(
    State(state): State<AppState>,
    params: std::result::Result<Query<EventsParams>, QueryRejection>,
) -> ApiResult {
    let Query(params) = params?;
    let filter = state.event_filter(params)?;
    let (limit, offset) = (filter.limit, filter.offset);

    let store = Arc::clone(&state.store);
    let rows = tokio::task::spawn_blocking(move || store.query(&filter))
        .await
        .map_err(|e| Error::internal(format!("event query task failed: {e}")))??;

    Ok(Json(json!({
        "success": true,
        "count": rows.len(),
        "data": rows,
        "limit": limit,
        "offset": offset,
    })))
}

/// `GET /stats`
pub async fn stats_handler(
    State(state): State<AppState>,
    params: std::result::Result<Query<StatsParams>, QueryRejection>,
) -> ApiResult {
    let Query(params) = params?;
    let range = time_range(params.start_date.as_deref(), params.end_date.as_deref())?;
    let stats = state.aggregation.stats(range).await?;

    Ok(Json(json!({
        "success": true,
        "stats": stats,
    })))
}

/// `GET /realtime`
pub async fn realtime_handler(State(state): State<AppState>) -> ApiResult {
    let realtime = state.aggregation.realtime().await?;

    Ok(Json(json!({
        "success": true,
        "realtime": realtime,
    })))
}

impl AppState {
    fn event_filter(&self, params: EventsParams) -> Result<EventFilter> {
        Ok(EventFilter {
            event_name: non_empty(params.event_name),
            client_id: non_empty(params.client_id),
            user_id: non_empty(params.user_id),
            session_id: non_empty(params.session_id),
            range: time_range(params.start_date.as_deref(), params.end_date.as_deref())?,
            limit: params
                .limit
                .unwrap_or(self.default_page_size)
                .min(self.max_page_size),
            offset: params.offset.unwrap_or(0),
        })
    }
}

/// Build a range from optional bounds; each bound applies on its own.
fn time_range(start: Option<&str>, end: Option<&str>) -> Result<TimeRange> {
    let start = non_empty_str(start)
        .map(|s| parse_bound("start_date", s, false))
        .transpose()?;
    let end = non_empty_str(end)
        .map(|s| parse_bound("end_date", s, true))
        .transpose()?;
    Ok(TimeRange { start, end })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_empty_str(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_time_range_bounds_are_independent() {
        let range = time_range(Some("2024-01-01"), None).unwrap();
        assert!(range.start.is_some());
        assert!(range.end.is_none());

        let range = time_range(None, Some("2024-01-31")).unwrap();
        assert!(range.start.is_none());
        assert_eq!(
            range.end,
            Some(Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap() + chrono::TimeDelta::milliseconds(999))
        );
    }

    #[test]
    fn test_time_range_empty_strings_are_absent() {
        assert_eq!(time_range(Some(""), Some("  ")).unwrap(), TimeRange::unbounded());
    }

    #[test]
    fn test_time_range_rejects_garbage() {
        let err = time_range(Some("last tuesday"), None).unwrap_err();
        assert!(matches!(err, Error::InvalidField { field: "start_date", .. }));
    }
}
