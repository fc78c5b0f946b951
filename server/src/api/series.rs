use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use ifwatch_core::{InterfaceHandle, MetricKind, TargetHealth};
use serde::{Deserialize, Serialize};

use crate::api::{error::AppError, AppState};

#[derive(Deserialize)]
pub struct SeriesQuery {
    /// Metric name, e.g. `in-octets`. Defaults to `in-octets`.
    pub metric: Option<String>,
    /// Return only the most recent N points.
    pub last: Option<usize>,
}

#[derive(Serialize)]
pub struct SeriesPoint {
    pub at: DateTime<Utc>,
    /// `null` marks a gap (inconsistent counters); a chart must render a
    /// break there, never a zero.
    pub rate: Option<f64>,
}

#[derive(Serialize)]
pub struct SeriesResponse {
    pub target: String,
    pub if_index: u32,
    pub metric: MetricKind,
    pub target_health: TargetHealth,
    /// Set while the owning target is unreachable; the newest points are
    /// then older than they look.
    pub stale: bool,
    /// Empty means no rate has been derived yet ("no data yet").
    pub points: Vec<SeriesPoint>,
}

/// GET /api/v1/targets/{id}/interfaces/{ifindex}/series?metric=in-octets&last=60
pub async fn series(
    State(state): State<AppState>,
    Path((id, if_index)): Path<(String, u32)>,
    Query(q): Query<SeriesQuery>,
) -> Result<Json<SeriesResponse>, AppError> {
    let metric = match q.metric.as_deref() {
        None => MetricKind::InOctets,
        Some(name) => MetricKind::parse(name)
            .ok_or_else(|| AppError::Validation(format!("unknown metric `{name}`")))?,
    };

    let handle = InterfaceHandle {
        target: id.clone(),
        if_index,
    };
    let info = state.registry.interface_info(&handle).ok_or(AppError::NotFound)?;
    let health = state.registry.target_health(&id).ok_or(AppError::NotFound)?;
    let mut points = state
        .registry
        .snapshot(&handle, metric)
        .unwrap_or_default();

    if let Some(last) = q.last {
        if points.len() > last {
            points.drain(..points.len() - last);
        }
    }

    Ok(Json(SeriesResponse {
        target: id,
        if_index,
        metric,
        target_health: health.state,
        stale: info.stale,
        points: points
            .into_iter()
            .map(|p| SeriesPoint {
                at: p.at,
                rate: p.valid.then_some(p.rate),
            })
            .collect(),
    }))
}
