use axum::{
    extract::{Path, State},
    Json,
};
use ifwatch_core::{InterfaceInfo, TargetOverview};

use crate::api::{error::AppError, AppState};

/// GET /api/v1/targets
///
/// Every monitored target with its current health, consecutive-failure
/// count, last error, and last poll time.
pub async fn list(State(state): State<AppState>) -> Json<Vec<TargetOverview>> {
    Json(state.registry.targets())
}

/// GET /api/v1/targets/{id}/interfaces
///
/// Interfaces known for one target — statically configured or discovered —
/// with labels and staleness.
pub async fn interfaces(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<InterfaceInfo>>, AppError> {
    if !state.registry.contains_target(&id) {
        return Err(AppError::NotFound);
    }
    Ok(Json(state.registry.interfaces_of(&id)))
}
