//! Synchronous invocation: `POST /invocations/{*name}` with the source image
//! as the request body.

use crate::{
    errors::AppError,
    services::worker_service::{Completed, Trigger},
    state::AppState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};

/// Largest accepted request body for an invocation.
pub const MAX_INVOCATION_BYTES: usize = 64 * 1024 * 1024;

/// 200 with the written keys, 422 when the name fails validation, 500 when
/// processing or cleanup failed.
pub async fn invoke(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Bytes,
) -> Result<Json<Completed>, AppError> {
    let completed = state.worker.handle(Trigger::new(name, payload)).await?;
    Ok(Json(completed))
}
