use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use agora_types::api::Claims;

use crate::error::{ApiError, blocking};
use crate::messages::visible_message;
use crate::state::AppState;

pub async fn pin_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let pin = blocking(move || -> Result<_, ApiError> {
        visible_message(&state, message_id, claims.sub)?;
        Ok(state.messages.pin(message_id, claims.sub)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(pin)))
}

pub async fn unpin_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || -> Result<_, ApiError> {
        visible_message(&state, message_id, claims.sub)?;
        Ok(state.messages.unpin(message_id, claims.sub)?)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
