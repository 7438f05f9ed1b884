use axum::{
    Extension,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use agora_types::api::{AddStampRequest, Claims};

use crate::error::{ApiError, blocking};
use crate::messages::visible_message;
use crate::state::AppState;

const MAX_STAMPS_PER_REQUEST: u32 = 100;

/// The body is optional; an empty one adds a single stamp.
pub async fn add_stamp(
    State(state): State<AppState>,
    Path((message_id, stamp_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: AddStampRequest = if body.is_empty() {
        AddStampRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|_| ApiError::BadRequest("invalid stamp body"))?
    };

    let count = req.count.unwrap_or(1);
    if count == 0 || count > MAX_STAMPS_PER_REQUEST {
        return Err(ApiError::BadRequest("stamp count out of range"));
    }

    blocking(move || -> Result<_, ApiError> {
        visible_message(&state, message_id, claims.sub)?;
        Ok(state
            .messages
            .add_stamps(message_id, stamp_id, claims.sub, count)?)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_stamp(
    State(state): State<AppState>,
    Path((message_id, stamp_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || -> Result<_, ApiError> {
        visible_message(&state, message_id, claims.sub)?;
        Ok(state.messages.remove_stamps(message_id, stamp_id, claims.sub)?)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
