use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use agora_types::api::{ChannelEventsResponse, Claims, CreateChannelRequest};

use crate::error::{ApiError, blocking};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn create_channel(
    State(state): State<AppState>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() || name.len() > 32 {
        return Err(ApiError::BadRequest("channel name must be 1-32 characters"));
    }

    let channel = blocking(move || state.channels.create_channel(&name)).await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn archive_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || state.channels.archive(channel_id, claims.sub)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unarchive_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || state.channels.unarchive(channel_id, claims.sub)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn subscribe_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || state.channels.subscribe(claims.sub, channel_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Audit trail of a channel, newest first.
pub async fn list_channel_events(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.clamp(1, 200);

    let events = blocking(move || -> Result<_, ApiError> {
        if !state.channels.can_access(channel_id, claims.sub) {
            return Err(ApiError::NotFound);
        }
        Ok(state.db.list_channel_events(channel_id, limit)?)
    })
    .await?;

    Ok(Json(ChannelEventsResponse { events }))
}
