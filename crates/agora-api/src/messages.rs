use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use agora_message::{CachedMessage, TimelineQuery};
use agora_types::api::{
    Claims, EditMessageRequest, MessageResponse, PostMessageRequest, StampCount, TimelineResponse,
};

use crate::error::{ApiError, blocking};
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;
const MAX_CONTENT_LEN: usize = 10_000;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Default, Deserialize)]
pub struct TimelineParams {
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub inclusive: bool,
    #[serde(default)]
    pub order: Order,
    pub user: Option<Uuid>,
    /// Only channels the caller subscribes to.
    #[serde(default)]
    pub subscribed: bool,
    #[serde(default)]
    pub exclude_dms: bool,
}

impl TimelineParams {
    fn into_query(self, caller: Uuid) -> TimelineQuery {
        TimelineQuery {
            user: self.user,
            channels_subscribed_by_user: self.subscribed.then_some(caller),
            since: self.since,
            until: self.until,
            inclusive: self.inclusive,
            limit: self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: self.offset,
            asc: matches!(self.order, Order::Asc),
            exclude_dms: self.exclude_dms,
            ..Default::default()
        }
    }
}

pub(crate) fn message_response(m: &CachedMessage) -> MessageResponse {
    MessageResponse {
        id: m.id(),
        user_id: m.user_id(),
        channel_id: m.channel_id(),
        content: m.content().to_string(),
        created_at: m.created_at(),
        updated_at: m.updated_at(),
        pinned: m.is_pinned(),
        pin: m.pin().cloned(),
        stamps: m
            .stamps()
            .into_iter()
            .map(|s| StampCount {
                stamp_id: s.stamp_id,
                user_id: s.user_id,
                count: s.count,
            })
            .collect(),
    }
}

/// Load a message the caller may see. Messages in DMs the caller is not a
/// member of read as missing.
pub(crate) fn visible_message(
    state: &AppState,
    message_id: Uuid,
    user_id: Uuid,
) -> Result<Arc<CachedMessage>, ApiError> {
    let message = state.messages.get(message_id)?;
    if !state.channels.can_access(message.channel_id(), user_id) {
        return Err(ApiError::NotFound);
    }
    Ok(message)
}

fn validate_content(content: &str) -> Result<(), ApiError> {
    if content.trim().is_empty() {
        return Err(ApiError::BadRequest("message content is empty"));
    }
    if content.len() > MAX_CONTENT_LEN {
        return Err(ApiError::BadRequest("message content is too long"));
    }
    Ok(())
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let message = blocking(move || visible_message(&state, message_id, claims.sub)).await?;
    Ok(Json(message_response(&message)))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_content(&req.content)?;

    blocking(move || -> Result<(), ApiError> {
        let message = visible_message(&state, message_id, claims.sub)?;
        if message.user_id() != claims.sub {
            return Err(ApiError::Forbidden);
        }
        state.messages.edit(message_id, &req.content)?;
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || -> Result<(), ApiError> {
        let message = visible_message(&state, message_id, claims.sub)?;
        if message.user_id() != claims.sub {
            return Err(ApiError::Forbidden);
        }
        state.messages.delete(message_id)?;
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn post_message(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_content(&req.content)?;

    let message = blocking(move || -> Result<_, ApiError> {
        if !state.channels.can_access(channel_id, claims.sub) {
            return Err(ApiError::NotFound);
        }
        Ok(state.messages.create(channel_id, claims.sub, &req.content)?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message_response(&message))))
}

pub async fn post_direct_message(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_content(&req.content)?;

    let message =
        blocking(move || state.messages.create_dm(claims.sub, user_id, &req.content)).await?;

    Ok((StatusCode::CREATED, Json(message_response(&message))))
}

pub async fn get_channel_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<TimelineParams>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.channels.can_access(channel_id, claims.sub) {
        return Err(ApiError::NotFound);
    }
    let mut query = params.into_query(claims.sub);
    query.channel = Some(channel_id);

    timeline(state, query, claims.sub).await
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<TimelineParams>,
) -> Result<impl IntoResponse, ApiError> {
    timeline(state, params.into_query(claims.sub), claims.sub).await
}

/// DM messages the caller is not a member of are dropped from the page.
async fn timeline(
    state: AppState,
    query: TimelineQuery,
    caller: Uuid,
) -> Result<Json<TimelineResponse>, ApiError> {
    let response = blocking(move || -> Result<TimelineResponse, ApiError> {
        let timeline = state.messages.get_timeline(query)?;
        let messages = timeline
            .records()?
            .iter()
            .filter(|m| state.channels.can_access(m.channel_id(), caller))
            .map(|m| message_response(m))
            .collect();
        Ok(TimelineResponse {
            messages,
            more: timeline.has_more(),
            retrieved_at: timeline.retrieved_at(),
        })
    })
    .await?;

    Ok(Json(response))
}
