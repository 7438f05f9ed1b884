use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Channel, ChannelEvent, Pin};

// -- JWT Claims --

/// JWT claims checked by the API middleware. Tokens are issued by the
/// external auth service with the same secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pinned: bool,
    pub pin: Option<Pin>,
    pub stamps: Vec<StampCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampCount {
    pub stamp_id: Uuid,
    pub user_id: Uuid,
    pub count: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimelineResponse {
    pub messages: Vec<MessageResponse>,
    pub more: bool,
    pub retrieved_at: DateTime<Utc>,
}

// -- Stamps --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddStampRequest {
    pub count: Option<u32>,
}

// -- Channels --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub name: String,
}

pub type ChannelResponse = Channel;

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelEventsResponse {
    pub events: Vec<ChannelEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
