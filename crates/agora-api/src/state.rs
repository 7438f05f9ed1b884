use std::sync::Arc;

use agora_channel::ChannelTree;
use agora_db::Database;
use agora_message::MessageManager;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub messages: MessageManager,
    pub channels: Arc<ChannelTree>,
    pub db: Arc<Database>,
    pub jwt_secret: String,
}
