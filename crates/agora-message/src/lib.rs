//! Message reads and writes for agora: a read-through cache in front of the
//! store, archive checks on every mutation, and best-effort pin auditing.

mod audit;
pub mod cache;
pub mod error;
pub mod manager;
pub mod message;
pub mod timeline;

#[cfg(test)]
mod testing;

pub use cache::Cache;
pub use error::MessageError;
pub use manager::{ManagerConfig, MessageCache, MessageManager};
pub use message::CachedMessage;
pub use timeline::{Timeline, TimelineQuery};
