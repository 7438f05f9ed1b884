use agora_channel::ChannelError;
use agora_db::RepoError;

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("channel archived")]
    ChannelArchived,
    #[error("failed to {op}")]
    Store {
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("drain cancelled with audit writes still pending")]
    DrainCancelled,
}

impl MessageError {
    pub(crate) fn store(op: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Store {
            op,
            source: source.into(),
        }
    }

    /// Map a store error onto the manager's taxonomy, keeping the store
    /// sentinels and wrapping everything else with the failing operation.
    pub(crate) fn from_repo(op: &'static str, e: RepoError) -> Self {
        match e {
            RepoError::NotFound => Self::NotFound,
            RepoError::AlreadyExists => Self::AlreadyExists,
            e => Self::store(op, e),
        }
    }

    pub(crate) fn from_channel(op: &'static str, e: ChannelError) -> Self {
        match e {
            ChannelError::NotFound => Self::NotFound,
            e => Self::store(op, e),
        }
    }
}

pub type Result<T, E = MessageError> = std::result::Result<T, E>;
