use thiserror::Error;

/// Domain errors raised by the screener core and its collaborators
#[derive(Debug, Error)]
pub enum ScreenerError {
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("malformed feed message: {0}")]
    MalformedMessage(String),

    #[error("history API error ({status}): {body}")]
    HistoryApi { status: u16, body: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("tick channel closed")]
    ChannelClosed,
}

impl ScreenerError {
    pub(crate) fn poisoned<E: std::fmt::Display>(e: E) -> Self {
        ScreenerError::LockPoisoned(e.to_string())
    }
}
