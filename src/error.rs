/// Why a query produced no fresh data. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("http status {status}")]
    Status { status: u16, body: String },
    #[error("unexpected payload: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Malformed(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid subreddit name. Use only letters, numbers, and underscores.")]
    InvalidSubreddit(String),
    #[error("Type at least {min} characters to search")]
    SearchTooShort { min: usize },
}
