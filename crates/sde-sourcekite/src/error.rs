//! Sourcekite error types.

/// Coarse classification carried by every [`SourcekiteError`].
///
/// Rejections surfaced through a response future are otherwise
/// indistinguishable to callers, so each error exposes its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The backend binary could not be started.
    SpawnFailure,
    /// A newer request reused the slot before a response arrived.
    Superseded,
    /// The payload could not be parsed.
    MalformedResponse,
    /// The retry ceiling was reached.
    TransportExhausted,
    /// Writing to or reading from the process failed.
    Transport,
    /// Target discovery failed.
    Discovery,
}

/// Errors from sourcekite client operations.
#[derive(Debug, thiserror::Error)]
pub enum SourcekiteError {
    /// Backend process failed to start.
    #[error("failed to start sourcekite: {0}")]
    SpawnFailed(String),

    /// The request's slot was reused by a newer request.
    #[error("fail to process the request[reqid={request_id}]: superseded by a newer request")]
    Superseded {
        /// Id of the evicted request.
        request_id: u64,
    },

    /// The response payload could not be parsed.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A response frame did not start with a decimal request id.
    #[error("wrong format for reqid: {0}")]
    MalformedFrame(String),

    /// The request kept failing after every allowed restart.
    #[error("Request failed too many times ({attempts} attempts). Abort.")]
    TransportExhausted {
        /// Total number of attempts made.
        attempts: u32,
    },

    /// No backend process is currently tracked.
    #[error("sourcekite process is not running")]
    ProcessUnavailable,

    /// The session task is gone.
    #[error("sourcekite session closed")]
    SessionClosed,

    /// I/O error talking to the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Target discovery failed.
    #[error("target discovery failed: {0}")]
    Discovery(String),
}

impl SourcekiteError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourcekiteError::SpawnFailed(_) => ErrorKind::SpawnFailure,
            SourcekiteError::Superseded { .. } => ErrorKind::Superseded,
            SourcekiteError::MalformedResponse(_) | SourcekiteError::MalformedFrame(_) => {
                ErrorKind::MalformedResponse
            }
            SourcekiteError::TransportExhausted { .. } => ErrorKind::TransportExhausted,
            SourcekiteError::ProcessUnavailable
            | SourcekiteError::SessionClosed
            | SourcekiteError::Io(_) => ErrorKind::Transport,
            SourcekiteError::Discovery(_) => ErrorKind::Discovery,
        }
    }

    /// Whether the retry policy may restart the backend and resubmit.
    ///
    /// Spawn failures need user action and parse failures indicate a payload
    /// bug; everything else on the correlation path is retried alike.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Superseded | ErrorKind::Transport)
    }
}
