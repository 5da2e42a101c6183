use thiserror::Error;

/// Outcomes a caller of the resolution pipeline can observe besides success.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("no media urls found")]
    NoMediaUrlsFound,
    #[error("not found: {uri}")]
    NotFound { uri: String },
    #[error("transport failure for {uri}: {reason}")]
    Transport { uri: String, reason: String },
    #[error("malformed on-chain payload for {handler}: {reason}")]
    MalformedOnChainPayload {
        handler: &'static str,
        reason: String,
    },
    #[error("no custom metadata handler for contract")]
    NoCustomMetadataHandler,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl MediaError {
    pub fn transport(uri: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            uri: uri.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(handler: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedOnChainPayload {
            handler,
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// A dispatch miss is a signal to use the generic pipeline, not a failure.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::NoCustomMetadataHandler)
    }
}

impl From<tokio::time::error::Elapsed> for MediaError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::DeadlineExceeded
    }
}
