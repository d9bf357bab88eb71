use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::models::VideoProvider;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("request to {url} failed: {message}")]
    Network {
        url: String,
        status: Option<u16>,
        message: String,
    },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    Decryption(String),
    #[error("browser automation failed: {0}")]
    Automation(String),
    #[error("gave up after {depth} nested pages, last one was {url}")]
    DepthExceeded { depth: usize, url: String },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    NetworkFailure,
    ParseFailure,
    DecryptionFailure,
    AutomationFailure,
    DepthExceeded,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::NetworkFailure | FailureKind::AutomationFailure
        )
    }
}

impl ExtractError {
    pub fn network(url: &str, err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let message = if err.is_timeout() {
            "request timed out".to_owned()
        } else {
            err.to_string()
        };
        ExtractError::Network {
            url: url.to_owned(),
            status,
            message,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        ExtractError::Parse(message.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ExtractError::Network { .. } | ExtractError::Timeout(_) => FailureKind::NetworkFailure,
            ExtractError::Parse(_) => FailureKind::ParseFailure,
            ExtractError::Decryption(_) => FailureKind::DecryptionFailure,
            ExtractError::Automation(_) => FailureKind::AutomationFailure,
            ExtractError::DepthExceeded { .. } => FailureKind::DepthExceeded,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            ExtractError::Network { status, .. } => *status,
            _ => None,
        }
    }
}

/// What callers get back when an extraction does not produce a media url.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionFailure {
    pub provider: String,
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub retryable: bool,
    pub fatal: bool,
}

impl ExtractionFailure {
    pub fn new(provider: Option<VideoProvider>, err: &ExtractError) -> Self {
        let kind = err.kind();
        let retryable = kind.is_retryable();
        ExtractionFailure {
            provider: provider
                .map(|p| p.name().to_owned())
                .unwrap_or_else(|| "unknown".to_owned()),
            kind,
            message: err.to_string(),
            http_status: err.http_status(),
            retryable,
            fatal: !retryable,
        }
    }
}

impl std::fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?}): {}", self.provider, self.kind, self.message)
    }
}

impl std::error::Error for ExtractionFailure {}
