use std::error::Error as StdError;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::Response;
use thiserror::Error;

use crate::infra::error::InfraError;

/// Diagnostic error chain attached to HTTP responses so the logging
/// middleware can report the detailed cause while the body stays opaque.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Failure modes of the render backend.
///
/// Jobs are never retried here; callers decide retry policy and are expected
/// to distinguish [`RenderError::RenderTimeout`] (suggest reducing render
/// complexity) from everything else.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render backend has not been initialized")]
    NotInitialized,
    #[error("render backend did not become ready")]
    BackendUnavailable,
    #[error("failed to create render page: {message}")]
    ContextCreationFailed { message: String },
    #[error("renderer rejected the schematic: {message}")]
    InvalidSchematic { message: String },
    #[error("render did not complete within {}s", timeout.as_secs())]
    RenderTimeout { timeout: Duration },
    #[error("render page is missing capability `{capability}`")]
    CapabilityMissing { capability: String },
    #[error("capture failed: {message}")]
    CaptureFailed { message: String },
}

impl RenderError {
    pub fn creation_failed(message: impl Into<String>) -> Self {
        Self::ContextCreationFailed {
            message: message.into(),
        }
    }

    pub fn invalid_schematic(message: impl Into<String>) -> Self {
        Self::InvalidSchematic {
            message: message.into(),
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::RenderTimeout { timeout }
    }

    pub fn capability_missing(capability: impl Into<String>) -> Self {
        Self::CapabilityMissing {
            capability: capability.into(),
        }
    }

    pub fn capture_failed(message: impl Into<String>) -> Self {
        Self::CaptureFailed {
            message: message.into(),
        }
    }

    /// Whether callers should present this as "took too long" rather than a
    /// generic failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RenderTimeout { .. })
    }

    /// Whether the page that produced this error must be discarded instead of
    /// returned to the pool. A stalled renderer, a failed capture path, or a
    /// stale capability surface leaves the page in an unknown state; a
    /// rejected load does not, because loading always replaces the slot's
    /// previous content.
    pub fn poisons_page(&self) -> bool {
        matches!(
            self,
            Self::RenderTimeout { .. } | Self::CaptureFailed { .. } | Self::CapabilityMissing { .. }
        )
    }
}

/// Top-level failures surfaced by the binary during startup and serve.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
