use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::{ErrorReport, RenderError};
use crate::domain::schematic::SchematicError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const INVALID_SCHEMATIC: &str = "invalid_schematic";
    pub const RENDER_TIMEOUT: &str = "render_timeout";
    pub const BACKEND_UNAVAILABLE: &str = "backend_unavailable";
    pub const RENDER: &str = "render_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// API error response: an opaque public body plus a detailed report that the
/// logging middleware picks up from response extensions.
#[derive(Debug)]
pub struct ApiError {
    source: &'static str,
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
        detail: Option<String>,
    ) -> Self {
        Self {
            source,
            status,
            code,
            message,
            hint,
            detail,
        }
    }

    pub fn bad_request(source: &'static str, message: &'static str, hint: Option<String>) -> Self {
        Self::new(
            source,
            StatusCode::BAD_REQUEST,
            codes::BAD_REQUEST,
            message,
            hint.clone(),
            hint,
        )
    }

    pub fn from_schematic_error(source: &'static str, err: SchematicError) -> Self {
        let hint = Some(err.to_string());
        match err {
            SchematicError::TooLarge { .. } => Self::new(
                source,
                StatusCode::PAYLOAD_TOO_LARGE,
                codes::PAYLOAD_TOO_LARGE,
                "Schematic file is too large",
                hint.clone(),
                hint,
            ),
            SchematicError::UnsupportedFormat { .. } | SchematicError::Empty => Self::new(
                source,
                StatusCode::BAD_REQUEST,
                codes::BAD_REQUEST,
                "Invalid schematic upload",
                hint.clone(),
                hint,
            ),
        }
    }

    /// Timeouts stay distinguishable from generic failures so callers can
    /// suggest reducing render complexity; everything else surfaces an
    /// opaque message and logs the detailed cause.
    pub fn from_render_error(source: &'static str, err: RenderError) -> Self {
        let detail = Some(err.to_string());
        match err {
            RenderError::RenderTimeout { .. } => Self::new(
                source,
                StatusCode::GATEWAY_TIMEOUT,
                codes::RENDER_TIMEOUT,
                "Render took too long",
                Some("Try again with a smaller schematic or lower settings".to_string()),
                detail,
            ),
            RenderError::InvalidSchematic { .. } => Self::new(
                source,
                StatusCode::UNPROCESSABLE_ENTITY,
                codes::INVALID_SCHEMATIC,
                "Renderer could not load the schematic",
                Some("Check that the file is a valid schematic".to_string()),
                detail,
            ),
            RenderError::NotInitialized | RenderError::BackendUnavailable => Self::new(
                source,
                StatusCode::SERVICE_UNAVAILABLE,
                codes::BACKEND_UNAVAILABLE,
                "Render backend is not ready",
                Some("Please wait and try again".to_string()),
                detail,
            ),
            RenderError::ContextCreationFailed { .. }
            | RenderError::CapabilityMissing { .. }
            | RenderError::CaptureFailed { .. } => Self::new(
                source,
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::RENDER,
                "Failed to render schematic",
                None,
                detail,
            ),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };

        let mut response = (self.status, Json(body)).into_response();
        let detail = self.detail.unwrap_or_else(|| self.message.to_string());
        ErrorReport::from_message(self.source, self.status, detail).attach(&mut response);
        response
    }
}
