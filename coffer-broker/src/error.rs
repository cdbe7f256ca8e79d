use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::telemetry::{CORRELATION_ID_HEADER, CorrelationId, correlation_header_value};

#[derive(Debug, Error)]
pub enum AppErrorKind {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("the requested resource has expired")]
    Gone,
    #[error("{0}")]
    SignatureInvalid(String),
    #[error("unexpected error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
#[error("{kind}")]
pub struct AppError {
    kind: AppErrorKind,
    correlation_id: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, id: String) -> Self {
        self.correlation_id = Some(id);
        self
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            AppErrorKind::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::NotFound => StatusCode::NOT_FOUND,
            AppErrorKind::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppErrorKind::Conflict(_) => StatusCode::CONFLICT,
            AppErrorKind::Gone => StatusCode::GONE,
            AppErrorKind::SignatureInvalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppErrorKind::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn unauthorized<T: Into<String>>(message: T) -> Self {
        Self::new(AppErrorKind::Unauthorized(message.into()))
    }

    pub fn bad_request<T: Into<String>>(message: T) -> Self {
        Self::new(AppErrorKind::BadRequest(message.into()))
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    correlation_id: Option<&'a str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let correlation = self.correlation_id.clone();
        let body = Json(ErrorBody {
            error: match &self.kind {
                AppErrorKind::BadRequest(_) => "bad_request",
                AppErrorKind::NotFound => "not_found",
                AppErrorKind::Unauthorized(_) => "unauthorized",
                AppErrorKind::Conflict(_) => "conflict",
                AppErrorKind::Gone => "gone",
                AppErrorKind::SignatureInvalid(_) => "signature_invalid",
                AppErrorKind::Internal(_) => "internal",
            },
            message: self.kind.to_string(),
            correlation_id: correlation.as_deref(),
        });

        let mut response = (status, body).into_response();
        if let Some(id) = correlation {
            response
                .headers_mut()
                .insert(CORRELATION_ID_HEADER, correlation_header_value(&id));
        }
        response
    }
}

impl From<coffer_core::Error> for AppError {
    fn from(value: coffer_core::Error) -> Self {
        let kind = match value {
            coffer_core::Error::InvalidName { .. } | coffer_core::Error::InvalidExpiry { .. } => {
                AppErrorKind::BadRequest(value.to_string())
            }
            coffer_core::Error::NotFound { .. } => AppErrorKind::NotFound,
            coffer_core::Error::AlreadyExists { .. } | coffer_core::Error::Conflict { .. } => {
                AppErrorKind::Conflict(value.to_string())
            }
            coffer_core::Error::SignatureInvalid { .. } => {
                AppErrorKind::SignatureInvalid(value.to_string())
            }
            coffer_core::Error::Crypto(message) | coffer_core::Error::Storage(message) => {
                AppErrorKind::Internal(message)
            }
        };
        AppError::new(kind)
    }
}

pub fn attach_correlation(err: AppError, correlation: &CorrelationId) -> AppError {
    err.with_correlation(correlation.0.clone())
}
