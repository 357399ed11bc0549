use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::InvalidInput(_) | AppError::InvalidSignature(_) | AppError::NotFound => {
                tracing::warn!(error = %self, "Request rejected");
            }
            _ => tracing::error!(error = ?self, "Request failed"),
        }

        let code = self.code();
        match self {
            AppError::Database(_) => {
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, code, None)
            }
            AppError::InvalidInput(msg) | AppError::InvalidSignature(msg) => {
                error_resp(StatusCode::BAD_REQUEST, code, Some(msg))
            }
            AppError::NotFound => error_resp(StatusCode::NOT_FOUND, code, None),
            AppError::Conflict(_) => error_resp(StatusCode::CONFLICT, code, None),
            AppError::Notification(_) | AppError::Internal(_) => {
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, code, None)
            }
        }
    }
}

pub(crate) fn error_resp(status: StatusCode, code: ErrorCode, message: Option<String>) -> Response {
    let body = match message {
        Some(msg) => serde_json::json!({ "code": code.as_str(), "message": msg }),
        None => serde_json::json!({ "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}
