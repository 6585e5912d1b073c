use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use thiserror::Error;
use tracing::error;

use super::responses::Toast;
use crate::api::ClientError;
use crate::services::gallery::UploadError;
use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("please sign in to continue")]
    Unauthorized,
    #[error("you do not have access to this area")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("upload exceeds the size limit")]
    PayloadTooLarge,
    /// The booking API refused the request; status and body are passed on.
    #[error("{message}")]
    Backend {
        status: StatusCode,
        message: String,
        body: Value,
    },
    #[error("booking service is unavailable, please try again")]
    BadGateway,
    #[error("{0}")]
    Failed(&'static str),
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Backend { status, .. } => *status,
            ApiError::BadGateway => StatusCode::BAD_GATEWAY,
            ApiError::Failed(_) | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::MissingToken => ApiError::Unauthorized,
            ClientError::Api {
                status,
                message,
                body,
            } => ApiError::Backend {
                status: StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
                message,
                body,
            },
            ClientError::Transport { .. } | ClientError::Decode { .. } => ApiError::BadGateway,
            ClientError::Build(source) => {
                error!(error = %source, "http client misconfigured");
                ApiError::Internal
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NoUser => ApiError::Unauthorized,
            SessionError::EmptyToken => {
                error!("booking api issued an empty token");
                ApiError::BadGateway
            }
            other => {
                error!(error = %other, "session update failed");
                ApiError::Internal
            }
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let mut body = serde_json::json!({
            "error": message,
            "toast": Toast::error(message.clone()),
        });
        if let ApiError::Backend {
            body: details @ (Value::Object(_) | Value::String(_)),
            ..
        } = self
        {
            body["details"] = details;
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::ApiError;
    use crate::api::ClientError;

    #[test]
    fn backend_errors_keep_status_and_message() {
        let err = ApiError::from(ClientError::Api {
            status: reqwest::StatusCode::UNPROCESSABLE_ENTITY,
            message: String::from("Date is in the past"),
            body: json!({"message": "Date is in the past"}),
        });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.to_string(), "Date is in the past");
    }

    #[test]
    fn missing_token_maps_to_unauthorized() {
        assert_eq!(
            ApiError::from(ClientError::MissingToken).status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
