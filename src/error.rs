use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NoticError {
    #[error("ticket '{0}' not found")]
    TicketNotFound(String),

    #[error("attachment '{0}' not found")]
    AttachmentNotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("invalid status '{0}'")]
    InvalidStatus(String),

    #[error("'{0}' exceeds the attachment size limit of {1} MB")]
    AttachmentTooLarge(String, u64),

    #[error("attachment error: {0}")]
    Attachment(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("mail transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NoticError>;

impl NoticError {
    /// HTTP status this error maps to when it reaches a route boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            NoticError::TicketNotFound(_) | NoticError::AttachmentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            NoticError::Validation(_) | NoticError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            NoticError::AttachmentTooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for NoticError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let err = NoticError::TicketNotFound("NTC-ABC123".to_string());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "ticket 'NTC-ABC123' not found");
    }

    #[test]
    fn test_validation_maps_to_400() {
        let err = NoticError::Validation("name is required".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = NoticError::InvalidStatus("Done".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_oversize_attachment_maps_to_413() {
        let err = NoticError::AttachmentTooLarge("dump.bin".to_string(), 35);
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(err.to_string().contains("35 MB"));
    }

    #[test]
    fn test_everything_else_maps_to_500() {
        let err = NoticError::Storage("disk full".to_string());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = NoticError::Notification("relay refused".to_string());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
