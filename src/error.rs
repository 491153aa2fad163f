use thiserror::Error;
use tokio_tungstenite::tungstenite::handshake::server::ErrorResponse;
use tokio_tungstenite::tungstenite::http::StatusCode;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Admission error: {0}")]
    AdmissionError(#[from] AdmissionError),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] WebSocketError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

/// Reasons a handshake is turned away before any session exists.
#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("Origin not allowed: {0}")]
    ForbiddenOrigin(String),

    #[error("Unsupported subprotocol: {0}")]
    UnsupportedProtocol(String),
}

impl AdmissionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdmissionError::ForbiddenOrigin(_) => StatusCode::FORBIDDEN,
            AdmissionError::UnsupportedProtocol(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Handshake response sent back to the requester on rejection.
    pub fn into_response(self) -> ErrorResponse {
        let mut response = ErrorResponse::new(Some(self.to_string()));
        *response.status_mut() = self.status_code();
        response
    }
}

#[derive(Error, Debug)]
pub enum WebSocketError {
    #[error("Message serialization failed: {0}")]
    SerializeError(String),

    #[error("Message sending failed: {0}")]
    SendError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::AddrInUse, "address in use");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::InternalError(_)));

        let config_err = config::ConfigError::NotFound(String::from("key not found"));
        let app_err: AppError = config_err.into();
        assert!(matches!(app_err, AppError::ConfigError(_)));

        let adm_err = AdmissionError::ForbiddenOrigin("evil.example".to_string());
        let app_err: AppError = adm_err.into();
        assert!(matches!(app_err, AppError::AdmissionError(_)));
    }

    #[test]
    fn test_admission_status_codes() {
        let err = AdmissionError::ForbiddenOrigin("evil.example".to_string());
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err = AdmissionError::UnsupportedProtocol("other-protocol".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_admission_rejection_response() {
        let response = AdmissionError::UnsupportedProtocol("other-protocol".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.body().as_deref().unwrap().contains("other-protocol"));
    }

    #[test]
    fn test_error_display() {
        let err = AppError::InternalError("test error".to_string());
        assert_eq!(err.to_string(), "Internal server error: test error");

        let err = AppError::AdmissionError(AdmissionError::ForbiddenOrigin(
            "evil.example".to_string(),
        ));
        assert_eq!(err.to_string(), "Admission error: Origin not allowed: evil.example");
    }
}
