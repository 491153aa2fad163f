pub mod config;
pub mod error;
pub mod websocket;

use std::sync::Arc;

use actix_web::{web, HttpResponse};

pub use config::Settings;
pub use error::{AdmissionError, AppError, WebSocketError};
pub type Result<T> = std::result::Result<T, AppError>;

use websocket::ConnectionRegistry;

/// Health check endpoint handler
/// Returns a JSON response with server status, timestamp, and the number of
/// live chat connections
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let connections = state.registry.connection_count().await;

    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connections": connections,
    }))
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub registry: Arc<ConnectionRegistry>,
}
