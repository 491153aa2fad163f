use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer};
use beejchat_server::websocket::{ChatServer, ProtocolGate};
use beejchat_server::{health_check, AppError, AppState, Settings};
use dotenv::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Serves the chat client page that connects back to the relay endpoint
async fn client_page() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(include_str!("../static/index.html"))
}

async fn client_script() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/javascript; charset=utf-8")
        .body(include_str!("../static/chat.js"))
}

#[actix_web::main]
async fn main() -> beejchat_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded successfully");

    let server = Arc::new(ChatServer::new(ProtocolGate::new(
        config.chat.allowed_hosts.clone(),
    )));
    let state = web::Data::new(AppState {
        config: Arc::new(config.clone()),
        registry: server.registry(),
    });

    // Failure to bind either listener is the one fatal startup condition
    let ws_listener =
        TcpListener::bind(format!("{}:{}", config.server.host, config.server.port)).await?;
    info!(
        "Chat relay ready to accept connections at ws://{}:{}",
        config.server.host, config.server.port
    );
    tokio::spawn(server.serve(ws_listener));

    let http_listener =
        std::net::TcpListener::bind(format!("{}:{}", config.server.host, config.http.port))?;
    info!(
        "Serving chat client at http://{}:{}",
        config.server.host, config.http.port
    );

    // Collaborator static file server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET"])
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .route("/", web::get().to(client_page))
            .route("/chat.js", web::get().to(client_script))
            .route("/health", web::get().to(health_check))
    })
    .listen(http_listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok(())
}
