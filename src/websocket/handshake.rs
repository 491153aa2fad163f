use std::net::SocketAddr;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tracing::{info, warn};
use url::Url;

use crate::error::AdmissionError;
use crate::websocket::CHAT_PROTOCOL;

/// Admission control for pending handshakes. Decides accept or reject before
/// any session exists; never touches the registry.
#[derive(Debug, Clone)]
pub struct ProtocolGate {
    allowed_hosts: Vec<String>,
}

impl ProtocolGate {
    pub fn new(allowed_hosts: Vec<String>) -> Self {
        Self { allowed_hosts }
    }

    /// Handshake callback for `accept_hdr_async`. On acceptance the 101
    /// response echoes the negotiated subprotocol and the request's origin;
    /// on rejection the requester gets an explicit 403 or 400.
    pub fn screen(
        &self,
        request: &Request,
        mut response: Response,
        addr: SocketAddr,
    ) -> Result<Response, ErrorResponse> {
        match self.admit(request) {
            Ok(origin) => {
                let headers = response.headers_mut();
                headers.insert(
                    header::SEC_WEBSOCKET_PROTOCOL,
                    HeaderValue::from_static(CHAT_PROTOCOL),
                );
                if let Some(origin) = origin {
                    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
                }
                info!("Accepted {} handshake from {}", CHAT_PROTOCOL, addr);
                Ok(response)
            }
            Err(e) => {
                warn!("Rejected handshake from {}: {}", addr, e);
                Err(e.into_response())
            }
        }
    }

    /// Pure admission decision. Returns the request's `Origin` header value
    /// for echoing when present.
    pub fn admit(&self, request: &Request) -> Result<Option<HeaderValue>, AdmissionError> {
        let origin = request.headers().get(header::ORIGIN);

        // Browsers send an Origin; other clients are matched on Host.
        let host = match origin {
            Some(value) => value.to_str().ok().and_then(origin_authority),
            None => request
                .headers()
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        };

        match host {
            Some(ref host) if self.allowed_hosts.iter().any(|allowed| allowed == host) => {}
            other => {
                return Err(AdmissionError::ForbiddenOrigin(
                    other.unwrap_or_else(|| "unknown".to_string()),
                ))
            }
        }

        let requested = requested_protocols(request);
        if !requested.iter().any(|p| p == CHAT_PROTOCOL) {
            return Err(AdmissionError::UnsupportedProtocol(requested.join(", ")));
        }

        Ok(origin.cloned())
    }
}

/// `host:port` part of an Origin value, e.g. "http://localhost:3490" ->
/// "localhost:3490". Scheme default ports are filled in.
fn origin_authority(origin: &str) -> Option<String> {
    let url = Url::parse(origin).ok()?;
    let host = url.host_str()?;
    Some(match url.port_or_known_default() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// All subprotocols offered by the request. The header may repeat and each
/// value may carry a comma-separated list.
fn requested_protocols(request: &Request) -> Vec<String> {
    request
        .headers()
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}
