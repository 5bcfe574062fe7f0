use crate::dispatch::{ApiRequest, ApiResponse, Dispatcher};
use crate::error::RequestError;
use crate::protocol::MAX_BODY_BYTES;
use crate::tls::{load_ssl_config, TlsConfig, TlsError};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tiny_http::{Header, Request, Response, Server};
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("Failed to spawn listener thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub struct ServerConfig {
    pub bind_addr: String,
    pub tls: TlsConfig,
    /// How often the listener checks the stop flag while idle.
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:80".to_string(),
            tls: TlsConfig::default(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Bind the control API listener and serve it on a background thread until
/// `stop` is set. Bind and TLS errors are returned before the thread starts.
pub fn start_server(
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
    stop: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>, ServerError> {
    let server = if config.tls.enabled {
        let ssl = load_ssl_config(&config.tls)?;
        Server::https(&config.bind_addr, ssl)
    } else {
        Server::http(&config.bind_addr)
    }
    .map_err(|e| ServerError::Bind {
        addr: config.bind_addr.clone(),
        reason: e.to_string(),
    })?;

    info!(
        addr = %config.bind_addr,
        tls = config.tls.enabled,
        "Control API listening"
    );

    let handle = thread::Builder::new()
        .name("hydra-http".to_string())
        .spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                match server.recv_timeout(config.poll_interval) {
                    Ok(Some(request)) => spawn_worker(&dispatcher, request),
                    Ok(None) => {}
                    Err(e) => {
                        error!(error = %e, "Control API listener failed");
                        break;
                    }
                }
            }
            info!("Control API listener stopped");
        })?;

    Ok(handle)
}

// Each request gets its own thread so a slow body upload never holds up
// other callers.
fn spawn_worker(dispatcher: &Arc<Dispatcher>, request: Request) {
    let dispatcher = Arc::clone(dispatcher);
    if let Err(e) = thread::Builder::new()
        .name("hydra-req".to_string())
        .spawn(move || serve_request(&dispatcher, request))
    {
        error!(error = %e, "Failed to spawn request worker");
    }
}

fn serve_request(dispatcher: &Dispatcher, mut request: Request) {
    let authorization = request
        .headers()
        .iter()
        .filter(|h| h.field.equiv("Authorization"))
        .map(|h| h.value.as_str().to_string())
        .collect();

    // One byte over the limit is enough for the dispatcher to reject it.
    let mut body = Vec::new();
    let read = request
        .as_reader()
        .take(MAX_BODY_BYTES as u64 + 1)
        .read_to_end(&mut body);

    let response = match read {
        Ok(_) => dispatcher.handle(&ApiRequest {
            method: request.method().as_str().to_string(),
            path: request.url().to_string(),
            authorization,
            body,
        }),
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            ApiResponse::from_error(&RequestError::invalid_argument(format!(
                "can not read request body: {e}"
            )))
        }
    };

    if let Err(e) = request.respond(to_http(response)) {
        warn!(error = %e, "Failed to send response");
    }
}

fn to_http(response: ApiResponse) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut http = Response::from_data(response.body).with_status_code(response.status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], response.content_type.as_bytes())
    {
        http.add_header(header);
    }
    http
}
