//! HTTP status endpoint.
//!
//! Serves the latest link snapshot as JSON on `GET /status`. The main loop
//! publishes into a shared [`StatusBoard`]; the server thread only reads it.
//! Uses `tiny_http` which works on both host and ESP32 (via std::net).
//!
//! # Example Response
//!
//! ```json
//! {
//!   "uptime_secs": 42,
//!   "link": { "state": "connected", "ssid": "home", "ip": "192.168.1.20", ... },
//!   "tunnel": "up"
//! }
//! ```

use crate::link::LinkDiagnostics;
use crate::tunnel::TunnelStatus;
use log::{error, info, warn};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tiny_http::{Header, Method, Response, Server};

/// Default port for the status server.
pub const DEFAULT_STATUS_PORT: u16 = 8080;

/// Latest published state, shared between the main loop and the server.
#[derive(Debug)]
pub struct StatusBoard {
    start_time: Instant,
    link: Mutex<LinkDiagnostics>,
    tunnel: Mutex<Option<TunnelStatus>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            link: Mutex::new(LinkDiagnostics::default()),
            tunnel: Mutex::new(None),
        }
    }

    pub fn publish(&self, diagnostics: LinkDiagnostics) {
        *self.link.lock().unwrap_or_else(PoisonError::into_inner) = diagnostics;
    }

    pub fn publish_tunnel(&self, status: TunnelStatus) {
        *self.tunnel.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
    }

    pub fn link(&self) -> LinkDiagnostics {
        self.link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn to_json(&self) -> String {
        let tunnel = match *self.tunnel.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(status) => format!("\"{}\"", status),
            None => "null".to_string(),
        };
        format!(
            r#"{{"uptime_secs":{},"link":{},"tunnel":{}}}"#,
            self.uptime_secs(),
            self.link().to_json(),
            tunnel
        )
    }
}

struct Headers {
    json: Header,
    location: Header,
    allow_get: Header,
}

impl Headers {
    fn new() -> io::Result<Self> {
        let parse = |raw: &str| {
            raw.parse::<Header>()
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, raw.to_string()))
        };
        Ok(Self {
            json: parse("Content-Type: application/json")?,
            location: parse("Location: /status")?,
            allow_get: parse("Allow: GET")?,
        })
    }
}

/// HTTP status server.
///
/// Runs in a background thread. Drop it to stop the server.
pub struct StatusServer {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
}

impl StatusServer {
    /// Start serving `board`.
    ///
    /// `bind_addr` of `None` listens on all interfaces. Port 0 picks a free
    /// port; see [`local_addr`](Self::local_addr).
    pub fn start(bind_addr: Option<IpAddr>, port: u16, board: Arc<StatusBoard>) -> io::Result<Self> {
        let addr = match bind_addr {
            Some(ip) => format!("{}:{}", ip, port),
            None => format!("0.0.0.0:{}", port),
        };

        let headers = Headers::new()?;
        let server = Server::http(&addr)
            .map_err(|e| io::Error::new(io::ErrorKind::AddrInUse, format!("{}", e)))?;
        let local_addr = server.server_addr().to_ip();

        info!("Status server listening on http://{}/status", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let handle = thread::Builder::new()
            .name("status-http".into())
            .spawn(move || Self::run_server(server, board, headers, shutdown_clone))?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn run_server(server: Server, board: Arc<StatusBoard>, headers: Headers, shutdown: Arc<AtomicBool>) {
        loop {
            if shutdown.load(Ordering::Acquire) {
                info!("Status server shutting down");
                break;
            }

            let request = match server.recv_timeout(Duration::from_millis(100)) {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(e) => {
                    error!("Server error: {}", e);
                    break;
                }
            };

            let response = if request.method() != &Method::Get {
                Response::from_string("Method Not Allowed")
                    .with_status_code(405)
                    .with_header(headers.allow_get.clone())
            } else {
                match request.url() {
                    "/status" | "/status/" => Response::from_string(board.to_json())
                        .with_header(headers.json.clone())
                        .with_status_code(200),
                    "/" => Response::from_string("See /status for link state")
                        .with_status_code(302)
                        .with_header(headers.location.clone()),
                    _ => Response::from_string("Not Found").with_status_code(404),
                }
            };

            if let Err(e) = request.respond(response) {
                warn!("Failed to send response: {}", e);
            }
        }
    }

    /// Stop the server. May take up to 100ms due to polling interval.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatusServer {
    fn drop(&mut self) {
        self.stop();
    }
}
