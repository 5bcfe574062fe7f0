//! Prometheus metrics for the closure controller.
//!
//! This module provides metrics for the control API, the tick worker and
//! the last observed actuator state.

use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn register_counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
}

fn register_gauge(name: &str, help: &str) -> Gauge {
    let gauge = Gauge::new(name, help).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
}

// ============================================================================
// Control API Metrics
// ============================================================================

pub static REQUESTS_HANDLED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_counter(
        "hydra_requests_handled_total",
        "Control requests answered with 200",
    )
});

pub static REQUESTS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_counter(
        "hydra_requests_failed_total",
        "Control requests answered with an error status",
    )
});

/// Requests without exactly one bearer credential
pub static AUTH_MISSING: LazyLock<IntCounter> = LazyLock::new(|| {
    register_counter(
        "hydra_auth_missing_total",
        "Requests rejected due to a missing or malformed Authorization header",
    )
});

/// Requests with a bearer token that is not known
pub static AUTH_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    register_counter(
        "hydra_auth_failures_total",
        "Requests rejected due to an unknown bearer token",
    )
});

// ============================================================================
// Tick Worker Metrics
// ============================================================================

pub static TICKS_EXECUTED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_counter("hydra_ticks_executed_total", "Drive ticks executed")
});

pub static TICKS_MISSED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_counter(
        "hydra_ticks_missed_total",
        "Drive ticks that started later than one period after the previous one",
    )
});

pub static POSITION_STEPS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_counter("hydra_position_steps_total", "Single-unit position steps")
});

pub static END_STOPS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_counter(
        "hydra_end_stops_total",
        "Drives that stopped because the closure reached an end",
    )
});

pub static HOLD_EXPIRIES: LazyLock<IntCounter> = LazyLock::new(|| {
    register_counter(
        "hydra_hold_expiries_total",
        "Hold commands that expired without being refreshed",
    )
});

// ============================================================================
// Actuator State Metrics
// ============================================================================

/// Coarse position (0=closed,1=inbetween,2=open)
pub static ACTUATOR_POSITION: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge(
        "hydra_actuator_position",
        "Coarse position (0=closed,1=inbetween,2=open)",
    )
});

/// Actuator status (0=idle,1=driving,2=error)
pub static ACTUATOR_STATUS: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge(
        "hydra_actuator_status",
        "Actuator status (0=idle,1=driving,2=error)",
    )
});

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            let response = match request.url() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let mut buffer = Vec::new();
                    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        Response::from_string("Internal Server Error").with_status_code(500)
                    } else {
                        let mut response = Response::from_data(buffer);
                        if let Ok(header) = tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        ) {
                            response.add_header(header);
                        }
                        response
                    }
                }
                "/health" => Response::from_string("OK"),
                // Ready once the drive has ticked at least once
                "/ready" if TICKS_EXECUTED.get() > 0 => Response::from_string("Ready"),
                "/ready" => Response::from_string("Not Ready").with_status_code(503),
                _ => Response::from_string("Not Found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = REQUESTS_HANDLED.get();
    let _ = REQUESTS_FAILED.get();
    let _ = AUTH_MISSING.get();
    let _ = AUTH_FAILURES.get();
    let _ = TICKS_EXECUTED.get();
    let _ = TICKS_MISSED.get();
    let _ = POSITION_STEPS.get();
    let _ = END_STOPS.get();
    let _ = HOLD_EXPIRIES.get();
    let _ = ACTUATOR_POSITION.get();
    let _ = ACTUATOR_STATUS.get();
}
