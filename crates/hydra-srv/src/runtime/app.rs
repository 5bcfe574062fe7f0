use crate::runtime::config::{ConfigError, RuntimeConfig};
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use hydra_core::{spawn_ticker, ClosureActuator, SimConfig, SimulatedClosure, TimeBase};
use hydra_io::audit::{AuditEventType, AuditLogger};
use hydra_io::auth::{digest_line, AuthError, KnownTokens};
use hydra_io::dispatch::Dispatcher;
use hydra_io::server::{start_server, ServerConfig, ServerError};
use hydra_io::tls::TlsConfig;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Failed to open audit log {path}: {source}")]
    Audit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start tick worker: {0}")]
    Ticker(#[source] std::io::Error),

    #[cfg(feature = "dev-certs")]
    #[error(transparent)]
    Tls(#[from] hydra_io::tls::TlsError),
}

pub fn run_from_args() -> Result<(), AppError> {
    let config = RuntimeConfig::from_env()?;
    if config.show_help {
        RuntimeConfig::print_help();
        return Ok(());
    }
    if let Some(token) = &config.hash_token {
        println!("{}", digest_line(token));
        return Ok(());
    }
    #[cfg(feature = "dev-certs")]
    if let Some(dir) = &config.generate_dev_cert {
        let cert = dir.join("cert.pem");
        let key = dir.join("key.pem");
        hydra_io::tls::generate_dev_cert(&cert, &key)?;
        println!("Wrote {} and {}", cert.display(), key.display());
        return Ok(());
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> Result<(), AppError> {
    config.validate()?;

    init_tracing(config.json_logs);
    telemetry::init();
    let metrics_enabled = config.metrics_addr.is_some();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let known_users_file = config
        .known_users_file
        .as_ref()
        .ok_or(ConfigError::MissingKnownUsers)?;
    let known_tokens = KnownTokens::from_file(known_users_file)?;
    if known_tokens.is_empty() {
        warn!(path = %known_users_file.display(), "No known users; every request will be rejected");
    } else {
        info!(users = known_tokens.len(), "Loaded known users");
    }

    let audit_logger = init_audit_logger(config.audit_path.as_ref())?;
    let timebase = TimeBase::new();

    let sim_config = build_sim_config(&config);
    let sim = Arc::new(SimulatedClosure::new(&sim_config));
    info!(
        tick_ms = sim.tick_period().as_millis(),
        hold_timeout_ms = sim_config.hold_timeout.as_millis(),
        "Starting simulated drive"
    );
    let ticker = spawn_ticker(Arc::clone(&sim)).map_err(AppError::Ticker)?;

    let stop = Arc::new(AtomicBool::new(false));
    install_signal_handler(Arc::clone(&stop));

    let actuator: Arc<dyn ClosureActuator> = sim;
    let updater_handle = telemetry::start_metrics_updater(
        Arc::clone(&actuator),
        ticker.counters(),
        Arc::clone(&stop),
    );

    let dispatcher = Arc::new(
        Dispatcher::new(known_tokens, actuator)
            .with_route_prefix(config.route_prefix.clone())
            .with_audit(audit_logger.clone()),
    );
    let server_handle = start_server(dispatcher, build_server_config(&config), Arc::clone(&stop))?;

    if let Some(ref logger) = audit_logger {
        let _ = logger.log_event(
            timebase.now_us(),
            timebase.unix_us(),
            AuditEventType::SystemStart,
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "plain_http": config.plain_http,
                "metrics_enabled": metrics_enabled,
            }),
        );
    }

    let deadline = config.run_seconds.map(|seconds| {
        info!(seconds, "Running for limited duration");
        Instant::now() + Duration::from_secs(seconds)
    });
    while !stop.load(Ordering::Relaxed) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    info!("Shutting down");
    stop.store(true, Ordering::Relaxed);
    let _ = server_handle.join();
    let _ = updater_handle.join();
    let stats = ticker.shutdown();

    info!(
        ticks_executed = stats.ticks_executed,
        ticks_missed = stats.ticks_missed,
        steps = stats.steps,
        hold_expiries = stats.hold_expiries,
        "Run complete"
    );

    if let Some(ref logger) = audit_logger {
        let _ = logger.log_event(
            timebase.now_us(),
            timebase.unix_us(),
            AuditEventType::SystemShutdown,
            serde_json::json!({
                "ticks_executed": stats.ticks_executed,
                "steps": stats.steps,
                "hold_expiries": stats.hold_expiries,
            }),
        );
    }

    Ok(())
}

fn build_sim_config(config: &RuntimeConfig) -> SimConfig {
    let defaults = SimConfig::default();
    SimConfig {
        tick_period: Duration::from_millis(config.tick_ms),
        hold_timeout: Duration::from_millis(config.hold_timeout_ms),
        error_message: config
            .sim_error_message
            .clone()
            .unwrap_or(defaults.error_message),
    }
}

fn build_server_config(config: &RuntimeConfig) -> ServerConfig {
    ServerConfig {
        bind_addr: config.bind_addr.clone(),
        tls: TlsConfig {
            enabled: !config.plain_http,
            cert_path: config.cert_file.clone().unwrap_or_default(),
            key_path: config.key_file.clone().unwrap_or_default(),
        },
        ..Default::default()
    }
}

fn init_audit_logger(audit_path: Option<&PathBuf>) -> Result<Option<Arc<AuditLogger>>, AppError> {
    let Some(path) = audit_path else {
        return Ok(None);
    };
    let logger = AuditLogger::new(path).map_err(|source| AppError::Audit {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), "Audit logging enabled");
    Ok(Some(Arc::new(logger)))
}

fn install_signal_handler(stop: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Termination signal received");
        stop.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install signal handler; graceful shutdown on Ctrl-C will not be available");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_config_from_flags() {
        let config = RuntimeConfig {
            tick_ms: 20,
            hold_timeout_ms: 60,
            ..RuntimeConfig::default()
        };
        let sim = build_sim_config(&config);
        assert_eq!(sim.tick_period, Duration::from_millis(20));
        assert_eq!(sim.hold_timeout, Duration::from_millis(60));
        assert_eq!(sim.error_message, SimConfig::default().error_message);
    }

    #[test]
    fn test_server_config_tls_follows_plain_http() {
        let config = RuntimeConfig {
            plain_http: true,
            ..RuntimeConfig::default()
        };
        assert!(!build_server_config(&config).tls.enabled);

        let config = RuntimeConfig {
            cert_file: Some("c.pem".to_string()),
            key_file: Some("k.pem".to_string()),
            ..RuntimeConfig::default()
        };
        let server = build_server_config(&config);
        assert!(server.tls.is_configured());
    }
}
