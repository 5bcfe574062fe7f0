use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Need --known-users-file")]
    MissingKnownUsers,

    #[error("HTTPS needs --cert-file and --key-file (or pass --plain-http)")]
    MissingTlsFiles,

    #[error("Missing value for {0}")]
    MissingValue(String),

    #[error("Invalid value '{value}' for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("Unknown option {0}")]
    UnknownOption(String),
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<u64>,
    pub bind_addr: String,
    pub plain_http: bool,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub known_users_file: Option<PathBuf>,
    pub route_prefix: String,
    pub tick_ms: u64,
    pub hold_timeout_ms: u64,
    pub sim_error_message: Option<String>,
    pub json_logs: bool,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
    pub hash_token: Option<String>,
    #[cfg(feature = "dev-certs")]
    pub generate_dev_cert: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            run_seconds: None,
            bind_addr: "0.0.0.0:80".to_string(),
            plain_http: false,
            cert_file: None,
            key_file: None,
            known_users_file: None,
            route_prefix: String::new(),
            tick_ms: 500,
            hold_timeout_ms: 1500,
            sim_error_message: None,
            json_logs: false,
            metrics_addr: None,
            audit_path: None,
            hash_token: None,
            #[cfg(feature = "dev-certs")]
            generate_dev_cert: None,
        }
    }
}

fn value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str, ConfigError> {
    let flag = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingValue(flag.clone()))
}

fn number<T: std::str::FromStr>(args: &[String], i: &mut usize) -> Result<T, ConfigError> {
    let flag = args[*i].clone();
    let raw = value(args, i)?;
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        flag,
        value: raw.to_string(),
    })
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--run-seconds" => cfg.run_seconds = Some(number(args, &mut i)?),
                "--bind" => cfg.bind_addr = value(args, &mut i)?.to_string(),
                "--port" => {
                    let port: u16 = number(args, &mut i)?;
                    cfg.bind_addr = format!("0.0.0.0:{port}");
                }
                "--plain-http" => cfg.plain_http = true,
                "--cert-file" => cfg.cert_file = Some(value(args, &mut i)?.to_string()),
                "--key-file" => cfg.key_file = Some(value(args, &mut i)?.to_string()),
                "--known-users-file" => {
                    cfg.known_users_file = Some(PathBuf::from(value(args, &mut i)?));
                }
                "--route-prefix" => cfg.route_prefix = value(args, &mut i)?.to_string(),
                "--tick-ms" => cfg.tick_ms = number(args, &mut i)?,
                "--hold-timeout-ms" => cfg.hold_timeout_ms = number(args, &mut i)?,
                "--sim-error-message" => {
                    cfg.sim_error_message = Some(value(args, &mut i)?.to_string());
                }
                "--json-logs" => cfg.json_logs = true,
                "--metrics-addr" => cfg.metrics_addr = Some(value(args, &mut i)?.to_string()),
                "--audit-log" => cfg.audit_path = Some(PathBuf::from(value(args, &mut i)?)),
                "--hash-token" => cfg.hash_token = Some(value(args, &mut i)?.to_string()),
                #[cfg(feature = "dev-certs")]
                "--generate-dev-cert" => {
                    cfg.generate_dev_cert = Some(PathBuf::from(value(args, &mut i)?));
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                other => return Err(ConfigError::UnknownOption(other.to_string())),
            }
            i += 1;
        }
        Ok(cfg)
    }

    /// Checks that only apply when the server is actually started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.known_users_file.is_none() {
            return Err(ConfigError::MissingKnownUsers);
        }
        if !self.plain_http && (self.cert_file.is_none() || self.key_file.is_none()) {
            return Err(ConfigError::MissingTlsFiles);
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::InvalidValue {
                flag: "--tick-ms".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn print_help() {
        println!(
            r#"hydra-srv - Remote control service for a motorized gate

USAGE:
    hydra-srv --known-users-file <PATH> [OPTIONS]

OPTIONS:
    --known-users-file <PATH> Bearer tokens allowed to use the API (one per line)
    --bind <ADDR>             Listen address [default: 0.0.0.0:80]
    --port <PORT>             Shorthand for --bind 0.0.0.0:<PORT>
    --plain-http              Serve plain HTTP instead of HTTPS
    --cert-file <PATH>        Server certificate (PEM) for HTTPS
    --key-file <PATH>         Server private key (PEM) for HTTPS
    --route-prefix <PREFIX>   Path prefix in front of /{{env}}/{{cmd}} (e.g. /ctl)
    --tick-ms <MS>            Simulated drive tick period [default: 500]
    --hold-timeout-ms <MS>    Hold command expiry [default: 1500]
    --sim-error-message <STR> Message reported for injected errors
    --run-seconds <SECS>      Run for a fixed duration then exit
    --json-logs               Output logs in JSON format (for log aggregation)
    --metrics-addr <ADDR>     Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --audit-log <PATH>        Enable audit logging to specified JSONL file
    --hash-token <TOKEN>      Print the known users file line for TOKEN and exit
    -h, --help                Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                  Set log filter (e.g., RUST_LOG=debug,hydra_io=trace)

KNOWN USERS FILE:
    One token per line. Lines starting with // are comments. A line of the
    form sha256:<base64> holds the digest of a token instead of the token.

EXAMPLES:
    # Local testing without TLS
    hydra-srv --plain-http --port 8080 --known-users-file users.txt

    # Production run with all observability
    hydra-srv --cert-file cert.pem --key-file key.pem --known-users-file users.txt \
        --json-logs --metrics-addr 0.0.0.0:9090 --audit-log /var/log/hydra/audit.jsonl
"#
        );
    }
}
