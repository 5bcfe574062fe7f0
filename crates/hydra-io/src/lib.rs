pub mod audit;
pub mod auth;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod tls;

pub use audit::{AuditEventType, AuditLogger};
pub use auth::{AuthError, KnownTokens, Rejection};
pub use dispatch::{route, ApiRequest, ApiResponse, Command, Dispatcher, Environment};
pub use error::{Code, RequestError};
pub use metrics::{init_metrics, serve_metrics};
pub use protocol::TimedRequest;
pub use server::{start_server, ServerConfig, ServerError};
pub use tls::{load_ssl_config, TlsConfig, TlsError};
