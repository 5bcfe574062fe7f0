//! Turns authenticated control requests into actuator commands.
//!
//! The dispatcher knows nothing about sockets: it takes an [`ApiRequest`] and
//! produces an [`ApiResponse`]. The listener in `server` does the transport.

use crate::audit::{AuditEventType, AuditLogger, CommandDetails, RejectionDetails};
use crate::auth::{KnownTokens, Rejection};
use crate::error::{Code, RequestError};
use crate::metrics::{AUTH_FAILURES, AUTH_MISSING, REQUESTS_FAILED, REQUESTS_HANDLED};
use crate::protocol::{TimedRequest, CONFIRM_SIM_ERROR, CONFIRM_SIM_NO_ERROR};
use hydra_core::{ClientTime, ClosureActuator, TimeBase};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Named actuator instance addressed by the first path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Simulated,
}

impl Environment {
    pub fn from_segment(segment: &str) -> Result<Self, RequestError> {
        match segment {
            "sim" => Ok(Environment::Simulated),
            _ => Err(RequestError::unimplemented(
                "only simulated environment is available at the moment",
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Simulated => "sim",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    Open,
    Close,
    OpenToEnd,
    CloseToEnd,
    Stop,
    SimError,
    SimNoError,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::Open => "open",
            Command::Close => "close",
            Command::OpenToEnd => "open-to-end",
            Command::CloseToEnd => "close-to-end",
            Command::Stop => "stop",
            Command::SimError => "sim-error",
            Command::SimNoError => "sim-no-error",
        }
    }

    /// Whether the body must carry the caller's timestamp.
    pub fn needs_client_time(self) -> bool {
        matches!(
            self,
            Command::Open
                | Command::Close
                | Command::OpenToEnd
                | Command::CloseToEnd
                | Command::Stop
        )
    }
}

/// Map an HTTP method and command name to a command.
pub fn route(method: &str, command: &str) -> Result<Command, RequestError> {
    match method {
        "GET" => match command {
            "status" => Ok(Command::Status),
            _ => Err(RequestError::unimplemented(format!(
                "unknown command GET {command}"
            ))),
        },
        "POST" => match command {
            "open" => Ok(Command::Open),
            "close" => Ok(Command::Close),
            "open-to-end" => Ok(Command::OpenToEnd),
            "close-to-end" => Ok(Command::CloseToEnd),
            "stop" => Ok(Command::Stop),
            "sim-error" => Ok(Command::SimError),
            "sim-no-error" => Ok(Command::SimNoError),
            _ => Err(RequestError::unimplemented(format!(
                "unknown command POST {command}"
            ))),
        },
        _ => Err(RequestError::unimplemented(format!(
            "unsupported method {method}"
        ))),
    }
}

/// Split `{prefix}/{env}/{cmd}` into its two segments. Query strings are ignored.
pub fn split_path<'a>(prefix: &str, path: &'a str) -> Result<(&'a str, &'a str), RequestError> {
    let not_found = || RequestError::unimplemented(format!("no route for {path}"));

    let path_only = path.split_once('?').map_or(path, |(p, _)| p);
    let rest = path_only
        .strip_prefix(prefix.trim_end_matches('/'))
        .ok_or_else(not_found)?;
    let rest = rest.strip_prefix('/').ok_or_else(not_found)?;

    match rest.split_once('/') {
        Some((env, cmd)) if !env.is_empty() && !cmd.is_empty() && !cmd.contains('/') => {
            Ok((env, cmd))
        }
        _ => Err(not_found()),
    }
}

/// Transport-neutral view of an inbound request.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    /// Every `Authorization` header value, in order.
    pub authorization: Vec<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl ApiResponse {
    fn json(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body,
        }
    }

    pub fn from_error(err: &RequestError) -> Self {
        Self {
            status: err.http_status(),
            content_type: "text/plain; charset=utf-8",
            body: err.public_message().as_bytes().to_vec(),
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub struct Dispatcher {
    known_tokens: KnownTokens,
    simulated: Arc<dyn ClosureActuator>,
    route_prefix: String,
    audit: Option<Arc<AuditLogger>>,
    timebase: TimeBase,
}

impl Dispatcher {
    pub fn new(known_tokens: KnownTokens, simulated: Arc<dyn ClosureActuator>) -> Self {
        Self {
            known_tokens,
            simulated,
            route_prefix: String::new(),
            audit: None,
            timebase: TimeBase::new(),
        }
    }

    pub fn with_route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.route_prefix = prefix.into();
        self
    }

    pub fn with_audit(mut self, audit: Option<Arc<AuditLogger>>) -> Self {
        self.audit = audit;
        self
    }

    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        match self.execute(request) {
            Ok(body) => {
                REQUESTS_HANDLED.inc();
                info!(method = %request.method, path = %request.path, status = 200, "Handled request");
                debug!(body = %String::from_utf8_lossy(&body), "Response body");
                ApiResponse::json(body)
            }
            Err(err) => {
                REQUESTS_FAILED.inc();
                let status = err.http_status();
                if err.code == Code::Unknown {
                    error!(method = %request.method, path = %request.path, status, error = %err, "Request failed");
                } else {
                    warn!(method = %request.method, path = %request.path, status, code = err.code.as_str(), error = %err, "Request rejected");
                }
                ApiResponse::from_error(&err)
            }
        }
    }

    fn execute(&self, request: &ApiRequest) -> Result<Vec<u8>, RequestError> {
        let (env, cmd) = split_path(&self.route_prefix, &request.path)?;

        if let Err(rejection) = self.known_tokens.authenticate(&request.authorization) {
            self.note_rejection(rejection, request);
            return Err(rejection.into_error());
        }

        let environment = Environment::from_segment(env)?;
        let actuator = self.actuator(environment);
        let command = route(&request.method, cmd)?;

        let client_time = if command.needs_client_time() {
            Some(TimedRequest::parse(&request.body)?)
        } else {
            None
        };

        let body = match (command, client_time) {
            (Command::Status, _) => serde_json::to_vec(&actuator.status()?)?,
            (Command::SimError, _) => {
                actuator.set_simulated_error(true);
                serde_json::to_vec(CONFIRM_SIM_ERROR)?
            }
            (Command::SimNoError, _) => {
                actuator.set_simulated_error(false);
                serde_json::to_vec(CONFIRM_SIM_NO_ERROR)?
            }
            (driving, Some(t)) => serde_json::to_vec(&drive(actuator, driving, t)?)?,
            (driving, None) => {
                return Err(RequestError::unknown(format!(
                    "{} reached the actuator without a client time",
                    driving.as_str()
                )))
            }
        };

        if command != Command::Status {
            self.note_command(environment, command, client_time);
        }
        Ok(body)
    }

    fn actuator(&self, environment: Environment) -> &dyn ClosureActuator {
        match environment {
            Environment::Simulated => self.simulated.as_ref(),
        }
    }

    fn note_rejection(&self, rejection: Rejection, request: &ApiRequest) {
        match rejection {
            Rejection::UnknownToken => AUTH_FAILURES.inc(),
            Rejection::MissingHeader | Rejection::WrongScheme => AUTH_MISSING.inc(),
        }
        let details = RejectionDetails {
            reason: rejection.as_str(),
            method: &request.method,
            path: &request.path,
        };
        self.audit_event(AuditEventType::AuthRejected, &details);
    }

    fn note_command(
        &self,
        environment: Environment,
        command: Command,
        client_time: Option<ClientTime>,
    ) {
        let event_type = match command {
            Command::SimError | Command::SimNoError => AuditEventType::SimulatedErrorSet,
            _ => AuditEventType::CommandAccepted,
        };
        let details = CommandDetails {
            environment: environment.as_str(),
            command: command.as_str(),
            client_time: client_time.map(|t| t.to_rfc3339()),
        };
        self.audit_event(event_type, &details);
    }

    fn audit_event(&self, event_type: AuditEventType, details: &impl serde::Serialize) {
        let Some(audit) = &self.audit else {
            return;
        };
        let details = match serde_json::to_value(details) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to encode audit details");
                return;
            }
        };
        if let Err(e) = audit.log_event(
            self.timebase.now_us(),
            self.timebase.unix_us(),
            event_type,
            details,
        ) {
            warn!(error = %e, "Failed to write audit entry");
        }
    }
}

fn drive(
    actuator: &dyn ClosureActuator,
    command: Command,
    client_time: ClientTime,
) -> Result<hydra_core::StatusSnapshot, RequestError> {
    let snapshot = match command {
        Command::Open => actuator.open(client_time)?,
        Command::Close => actuator.close(client_time)?,
        Command::OpenToEnd => actuator.open_to_end(client_time)?,
        Command::CloseToEnd => actuator.close_to_end(client_time)?,
        Command::Stop => actuator.stop(client_time)?,
        other => {
            return Err(RequestError::unknown(format!(
                "{} is not a driving command",
                other.as_str()
            )))
        }
    };
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEntry;
    use hydra_core::{SimConfig, SimulatedClosure, Status, StatusSnapshot};

    const TOKEN: &str = "let-me-in";
    const TIME_BODY: &[u8] = br#"{"time":"2024-05-01T10:00:00Z"}"#;

    fn dispatcher() -> (Dispatcher, Arc<SimulatedClosure>) {
        let sim = Arc::new(SimulatedClosure::new(&SimConfig::default()));
        let dispatcher = Dispatcher::new(KnownTokens::from_tokens([TOKEN]), sim.clone());
        (dispatcher, sim)
    }

    fn request(method: &str, path: &str, body: &[u8]) -> ApiRequest {
        ApiRequest {
            method: method.to_string(),
            path: path.to_string(),
            authorization: vec![format!("Bearer {TOKEN}")],
            body: body.to_vec(),
        }
    }

    fn snapshot(response: &ApiResponse) -> StatusSnapshot {
        serde_json::from_slice(&response.body).unwrap()
    }

    #[test]
    fn test_route_table() {
        assert_eq!(route("GET", "status").unwrap(), Command::Status);
        assert_eq!(route("POST", "open-to-end").unwrap(), Command::OpenToEnd);
        assert_eq!(route("POST", "sim-no-error").unwrap(), Command::SimNoError);

        let err = route("GET", "open").unwrap_err();
        assert_eq!(err.code, Code::Unimplemented);
        assert_eq!(err.message, "unknown command GET open");

        let err = route("POST", "status").unwrap_err();
        assert_eq!(err.message, "unknown command POST status");

        let err = route("DELETE", "stop").unwrap_err();
        assert_eq!(err.code, Code::Unimplemented);
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("", "/sim/status").unwrap(), ("sim", "status"));
        assert_eq!(
            split_path("/ctl", "/ctl/sim/open?x=1").unwrap(),
            ("sim", "open")
        );
        assert_eq!(split_path("/ctl/", "/ctl/sim/open").unwrap(), ("sim", "open"));
        assert!(split_path("", "/sim").is_err());
        assert!(split_path("", "/sim/").is_err());
        assert!(split_path("", "/sim/a/b").is_err());
        assert!(split_path("/ctl", "/sim/status").is_err());
    }

    #[test]
    fn test_status_json() {
        let (dispatcher, _) = dispatcher();
        let response = dispatcher.handle(&request("GET", "/sim/status", b""));
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "application/json");
        assert_eq!(
            response.body_text(),
            r#"{"status":"idle","position":"closed"}"#
        );
    }

    #[test]
    fn test_open_to_end_reaches_open() {
        let (dispatcher, sim) = dispatcher();
        let response = dispatcher.handle(&request("POST", "/sim/open-to-end", TIME_BODY));
        assert_eq!(response.status, 200);
        assert_eq!(snapshot(&response).status, Status::Driving);

        for _ in 0..=100 {
            sim.tick();
        }

        let response = dispatcher.handle(&request("GET", "/sim/status", b""));
        assert_eq!(
            response.body_text(),
            r#"{"status":"idle","position":"open"}"#
        );
    }

    #[test]
    fn test_missing_authorization() {
        let (dispatcher, _) = dispatcher();
        let mut req = request("GET", "/sim/status", b"");
        req.authorization.clear();
        let response = dispatcher.handle(&req);
        assert_eq!(response.status, 401);
        assert!(!response.body.is_empty());
    }

    #[test]
    fn test_wrong_scheme_and_duplicates() {
        let (dispatcher, _) = dispatcher();
        let mut req = request("GET", "/sim/status", b"");
        req.authorization = vec![format!("Token {TOKEN}")];
        assert_eq!(dispatcher.handle(&req).status, 401);

        req.authorization = vec![format!("Bearer {TOKEN}"), format!("Bearer {TOKEN}")];
        assert_eq!(dispatcher.handle(&req).status, 401);
    }

    #[test]
    fn test_unknown_token_forbidden() {
        let (dispatcher, sim) = dispatcher();
        let mut req = request("POST", "/sim/open-to-end", TIME_BODY);
        req.authorization = vec!["Bearer nope".to_string()];
        let response = dispatcher.handle(&req);
        assert_eq!(response.status, 403);
        assert_eq!(response.body_text(), "auth failed");

        // Nothing reached the actuator.
        assert_eq!(sim.status().unwrap().status, Status::Idle);
    }

    #[test]
    fn test_unknown_environment() {
        let (dispatcher, _) = dispatcher();
        let response = dispatcher.handle(&request("GET", "/prod/status", b""));
        assert_eq!(response.status, 404);
        assert_eq!(
            response.body_text(),
            "only simulated environment is available at the moment"
        );
    }

    #[test]
    fn test_unknown_command() {
        let (dispatcher, _) = dispatcher();
        let response = dispatcher.handle(&request("GET", "/sim/unknown-cmd", b""));
        assert_eq!(response.status, 404);
        assert_eq!(response.body_text(), "unknown command GET unknown-cmd");
    }

    #[test]
    fn test_bad_time_is_client_error() {
        let (dispatcher, sim) = dispatcher();
        let response =
            dispatcher.handle(&request("POST", "/sim/open", br#"{"time":"not-a-date"}"#));
        assert_eq!(response.status, 400);
        assert!(response.body_text().contains("not-a-date"));

        let response = dispatcher.handle(&request("POST", "/sim/open", b"[1,2"));
        assert_eq!(response.status, 400);
        assert_eq!(sim.status().unwrap().status, Status::Idle);
    }

    #[test]
    fn test_sim_error_round_trip() {
        let (dispatcher, _) = dispatcher();
        let response = dispatcher.handle(&request("POST", "/sim/sim-error", b""));
        assert_eq!(response.status, 200);
        assert_eq!(response.body_text(), r#""ok, configured error""#);

        let response = dispatcher.handle(&request("GET", "/sim/status", b""));
        let status = snapshot(&response);
        assert_eq!(status.status, Status::Error);
        assert!(status.error.is_some());

        let response = dispatcher.handle(&request("POST", "/sim/sim-no-error", b""));
        assert_eq!(response.body_text(), r#""ok, configured no error""#);
        let response = dispatcher.handle(&request("GET", "/sim/status", b""));
        assert_eq!(snapshot(&response).status, Status::Idle);
    }

    #[test]
    fn test_route_prefix() {
        let (dispatcher, _) = dispatcher();
        let dispatcher = dispatcher.with_route_prefix("/ctl");
        assert_eq!(
            dispatcher
                .handle(&request("GET", "/ctl/sim/status", b""))
                .status,
            200
        );
        assert_eq!(
            dispatcher.handle(&request("GET", "/sim/status", b"")).status,
            404
        );
    }

    #[test]
    fn test_unknown_errors_hide_detail() {
        let err = RequestError::unknown("secret detail");
        let response = ApiResponse::from_error(&err);
        assert_eq!(response.status, 500);
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_audit_records_commands_and_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let audit = Arc::new(AuditLogger::new(&path).unwrap());

        let (dispatcher, _) = dispatcher();
        let dispatcher = dispatcher.with_audit(Some(audit));

        dispatcher.handle(&request("GET", "/sim/status", b""));
        dispatcher.handle(&request("POST", "/sim/close-to-end", TIME_BODY));
        dispatcher.handle(&request("POST", "/sim/sim-error", b""));
        let mut req = request("GET", "/sim/status", b"");
        req.authorization = vec!["Bearer wrong".to_string()];
        dispatcher.handle(&req);

        let content = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<AuditEntry> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].event_type, AuditEventType::CommandAccepted);
        assert_eq!(entries[0].details["command"], "close-to-end");
        assert_eq!(entries[0].details["client_time"], "2024-05-01T10:00:00+00:00");
        assert_eq!(entries[1].event_type, AuditEventType::SimulatedErrorSet);
        assert_eq!(entries[2].event_type, AuditEventType::AuthRejected);
        assert_eq!(entries[2].details["reason"], "unknown_token");
    }
}
