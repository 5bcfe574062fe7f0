use hydra_core::{SimConfig, SimulatedClosure};
use hydra_io::{ApiRequest, Dispatcher, KnownTokens};
use std::sync::Arc;

const TOKEN: &str = "vector-token";
const TIME_BODY: &str = r#"{"time":"2024-05-01T10:00:00+02:00"}"#;

fn dispatcher() -> Dispatcher {
    let sim = Arc::new(SimulatedClosure::new(&SimConfig::default()));
    Dispatcher::new(KnownTokens::from_tokens([TOKEN]), sim)
}

fn request(method: &str, path: &str, auth: &[&str], body: &str) -> ApiRequest {
    ApiRequest {
        method: method.to_string(),
        path: path.to_string(),
        authorization: auth.iter().map(|v| v.to_string()).collect(),
        body: body.as_bytes().to_vec(),
    }
}

#[test]
fn status_codes_for_request_vectors() {
    let bearer = format!("Bearer {TOKEN}");
    let ok = [bearer.as_str()];
    let cases: &[(&str, &str, &[&str], &str, u16)] = &[
        ("GET", "/sim/status", &ok, "", 200),
        ("POST", "/sim/open", &ok, TIME_BODY, 200),
        ("POST", "/sim/close", &ok, TIME_BODY, 200),
        ("POST", "/sim/open-to-end", &ok, TIME_BODY, 200),
        ("POST", "/sim/close-to-end", &ok, TIME_BODY, 200),
        ("POST", "/sim/stop", &ok, TIME_BODY, 200),
        ("POST", "/sim/sim-error", &ok, "", 200),
        ("POST", "/sim/sim-no-error", &ok, "", 200),
        ("GET", "/sim/status", &[], "", 401),
        ("GET", "/sim/status", &["Basic abc"], "", 401),
        ("GET", "/sim/status", &["Bearer someone-else"], "", 403),
        ("GET", "/lab/status", &ok, "", 404),
        ("GET", "/sim/unknown-cmd", &ok, "", 404),
        ("POST", "/sim/status", &ok, "", 404),
        ("PUT", "/sim/open", &ok, TIME_BODY, 404),
        ("GET", "/status", &ok, "", 404),
        ("POST", "/sim/open", &ok, r#"{"time":"not-a-date"}"#, 400),
        ("POST", "/sim/stop", &ok, "", 400),
        ("POST", "/sim/close", &ok, r#"{"time":17}"#, 400),
    ];

    let dispatcher = dispatcher();
    for (method, path, auth, body, expected) in cases {
        let response = dispatcher.handle(&request(method, path, auth, body));
        assert_eq!(
            response.status, *expected,
            "{method} {path} -> {} ({})",
            response.status,
            response.body_text()
        );
    }
}

#[test]
fn auth_is_checked_before_environment() {
    let dispatcher = dispatcher();
    let response = dispatcher.handle(&request("GET", "/lab/status", &[], ""));
    assert_eq!(response.status, 401);
}

#[test]
fn open_is_noop_when_fully_open() {
    let sim = Arc::new(SimulatedClosure::with_position(&SimConfig::default(), 100));
    let dispatcher = Dispatcher::new(KnownTokens::from_tokens([TOKEN]), sim);
    let bearer = format!("Bearer {TOKEN}");

    let response = dispatcher.handle(&request("POST", "/sim/open", &[&bearer], TIME_BODY));
    assert_eq!(response.status, 200);
    assert_eq!(
        response.body_text(),
        r#"{"status":"idle","position":"open"}"#
    );
}
