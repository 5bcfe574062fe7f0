use crate::error::RequestError;
use chrono::DateTime;
use hydra_core::ClientTime;
use serde::{Deserialize, Serialize};

/// Largest request body the dispatcher will look at.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

pub const CONFIRM_SIM_ERROR: &str = "ok, configured error";
pub const CONFIRM_SIM_NO_ERROR: &str = "ok, configured no error";

/// Body of every driving command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedRequest {
    #[serde(default)]
    pub time: String,
}

impl TimedRequest {
    pub fn parse(body: &[u8]) -> Result<ClientTime, RequestError> {
        if body.len() > MAX_BODY_BYTES {
            return Err(RequestError::invalid_argument(format!(
                "request body exceeds {MAX_BODY_BYTES} bytes"
            )));
        }

        // Only the first JSON value is read; anything after it is ignored.
        let request: TimedRequest = serde_json::Deserializer::from_slice(body)
            .into_iter::<TimedRequest>()
            .next()
            .unwrap_or_else(|| Err(serde::de::Error::custom("EOF")))
            .map_err(|e: serde_json::Error| {
                RequestError::invalid_argument(format!("can not parse request as JSON: {e}"))
            })?;

        parse_timestamp(&request.time).map_err(|reason| {
            RequestError::invalid_argument(format!(
                "can not parse request-given time '{}' as RFC3339: {reason}",
                request.time
            ))
        })
    }
}

/// `YYYY-MM-DDTHH:MM:SS[.frac](Z|+hh:mm)`, with an upper-case `T` and `Z`.
fn parse_timestamp(raw: &str) -> Result<ClientTime, String> {
    if raw.as_bytes().get(10) != Some(&b'T') {
        return Err("date and time must be separated by 'T'".to_string());
    }
    if raw.contains(|c: char| c == 't' || c == 'z') {
        return Err("lower-case 't' or 'z' is not accepted".to_string());
    }
    DateTime::parse_from_rfc3339(raw).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parses_rfc3339_with_offset() {
        let t = TimedRequest::parse(br#"{"time":"2024-05-01T12:30:00+02:00"}"#).unwrap();
        assert_eq!(t.year(), 2024);
        assert_eq!(t.hour(), 12);
        assert_eq!(t.offset().local_minus_utc(), 7200);
    }

    #[test]
    fn test_parses_utc_with_fraction() {
        let t = TimedRequest::parse(br#"{"time":"2024-05-01T10:30:00.250Z","extra":1}"#).unwrap();
        assert_eq!(t.nanosecond(), 250_000_000);
    }

    #[test]
    fn test_rejects_bad_json() {
        let err = TimedRequest::parse(b"{not json").unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
        assert!(err.message.starts_with("can not parse request as JSON"));

        let err = TimedRequest::parse(b"").unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }

    #[test]
    fn test_rejects_bad_time() {
        let err = TimedRequest::parse(br#"{"time":"not-a-date"}"#).unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
        assert!(err.message.contains("'not-a-date'"));

        // Missing field is parsed as an empty time string.
        let err = TimedRequest::parse(b"{}").unwrap_err();
        assert!(err.message.contains("''"));

        // Date without a time zone is not RFC3339.
        assert!(TimedRequest::parse(br#"{"time":"2024-05-01T10:30:00"}"#).is_err());

        for loose in [
            "2024-05-01 10:00:00Z",
            "2024-05-01t10:00:00Z",
            "2024-05-01T10:00:00z",
            "2024-05-01t10:00:00z",
        ] {
            let body = format!(r#"{{"time":"{loose}"}}"#);
            let err = TimedRequest::parse(body.as_bytes()).unwrap_err();
            assert_eq!(err.code, Code::InvalidArgument, "{loose}");
            assert!(err.message.contains(loose));
        }
    }

    #[test]
    fn test_ignores_data_after_first_value() {
        let t = TimedRequest::parse(br#"{"time":"2024-05-01T10:00:00Z"} trailing"#).unwrap();
        assert_eq!(t.hour(), 10);

        let t = TimedRequest::parse(
            br#"{"time":"2024-05-01T10:00:00Z"}{"time":"2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(t.year(), 2024);
    }

    #[test]
    fn test_rejects_oversized_body() {
        let body = vec![b' '; MAX_BODY_BYTES + 1];
        let err = TimedRequest::parse(&body).unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }
}
