//! Bearer-token authentication for the control API.
//!
//! Known tokens are loaded from a line-oriented file and kept in memory only
//! as SHA-256 digests. A line is either a plain token or `sha256:<base64>`.

use crate::error::RequestError;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

const COMMENT_PREFIX: &str = "//";
const DIGEST_PREFIX: &str = "sha256:";
const BEARER_PREFIX: &str = "Bearer ";

type TokenDigest = [u8; 32];

/// Errors that can occur while loading the known users file
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to read known users file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid token digest on line {line}: {reason}")]
    InvalidDigest { line: usize, reason: String },
}

/// Why a request was turned away before reaching the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingHeader,
    WrongScheme,
    UnknownToken,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::MissingHeader => "missing_header",
            Rejection::WrongScheme => "wrong_scheme",
            Rejection::UnknownToken => "unknown_token",
        }
    }

    pub fn into_error(self) -> RequestError {
        match self {
            Rejection::MissingHeader => {
                RequestError::unauthenticated("need Authorization header (exactly 1)")
            }
            Rejection::WrongScheme => {
                RequestError::unauthenticated("need Authorization: Bearer ... header")
            }
            Rejection::UnknownToken => RequestError::permission_denied("auth failed"),
        }
    }
}

/// Set of bearer tokens allowed to drive the closure.
#[derive(Debug, Default, Clone)]
pub struct KnownTokens {
    digests: HashSet<TokenDigest>,
}

impl KnownTokens {
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let contents = std::fs::read_to_string(path).map_err(|source| AuthError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, AuthError> {
        let mut digests = HashSet::new();
        for (idx, raw) in contents.lines().enumerate() {
            let line = raw.trim_end();
            if line.is_empty() || line.starts_with(COMMENT_PREFIX) {
                continue;
            }

            let digest = match line.strip_prefix(DIGEST_PREFIX) {
                Some(encoded) => decode_digest(encoded).map_err(|reason| {
                    AuthError::InvalidDigest {
                        line: idx + 1,
                        reason,
                    }
                })?,
                None => digest(line),
            };
            digests.insert(digest);
        }
        Ok(Self { digests })
    }

    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            digests: tokens.into_iter().map(|t| digest(t.as_ref())).collect(),
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.digests.contains(&digest(token))
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Check the `Authorization` header values of a request.
    pub fn authenticate(&self, authorization: &[String]) -> Result<(), Rejection> {
        let [header] = authorization else {
            return Err(Rejection::MissingHeader);
        };
        let token = header
            .strip_prefix(BEARER_PREFIX)
            .ok_or(Rejection::WrongScheme)?;
        if !self.contains(token) {
            return Err(Rejection::UnknownToken);
        }
        Ok(())
    }
}

fn digest(token: &str) -> TokenDigest {
    Sha256::digest(token.as_bytes()).into()
}

fn decode_digest(encoded: &str) -> Result<TokenDigest, String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| e.to_string())?;
    TokenDigest::try_from(bytes.as_slice())
        .map_err(|_| format!("expected 32 bytes, got {}", bytes.len()))
}

/// Known users file line for `token` that does not reveal it.
pub fn digest_line(token: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(digest(token));
    format!("{DIGEST_PREFIX}{encoded}")
}
