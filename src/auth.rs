//! Bearer-token authentication against a master key and per-instance keys.
//!
//! Keys are read once at startup from a line-oriented `NAME_API_KEY=value` file
//! (`MASTER_API_KEY` is the global key). When the file is missing, the same variable
//! names are read from the process environment. There is no reload.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use axum::http::header::{HeaderMap, AUTHORIZATION};
use subtle::ConstantTimeEq;

const MASTER_KEY_NAME: &str = "MASTER_API_KEY";
const KEY_SUFFIX: &str = "_API_KEY";

/// Why a request was rejected. Only logged; clients always see a generic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    MissingHeader,
    WrongScheme,
    EmptyToken,
    InvalidToken,
}

impl AuthRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingHeader => "missing_authorization_header",
            Self::WrongScheme => "wrong_auth_scheme",
            Self::EmptyToken => "empty_token",
            Self::InvalidToken => "invalid_token",
        }
    }
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which key granted access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthGrant {
    Master,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Authorized(AuthGrant),
    Rejected(AuthRejection),
}

impl AuthOutcome {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized(_))
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Authorized(AuthGrant::Master) => "master_key",
            Self::Authorized(AuthGrant::Instance) => "instance_key",
            Self::Rejected(rejection) => rejection.as_str(),
        }
    }
}

/// Static key inventory: one optional master key plus keys per lowercase instance name.
#[derive(Debug, Clone, Default)]
pub struct AuthManager {
    master_key: Option<String>,
    instance_keys: HashMap<String, String>,
}

impl AuthManager {
    pub fn new(master_key: Option<String>, instance_keys: HashMap<String, String>) -> Self {
        let instance_keys = instance_keys
            .into_iter()
            .map(|(name, key)| (name.to_lowercase(), key))
            .filter(|(_, key)| !key.is_empty())
            .collect();
        Self {
            master_key: master_key.filter(|k| !k.is_empty()),
            instance_keys,
        }
    }

    /// Load keys from `path`, falling back to the process environment if it is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read key file {}", path.display()))?;
            let manager = Self::from_pairs(parse_key_file(&contents));
            tracing::info!(
                path = %path.display(),
                instance_keys = manager.instance_keys.len(),
                master = manager.master_key.is_some(),
                "api keys loaded"
            );
            Ok(manager)
        } else {
            let manager = Self::from_pairs(std::env::vars());
            tracing::warn!(
                path = %path.display(),
                instance_keys = manager.instance_keys.len(),
                master = manager.master_key.is_some(),
                "key file not found, using environment"
            );
            Ok(manager)
        }
    }

    /// Build from `NAME_API_KEY=value` pairs; everything else is ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut master = None;
        let mut instance_keys = HashMap::new();
        for (name, value) in pairs {
            let name = name.as_ref();
            if name == MASTER_KEY_NAME {
                master = Some(value.into());
            } else if let Some(instance) = name.strip_suffix(KEY_SUFFIX) {
                if !instance.is_empty() {
                    instance_keys.insert(instance.to_string(), value.into());
                }
            }
        }
        Self::new(master, instance_keys)
    }

    pub fn has_master_key(&self) -> bool {
        self.master_key.is_some()
    }

    pub fn instance_key_count(&self) -> usize {
        self.instance_keys.len()
    }

    /// The configured key for `instance`, used as the outbound token for remote peers.
    pub fn instance_key(&self, instance: &str) -> Option<&str> {
        self.instance_keys
            .get(&instance.to_lowercase())
            .map(String::as_str)
    }

    /// Authorize the bearer token in `headers` for `instance`.
    pub fn authenticate(&self, headers: &HeaderMap, instance: &str) -> AuthOutcome {
        let token = match extract_bearer(headers) {
            Ok(token) => token,
            Err(rejection) => return AuthOutcome::Rejected(rejection),
        };

        if self
            .master_key
            .as_deref()
            .is_some_and(|master| constant_time_eq(token, master))
        {
            return AuthOutcome::Authorized(AuthGrant::Master);
        }

        if self
            .instance_key(instance)
            .is_some_and(|key| constant_time_eq(token, key))
        {
            return AuthOutcome::Authorized(AuthGrant::Instance);
        }

        AuthOutcome::Rejected(AuthRejection::InvalidToken)
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthRejection> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthRejection::MissingHeader)?
        .to_str()
        .map_err(|_| AuthRejection::WrongScheme)?
        .trim();
    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthRejection::WrongScheme);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthRejection::EmptyToken);
    }
    Ok(token)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// Parse `NAME=value` lines. Blank lines and `#` comments are skipped, an optional
/// `export ` prefix is allowed, and surrounding quotes on the value are stripped.
pub fn parse_key_file(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (name, value) = line.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some((name.trim().to_string(), value.to_string()))
        })
        .collect()
}
