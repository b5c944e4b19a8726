//! Purpose: Resolve client configuration from the environment and CLI overrides.
//! Exports: `ClientConfig`, `ConfigOverrides`, env var names, `DEFAULT_BASE_URL`.
//! Role: Single place where endpoint, bearer token, and timeout are decided.
//! Invariants: CLI flags win over environment variables, which win over defaults.
//! Invariants: Tokens are trimmed; an empty token is a usage error, never sent.
#![allow(clippy::result_large_err)]

use std::path::PathBuf;
use std::time::Duration;

use crate::api::{Error, ErrorKind, RemoteClient};

pub const ENV_BASE_URL: &str = "WHITERABBIT_API_URL";
pub const ENV_TOKEN: &str = "WHITERABBIT_TOKEN";
pub const ENV_TIMEOUT_MS: &str = "WHITERABBIT_TIMEOUT_MS";
pub const DEFAULT_BASE_URL: &str = "http://[::1]:50051";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = ClientConfig::default();
        if let Some(url) = lookup(ENV_BASE_URL).filter(|url| !url.trim().is_empty()) {
            config.base_url = url.trim().to_string();
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            config.token = Some(clean_token(&token, ENV_TOKEN)?);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            let ms = raw.trim().parse::<u64>().map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("{ENV_TIMEOUT_MS} must be a number of milliseconds"))
                    .with_source(err)
            })?;
            config.timeout = timeout_from_ms(ms);
        }
        Ok(config)
    }

    pub fn apply(mut self, overrides: ConfigOverrides) -> Result<Self, Error> {
        if overrides.token.is_some() && overrides.token_file.is_some() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("--token and --token-file cannot be combined"));
        }
        if let Some(url) = overrides.base_url {
            self.base_url = url;
        }
        if let Some(token) = overrides.token {
            self.token = Some(clean_token(&token, "--token")?);
        }
        if let Some(path) = overrides.token_file {
            let raw = std::fs::read_to_string(&path).map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("failed to read token file {}", path.display()))
                    .with_source(err)
            })?;
            self.token = Some(clean_token(&raw, "--token-file")?);
        }
        if let Some(ms) = overrides.timeout_ms {
            self.timeout = timeout_from_ms(ms);
        }
        Ok(self)
    }

    pub fn client(&self) -> Result<RemoteClient, Error> {
        let mut client = RemoteClient::new(self.base_url.clone())?;
        if let Some(token) = &self.token {
            client = client.with_token(token.clone());
        }
        if let Some(timeout) = self.timeout {
            client = client.with_timeout(timeout);
        }
        Ok(client)
    }
}

// A timeout of 0 means no timeout.
fn timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn clean_token(raw: &str, source: &str) -> Result<String, Error> {
    let token = raw.trim();
    let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
    if token.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("empty bearer token from {source}")));
    }
    Ok(token.to_string())
}
