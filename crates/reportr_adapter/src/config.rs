#![forbid(unsafe_code)]

use std::env;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;

use reportr_kernel_contracts::identity::TrustedDomain;
use reportr_kernel_contracts::ContractViolation;
use reportr_os::session::DEFAULT_SESSION_TTL_SECS;
use thiserror::Error;

pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_ADMINS_PATH: &str = "config/admins.json";
pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid REPORTR_HTTP_BIND '{value}': {source}")]
    InvalidBind {
        value: String,
        #[source]
        source: AddrParseError,
    },
    #[error("invalid REPORTR_TRUSTED_DOMAIN: {0}")]
    InvalidTrustedDomain(#[from] ContractViolation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub bind: SocketAddr,
    pub public_base_url: String,
    pub trusted_domain: TrustedDomain,
    pub admins_path: PathBuf,
    pub store_path: PathBuf,
    pub static_dir: PathBuf,
    pub session_ttl_secs: i64,
    pub cookie_secure: bool,
    pub provider_timeout_ms: u64,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub log_format: LogFormat,
}

impl AdapterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_var_map(|key| env::var(key).ok())
    }

    pub fn from_env_var_map<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_raw = non_empty("REPORTR_HTTP_BIND").unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string());
        let bind: SocketAddr = bind_raw
            .parse()
            .map_err(|source| ConfigError::InvalidBind {
                value: bind_raw.clone(),
                source,
            })?;
        let trusted_domain = match non_empty("REPORTR_TRUSTED_DOMAIN") {
            Some(domain) => TrustedDomain::new(domain)?,
            None => TrustedDomain::default(),
        };
        let public_base_url = non_empty("REPORTR_PUBLIC_BASE_URL")
            .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let store_path = non_empty("REPORTR_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_store_path(non_empty("HOME")));

        Ok(Self {
            bind,
            public_base_url,
            trusted_domain,
            admins_path: non_empty("REPORTR_ADMINS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ADMINS_PATH)),
            store_path,
            static_dir: non_empty("REPORTR_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
            session_ttl_secs: non_empty("REPORTR_SESSION_TTL_SECS")
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|v| (60..=31_536_000).contains(v))
                .unwrap_or(DEFAULT_SESSION_TTL_SECS),
            cookie_secure: non_empty("REPORTR_COOKIE_SECURE")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            provider_timeout_ms: non_empty("REPORTR_PROVIDER_TIMEOUT_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|v| (100..=60_000).contains(v))
                .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_MS),
            google_client_id: non_empty("GOOGLE_CLIENT_ID")
                .ok_or(ConfigError::Missing("GOOGLE_CLIENT_ID"))?,
            google_client_secret: non_empty("GOOGLE_CLIENT_SECRET")
                .ok_or(ConfigError::Missing("GOOGLE_CLIENT_SECRET"))?,
            log_format: match non_empty("REPORTR_LOG_FORMAT") {
                Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        })
    }

    /// Where the identity provider sends the browser back to.
    pub fn redirect_uri(&self) -> String {
        format!("{}/backend/auth", self.public_base_url)
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

fn default_store_path(home: Option<String>) -> PathBuf {
    match home {
        Some(home) => PathBuf::from(home).join(".reportr/reports.jsonl"),
        None => PathBuf::from(".reportr/reports.jsonl"),
    }
}
