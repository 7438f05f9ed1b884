use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use agora_message::ManagerConfig;

const PLACEHOLDER_SECRETS: &[&str] = &["", "changeme", "change-me", "dev-secret-change-me", "secret"];

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub manager: ManagerConfig,
    pub shutdown_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("AGORA_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(&lookup, "AGORA_PORT", 3000)?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let jwt_secret = lookup("AGORA_JWT_SECRET").context("AGORA_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!("AGORA_JWT_SECRET is a placeholder; set a real secret");
        }

        let defaults = ManagerConfig::default();
        let manager = ManagerConfig {
            cache_capacity: parse_or(&lookup, "AGORA_MESSAGE_CACHE_SIZE", defaults.cache_capacity)?,
            cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "AGORA_MESSAGE_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )?),
            audit_concurrency: parse_or(
                &lookup,
                "AGORA_AUDIT_CONCURRENCY",
                defaults.audit_concurrency,
            )?,
        };

        Ok(Self {
            addr,
            db_path: PathBuf::from(lookup("AGORA_DB_PATH").unwrap_or_else(|| "agora.db".into())),
            jwt_secret,
            manager,
            shutdown_timeout: Duration::from_secs(parse_or(
                &lookup,
                "AGORA_SHUTDOWN_TIMEOUT_SECS",
                10,
            )?),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
