use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub media_dir: PathBuf,
    pub public_url: String,
    pub signed_url_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = get("HEIRLOOM_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("HEIRLOOM_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let port = var("HEIRLOOM_PORT", "3000")
            .parse()
            .context("HEIRLOOM_PORT must be a port number")?;
        let ttl_secs: u64 = var("HEIRLOOM_SIGNED_URL_TTL_SECS", "3600")
            .parse()
            .context("HEIRLOOM_SIGNED_URL_TTL_SECS must be a number of seconds")?;

        Ok(Self {
            jwt_secret,
            db_path: var("HEIRLOOM_DB_PATH", "heirloom.db").into(),
            host: var("HEIRLOOM_HOST", "0.0.0.0"),
            port,
            media_dir: var("HEIRLOOM_MEDIA_DIR", "./media").into(),
            public_url: var("HEIRLOOM_PUBLIC_URL", "http://localhost:3000"),
            signed_url_ttl: Duration::from_secs(ttl_secs),
        })
    }
}
