use serde::Deserialize;
use std::time::Duration;

/// Base URL of the audit webhook service when `AUDIT_API_BASE_URL` is unset.
pub const DEFAULT_AUDIT_API_BASE_URL: &str = "http://localhost:5678/webhook/";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub audit_api_base_url: String,
    /// When set, answers are persisted in PostgreSQL instead of in-process.
    pub database_url: Option<String>,
    pub enrichment_poll_interval_ms: u64,
    /// Cap on the enrichment wait. `None` waits until the data arrives.
    pub enrichment_wait_timeout_secs: Option<u64>,
    /// Transport timeout for webhook calls. `None` keeps reqwest's default (no timeout).
    pub audit_request_timeout_secs: Option<u64>,
    pub session_ttl_secs: u64,
    /// Enables the operator jump-to-step affordance.
    pub dev_navigation: bool,
    /// Use the extended step list (employee count, channels, social media, offers, role, goal).
    pub extended_steps: bool,
    /// Skip enrichment-detail steps when the user declared they have no website.
    pub skip_enrichment_without_website: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            audit_api_base_url: {
                let url = std::env::var("AUDIT_API_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_AUDIT_API_BASE_URL.to_string());
                if url.trim().is_empty() {
                    anyhow::bail!("AUDIT_API_BASE_URL cannot be empty");
                }
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    anyhow::bail!("AUDIT_API_BASE_URL must start with http:// or https://");
                }
                url
            },
            database_url: match std::env::var("DATABASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
            {
                Some(url) => {
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Some(url)
                }
                None => None,
            },
            enrichment_poll_interval_ms: parse_u64_var("ENRICHMENT_POLL_INTERVAL_MS", 1000)
                .and_then(|ms| {
                    if ms == 0 {
                        anyhow::bail!("ENRICHMENT_POLL_INTERVAL_MS must be greater than 0");
                    }
                    Ok(ms)
                })?,
            enrichment_wait_timeout_secs: match parse_u64_var("ENRICHMENT_WAIT_TIMEOUT_SECS", 0)? {
                0 => None,
                secs => Some(secs),
            },
            audit_request_timeout_secs: match parse_u64_var("AUDIT_REQUEST_TIMEOUT_SECS", 0)? {
                0 => None,
                secs => Some(secs),
            },
            session_ttl_secs: parse_u64_var("SESSION_TTL_SECS", 86_400)?,
            dev_navigation: parse_bool_var("DEV_NAVIGATION")?,
            extended_steps: parse_bool_var("EXTENDED_STEPS")?,
            skip_enrichment_without_website: parse_bool_var("SKIP_ENRICHMENT_WITHOUT_WEBSITE")?,
        };

        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Audit API Base URL: {}", config.audit_api_base_url);
        match config.database_url {
            Some(ref url) => tracing::debug!(
                "Database URL: {}...",
                url.chars().take(20).collect::<String>()
            ),
            None => tracing::info!("DATABASE_URL not set, answers are kept in-process"),
        }
        tracing::debug!(
            "Enrichment wait: poll every {}ms, timeout {:?}s",
            config.enrichment_poll_interval_ms,
            config.enrichment_wait_timeout_secs
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.enrichment_poll_interval_ms)
    }

    pub fn enrichment_wait_timeout(&self) -> Option<Duration> {
        self.enrichment_wait_timeout_secs.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.audit_request_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            audit_api_base_url: DEFAULT_AUDIT_API_BASE_URL.to_string(),
            database_url: None,
            enrichment_poll_interval_ms: 1000,
            enrichment_wait_timeout_secs: None,
            audit_request_timeout_secs: None,
            session_ttl_secs: 86_400,
            dev_navigation: false,
            extended_steps: false,
            skip_enrichment_without_website: false,
        }
    }
}

fn parse_u64_var(var: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer", var)),
        _ => Ok(default),
    }
}

fn parse_bool_var(var: &str) -> anyhow::Result<bool> {
    match std::env::var(var) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "" | "0" | "false" | "no" => Ok(false),
            "1" | "true" | "yes" => Ok(true),
            other => anyhow::bail!("{} must be true or false, got '{}'", var, other),
        },
        Err(_) => Ok(false),
    }
}
