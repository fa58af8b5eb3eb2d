use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const UPSTAGE_BASE_URL: &str = "https://api.upstage.ai/v1/solar";

/// Which generative backend serves question and report calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    OpenAi,
    Upstage,
}

impl AiProvider {
    pub fn default_base_url(self) -> &'static str {
        match self {
            AiProvider::OpenAi => OPENAI_BASE_URL,
            AiProvider::Upstage => UPSTAGE_BASE_URL,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            AiProvider::OpenAi => "gpt-5-nano",
            AiProvider::Upstage => "solar-pro",
        }
    }
}

impl FromStr for AiProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(AiProvider::OpenAi),
            "upstage" => Ok(AiProvider::Upstage),
            other => bail!("AI_PROVIDER must be 'openai' or 'upstage', got '{other}'"),
        }
    }
}

/// Where sessions are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { database_url: String },
    /// Process-local store; everything is lost on restart.
    Memory,
}

/// Settings for the background report generation workers.
#[derive(Debug, Clone)]
pub struct ReportWorkerConfig {
    /// Periodic sweep for reports stuck in `analyzing`. Off by default.
    pub sweep_enabled: bool,
    pub sweep_interval: Duration,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for ReportWorkerConfig {
    fn default() -> Self {
        Self {
            sweep_enabled: false,
            sweep_interval: Duration::from_millis(5000),
            workers: 2,
            queue_capacity: 64,
        }
    }
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreBackend,
    pub port: u16,
    pub rust_log: String,
    pub ai_provider: AiProvider,
    pub ai_api_key: String,
    pub ai_base_url: String,
    pub ai_model: String,
    pub report_worker: ReportWorkerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let ai_provider = match optional_env("AI_PROVIDER") {
            Some(raw) => raw.parse::<AiProvider>()?,
            None if optional_env("OPENAI_API_KEY").is_some() => AiProvider::OpenAi,
            None => AiProvider::Upstage,
        };

        let ai_api_key = match ai_provider {
            AiProvider::OpenAi => require_env("OPENAI_API_KEY")?,
            AiProvider::Upstage => require_env("UPSTAGE_API_KEY")?,
        };

        let store = match optional_env("SESSION_STORE").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres {
                database_url: require_env("DATABASE_URL")?,
            },
            Some("memory") => StoreBackend::Memory,
            Some(other) => bail!("SESSION_STORE must be 'postgres' or 'memory', got '{other}'"),
        };

        let defaults = ReportWorkerConfig::default();

        Ok(Config {
            store,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            ai_provider,
            ai_api_key,
            ai_base_url: optional_env("AI_BASE_URL")
                .unwrap_or_else(|| ai_provider.default_base_url().to_string()),
            ai_model: optional_env("AI_MODEL")
                .unwrap_or_else(|| ai_provider.default_model().to_string()),
            report_worker: ReportWorkerConfig {
                sweep_enabled: parse_env("ENABLE_REPORT_WORKER", defaults.sweep_enabled)?,
                sweep_interval: Duration::from_millis(parse_env(
                    "REPORT_WORKER_INTERVAL_MS",
                    defaults.sweep_interval.as_millis() as u64,
                )?),
                workers: parse_env("REPORT_WORKERS", defaults.workers)?.max(1),
                queue_capacity: parse_env("REPORT_QUEUE_CAPACITY", defaults.queue_capacity)?
                    .max(1),
            },
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has an invalid value '{raw}': {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parses_case_insensitively() {
        assert_eq!("OpenAI".parse::<AiProvider>().unwrap(), AiProvider::OpenAi);
        assert_eq!(" upstage ".parse::<AiProvider>().unwrap(), AiProvider::Upstage);
        assert!("anthropic".parse::<AiProvider>().is_err());
    }

    #[test]
    fn test_provider_defaults() {
        assert_eq!(AiProvider::Upstage.default_model(), "solar-pro");
        assert_eq!(AiProvider::OpenAi.default_base_url(), OPENAI_BASE_URL);
    }

    #[test]
    fn test_database_url_required_only_for_postgres() {
        // Only test in this crate that touches the process environment.
        std::env::remove_var("AI_PROVIDER");
        std::env::remove_var("OPENAI_API_KEY");
        std::env::remove_var("DATABASE_URL");
        std::env::set_var("UPSTAGE_API_KEY", "test-key");

        std::env::set_var("SESSION_STORE", "memory");
        let config = Config::from_env().unwrap();
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.ai_provider, AiProvider::Upstage);

        std::env::set_var("SESSION_STORE", "postgres");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        std::env::set_var("DATABASE_URL", "postgres://localhost/interviews");
        let config = Config::from_env().unwrap();
        assert_eq!(
            config.store,
            StoreBackend::Postgres {
                database_url: "postgres://localhost/interviews".to_string()
            }
        );

        std::env::set_var("SESSION_STORE", "sqlite");
        assert!(Config::from_env().is_err());

        for key in ["SESSION_STORE", "DATABASE_URL", "UPSTAGE_API_KEY"] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_report_worker_defaults_are_disabled() {
        let defaults = ReportWorkerConfig::default();
        assert!(!defaults.sweep_enabled);
        assert_eq!(defaults.sweep_interval, Duration::from_millis(5000));
    }
}
