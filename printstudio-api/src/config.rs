/// Configuration management for the API server
///
/// Configuration is read from environment variables (a `.env` file is loaded
/// first when present).
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: bind address (default `0.0.0.0:8080`)
/// - `DATABASE_URL`: PostgreSQL connection string; when unset the service runs
///   without a store (quota checks fail open, usage events are dropped)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default 10)
/// - `JWT_SECRET`: HS256 secret of the identity provider (required, 32+ chars)
/// - `JWT_AUDIENCE`: expected `aud` claim (default `authenticated`)
/// - `REPLICATE_API_TOKEN`, `REPLICATE_BASE_URL`: Replicate credentials
/// - `OPENAI_API_KEY`, `OPENAI_BASE_URL`: OpenAI credentials
/// - `POLL_INTERVAL_MS`: delay between job polls (default 1000)
/// - `QUOTA_FAILURE_POLICY`: `open` (default) or `closed`
/// - `ADMIN_USER_IDS`: comma-separated user ids allowed on admin analytics
/// - `CORS_ORIGINS`: comma-separated origins, `*` for any (default `*`)
/// - `MAX_UPLOAD_BYTES`: upload size limit (default 10 MiB)
///
/// # Example
///
/// ```no_run
/// use printstudio_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use printstudio_shared::quota::FailurePolicy;
use printstudio_worker::providers::{openai, replicate};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Default upload limit (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub providers: ProvidersConfig,
    pub quota: QuotaConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    pub max_upload_bytes: usize,

    /// Users allowed on the admin analytics endpoints
    pub admin_user_ids: Vec<Uuid>,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `None` runs the service without persistence
    pub url: Option<String>,
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Must be kept secret; at least 32 characters
    pub secret: String,
    pub audience: String,
}

/// Inference provider credentials and polling
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub replicate_token: Option<String>,
    pub replicate_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct QuotaConfig {
    pub failure_policy: FailurePolicy,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `JWT_SECRET` is missing or too short, or if a
    /// variable has an invalid value.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let failure_policy = match var("QUOTA_FAILURE_POLICY") {
            Some(value) => FailurePolicy::parse(&value).ok_or_else(|| {
                anyhow::anyhow!("QUOTA_FAILURE_POLICY must be 'open' or 'closed', got '{}'", value)
            })?,
            None => FailurePolicy::default(),
        };

        let admin_user_ids = match var("ADMIN_USER_IDS") {
            Some(value) => split_list(&value)
                .into_iter()
                .map(|id| {
                    Uuid::parse_str(&id).with_context(|| format!("Invalid id in ADMIN_USER_IDS: {}", id))
                })
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let cors_origins = var("CORS_ORIGINS")
            .map(|v| split_list(&v))
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(|| vec!["*".to_string()]);

        let poll_interval_ms: u64 = parse_or(var("POLL_INTERVAL_MS"), "POLL_INTERVAL_MS", 1000)?;
        if poll_interval_ms == 0 {
            anyhow::bail!("POLL_INTERVAL_MS must be greater than zero");
        }

        Ok(Self {
            api: ApiConfig {
                host: var("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(var("API_PORT"), "API_PORT", 8080)?,
                cors_origins,
                max_upload_bytes: parse_or(
                    var("MAX_UPLOAD_BYTES"),
                    "MAX_UPLOAD_BYTES",
                    DEFAULT_MAX_UPLOAD_BYTES,
                )?,
                admin_user_ids,
            },
            database: DatabaseConfig {
                url: var("DATABASE_URL"),
                max_connections: parse_or(var("DATABASE_MAX_CONNECTIONS"), "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                audience: var("JWT_AUDIENCE").unwrap_or_else(|| "authenticated".to_string()),
            },
            providers: ProvidersConfig {
                replicate_token: var("REPLICATE_API_TOKEN"),
                replicate_base_url: var("REPLICATE_BASE_URL")
                    .unwrap_or_else(|| replicate::DEFAULT_BASE_URL.to_string()),
                openai_api_key: var("OPENAI_API_KEY"),
                openai_base_url: var("OPENAI_BASE_URL")
                    .unwrap_or_else(|| openai::DEFAULT_BASE_URL.to_string()),
                poll_interval: Duration::from_millis(poll_interval_ms),
            },
            quota: QuotaConfig { failure_policy },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn is_admin(&self, user_id: Uuid) -> bool {
        self.api.admin_user_ids.contains(&user_id)
    }
}

fn parse_or<T>(value: Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v.parse::<T>().with_context(|| format!("Invalid value for {}: {}", name, v)),
        None => Ok(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
