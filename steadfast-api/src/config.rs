/// Configuration for the API server
///
/// Loaded from environment variables (a `.env` file is read first when
/// present).
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `API_HOST` / `API_PORT`: bind address (default: 0.0.0.0:8080)
/// - `JWT_SECRET`: HS256 secret, at least 32 characters (required)
/// - `JWT_EXPIRY_HOURS`: access token lifetime (default: 24)
/// - `CORS_ORIGINS`: comma-separated origins, `*` for any (default: `*`)
/// - `PRODUCTION`: enables HSTS (default: false)
/// - `CACHE_TTL_SECONDS` / `CACHE_MAX_ENTRIES`: response cache (default: 30 / 1000)
/// - `RUN_MIGRATIONS`: apply migrations at boot (default: true)
///
/// # Example
///
/// ```no_run
/// use steadfast_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; empty means any origin
    pub cors_origins: Vec<String>,

    /// Enables HSTS
    pub production: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HS256 signing secret; generate with `openssl rand -hex 32`
    #[serde(skip_serializing)]
    pub secret: String,

    pub expiry_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub max_entries: u64,
}

/// Reads an optional variable, parsing it when set
fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value: {:?}", name, raw)),
        _ => Ok(default),
    }
}

fn required_var(name: &str) -> anyhow::Result<String> {
    env::var(name).with_context(|| format!("{} environment variable is required", name))
}

/// Splits `CORS_ORIGINS`; `*` (or nothing) allows any origin
pub fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();

    if origins.iter().any(|o| o == "*") {
        Vec::new()
    } else {
        origins
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let jwt_secret = required_var("JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let expiry_hours = parse_var("JWT_EXPIRY_HOURS", 24_i64)?;
        if expiry_hours <= 0 {
            anyhow::bail!("JWT_EXPIRY_HOURS must be positive");
        }

        Ok(Self {
            api: ApiConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("API_PORT", 8080_u16)?,
                cors_origins: parse_origins(&env::var("CORS_ORIGINS").unwrap_or_default()),
                production: parse_var("PRODUCTION", false)?,
            },
            database: DatabaseConfig {
                url: required_var("DATABASE_URL")?,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10_u32)?,
                run_migrations: parse_var("RUN_MIGRATIONS", true)?,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                expiry_hours,
            },
            cache: CacheConfig {
                ttl_seconds: parse_var("CACHE_TTL_SECONDS", 30_u64)?,
                max_entries: parse_var("CACHE_MAX_ENTRIES", 1000_u64)?,
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Configuration for tests and local tooling
    pub fn for_database(url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                cors_origins: Vec::new(),
                production: false,
            },
            database: DatabaseConfig {
                url: url.into(),
                max_connections: 5,
                run_migrations: true,
            },
            jwt: JwtConfig {
                secret: jwt_secret.into(),
                expiry_hours: 24,
            },
            cache: CacheConfig {
                ttl_seconds: 30,
                max_entries: 1000,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let config = Config::for_database(
            "postgresql://localhost/test",
            "test-secret-key-at-least-32-bytes-long",
        );
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_parse_origins() {
        assert!(parse_origins("").is_empty());
        assert!(parse_origins("*").is_empty());
        assert!(parse_origins("https://a.example, *").is_empty());
        assert_eq!(
            parse_origins("https://a.example, https://b.example,"),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        std::env::set_var("STEADFAST_TEST_PORT", "eighty");
        let err = parse_var("STEADFAST_TEST_PORT", 8080_u16).unwrap_err();
        assert!(err.to_string().contains("STEADFAST_TEST_PORT"));

        std::env::set_var("STEADFAST_TEST_PORT", "9090");
        assert_eq!(parse_var("STEADFAST_TEST_PORT", 8080_u16).unwrap(), 9090);

        std::env::remove_var("STEADFAST_TEST_PORT");
        assert_eq!(parse_var("STEADFAST_TEST_PORT", 8080_u16).unwrap(), 8080);
    }

    #[test]
    fn test_secret_is_not_serialized() {
        let config = Config::for_database("postgresql://localhost/test", "super-secret-value-that-is-long-enough");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret-value"));
    }
}
