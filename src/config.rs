use std::env;
use std::fmt;
use std::time::Duration;

use dotenv::dotenv;
use regex::Regex;

use crate::db::{Result, ResultExt};

const DEFAULT_POOL_SIZE: u32 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

lazy_static! {
    static ref CREDENTIALS: Regex = Regex::new(r"(postgres(?:ql)?://)[^\s@/]+@").unwrap();
}

/// Masks the credentials of every postgres URL in `text`.
pub fn sanitize_database_url(text: &str) -> String {
    CREDENTIALS.replace_all(text, "${1}x:x@").into_owned()
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub pool_size: u32,
    pub connect_timeout: Duration,
}

impl Config {
    /// Reads the process environment, after loading `.env` when present.
    pub fn from_env() -> Result<Config> {
        dotenv().ok();
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or("DATABASE_URL must be set")?;

        let pool_size = match lookup("DATABASE_POOL_SIZE") {
            Some(value) => value
                .parse::<u32>()
                .chain_err(|| format!("invalid DATABASE_POOL_SIZE: {}", value))?,
            None => DEFAULT_POOL_SIZE,
        };
        if pool_size == 0 {
            bail!("invalid DATABASE_POOL_SIZE: 0, the pool needs at least one connection");
        }

        let connect_timeout = match lookup("DATABASE_CONNECT_TIMEOUT_SECS") {
            Some(value) => value
                .parse::<u64>()
                .chain_err(|| format!("invalid DATABASE_CONNECT_TIMEOUT_SECS: {}", value))?,
            None => DEFAULT_CONNECT_TIMEOUT_SECS,
        };

        Ok(Config {
            database_url,
            pool_size,
            connect_timeout: Duration::from_secs(connect_timeout),
        })
    }

    pub fn sanitized_url(&self) -> String {
        sanitize_database_url(&self.database_url)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.sanitized_url())
            .field("pool_size", &self.pool_size)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn masks_user_and_password() {
        assert_eq!(
            sanitize_database_url("postgres://alice:s3cret@db:5432/realworld"),
            "postgres://x:x@db:5432/realworld"
        );
        assert_eq!(
            sanitize_database_url("could not connect to postgresql://bob@localhost/app: refused"),
            "could not connect to postgresql://x:x@localhost/app: refused"
        );
    }

    #[test]
    fn urls_without_credentials_are_untouched() {
        let url = "postgres://localhost:5432/realworld";
        assert_eq!(sanitize_database_url(url), url);
    }

    #[test]
    fn defaults_apply_when_only_url_is_set() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/rw")])).unwrap();
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_url_is_an_error() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn invalid_pool_size_is_an_error() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/rw"),
            ("DATABASE_POOL_SIZE", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DATABASE_POOL_SIZE"));
    }

    #[test]
    fn zero_pool_size_is_an_error() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/rw"),
            ("DATABASE_POOL_SIZE", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DATABASE_POOL_SIZE"));
    }

    #[test]
    fn debug_output_hides_credentials() {
        let config = Config::from_lookup(lookup(&[(
            "DATABASE_URL",
            "postgres://alice:s3cret@db/rw",
        )]))
        .unwrap();
        assert!(!format!("{:?}", config).contains("s3cret"));
    }
}
