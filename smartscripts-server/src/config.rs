use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    /// SQLite database for reviews. When unset, reviews live in memory
    /// and are lost on restart.
    pub database_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let database_path = parse_database_path(env::var("REVIEW_DB_PATH").ok());

        Ok(Config {
            bind_address,
            port,
            database_path,
        })
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Parse REVIEW_DB_PATH from an optional string value.
///
/// Returns None if the value is missing, empty, or contains only whitespace.
pub fn parse_database_path(value: Option<String>) -> Option<PathBuf> {
    value.filter(|s| !s.trim().is_empty()).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_database_path_none() {
        assert_eq!(parse_database_path(None), None);
    }

    #[test]
    fn test_parse_database_path_blank() {
        assert_eq!(parse_database_path(Some("".to_string())), None);
        assert_eq!(parse_database_path(Some("  \t".to_string())), None);
    }

    #[test]
    fn test_parse_database_path_valid() {
        assert_eq!(
            parse_database_path(Some("/var/lib/smartscripts/reviews.db".to_string())),
            Some(PathBuf::from("/var/lib/smartscripts/reviews.db"))
        );
    }

    #[test]
    fn test_listen_address() {
        let config = Config {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            database_path: None,
        };
        assert_eq!(config.listen_address(), "127.0.0.1:8080");
    }
}
