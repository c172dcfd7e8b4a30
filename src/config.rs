//! Configuration for Biotop
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;

use crate::db::query::MAX_PAGE_SIZE;

/// Biotop - habitat record verification and visibility service
#[derive(Parser, Debug, Clone)]
#[command(name = "biotop")]
#[command(about = "Habitat record verification and visibility service")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (fixed JWT secret, in-memory fallback store)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "biotop")]
    pub mongodb_db: String,

    /// JWT secret for token validation (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds, used when issuing tokens for tooling
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Classification service endpoint; re-analysis is unavailable without it
    #[arg(long, env = "CLASSIFIER_URL")]
    pub classifier_url: Option<String>,

    /// Classifier request timeout in milliseconds
    #[arg(long, env = "CLASSIFIER_TIMEOUT_MS", default_value = "60000")]
    pub classifier_timeout_ms: u64,

    /// Seed the habitat-type catalog at startup
    #[arg(long, env = "SEED_CATALOG", default_value = "true", action = clap::ArgAction::Set)]
    pub seed_catalog: bool,

    /// Largest page size a caller may request
    #[arg(long, env = "MAX_PAGE_SIZE", default_value_t = MAX_PAGE_SIZE)]
    pub max_page_size: u64,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match &self.jwt_secret {
                None => return Err("JWT_SECRET is required in production mode".to_string()),
                Some(secret) if secret.len() < 32 => {
                    return Err("JWT_SECRET must be at least 32 characters".to_string())
                }
                Some(_) => {}
            }
        }

        if self.max_page_size == 0 || self.max_page_size > MAX_PAGE_SIZE {
            return Err(format!("MAX_PAGE_SIZE must be between 1 and {}", MAX_PAGE_SIZE));
        }

        if self.request_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS must be positive".to_string());
        }

        Ok(())
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["biotop"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_production_requires_strong_secret() {
        let args = parse(&["--jwt-secret", "short"]);
        assert!(args.validate().is_err());

        let args = parse(&["--jwt-secret", "a-production-secret-with-32-chars!!"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_dev_mode_needs_no_secret() {
        let args = parse(&["--dev-mode"]);
        assert!(args.dev_mode);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_page_size_bounds() {
        let args = parse(&["--dev-mode", "--max-page-size", "500"]);
        assert!(args.validate().is_err());

        let args = parse(&["--dev-mode", "--seed-catalog", "false", "--log-format", "JSON"]);
        assert!(!args.seed_catalog);
        assert!(args.json_logs());
        assert_eq!(args.max_page_size, MAX_PAGE_SIZE);
    }
}
