//! Configuration for achievement-ledger
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::directory::DirectoryCacheConfig;
use crate::services::ServiceSettings;

/// Achievement ledger - student achievement lifecycle service
#[derive(Parser, Debug, Clone)]
#[command(name = "achievement-ledger")]
#[command(about = "Student achievement lifecycle service over a document store and a relational store")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI (achievement content)
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "achievements")]
    pub mongodb_db: String,

    /// SQLite file holding workflow references and the directory tables
    #[arg(long, env = "REFERENCE_DB_PATH", default_value = "./data/references.db")]
    pub reference_db_path: PathBuf,

    /// Enable development mode (in-memory content store when MongoDB is unreachable)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Seconds a resolved student display stays cached (0 disables)
    #[arg(long, env = "DIRECTORY_CACHE_TTL_SECS", default_value = "300")]
    pub directory_cache_ttl_secs: u64,

    /// Number of students listed in statistics
    #[arg(long, env = "TOP_STUDENTS_LIMIT", default_value = "10")]
    pub top_students_limit: usize,

    /// Upper bound on the page size of filtered listings
    #[arg(long, env = "MAX_PAGE_SIZE", default_value = "100")]
    pub max_page_size: u64,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_page_size == 0 {
            return Err("MAX_PAGE_SIZE must be at least 1".to_string());
        }

        if self.mongodb_db.trim().is_empty() {
            return Err("MONGODB_DB must not be empty".to_string());
        }

        Ok(())
    }

    pub fn directory_cache(&self) -> DirectoryCacheConfig {
        DirectoryCacheConfig {
            ttl: Duration::from_secs(self.directory_cache_ttl_secs),
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            max_page_size: self.max_page_size,
            top_students_limit: self.top_students_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["achievement-ledger"]);
        assert_eq!(args.listen.port(), 8080);
        assert_eq!(args.mongodb_db, "achievements");
        assert_eq!(args.top_students_limit, 10);
        assert_eq!(args.max_page_size, 100);
        assert_eq!(args.directory_cache().ttl, Duration::from_secs(300));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let args = Args::parse_from(["achievement-ledger", "--max-page-size", "0"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from(["achievement-ledger", "--mongodb-db", " "]);
        assert!(args.validate().is_err());
    }
}
