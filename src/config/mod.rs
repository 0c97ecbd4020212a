use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum accepted upload size in bytes (10 MB)
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Added to even integer fields by the JSON transform
pub const INCREMENT: i64 = 1000;

/// Extension that routes a finished upload to the JSON transform
pub const JSON_EXT: &str = ".json";

/// How long the dispatcher waits on a transform before logging a timeout
pub const TRANSFORM_TIMEOUT: Duration = Duration::from_secs(1);

/// Server configuration for the upload service
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen host (default: "0.0.0.0")
    pub host: String,

    /// Listen port (default: 8090)
    pub port: u16,

    /// Directory receiving uploaded files (default: "tmp/server")
    pub upload_dir: PathBuf,

    /// Directory receiving processed JSON files (default: "tmp/json")
    pub processed_json_dir: PathBuf,

    /// Maximum file size in bytes (default: 10 MB)
    pub max_file_size: u64,

    /// Deadline applied to a single upload call (default: 5 minutes)
    pub upload_timeout: Duration,

    /// Age after which an open session is reported as stale (default: 1 hour)
    pub stale_session_age: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            upload_dir: PathBuf::from("tmp/server"),
            processed_json_dir: PathBuf::from("tmp/json"),
            max_file_size: MAX_FILE_SIZE,
            upload_timeout: Duration::from_secs(300),
            stale_session_age: Duration::from_secs(3600),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            host: env::var("FILEUP_HOST").unwrap_or(default.host),

            port: env::var("FILEUP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            upload_dir: env::var("FILEUP_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            processed_json_dir: env::var("FILEUP_JSON_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.processed_json_dir),

            max_file_size: env::var("FILEUP_MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            upload_timeout: env::var("FILEUP_UPLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.upload_timeout),

            stale_session_age: env::var("FILEUP_STALE_SESSION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.stale_session_age),
        }
    }

    /// Create config for development (local directories, short deadlines)
    pub fn development() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            upload_timeout: Duration::from_secs(30),
            stale_session_age: Duration::from_secs(60),
            ..Self::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
