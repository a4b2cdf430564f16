use std::path::PathBuf;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3001`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Per-task drain timeout during graceful shutdown (default: `5`).
    pub shutdown_timeout_secs: u64,
    /// Maximum number of event log entries kept (default: `500`).
    pub event_log_capacity: usize,
    /// Bound on history-tracked channels (default: `1000`).
    pub history_capacity: usize,
    /// Directory holding one JSON snapshot per channel (default: `./data`).
    pub data_dir: PathBuf,
    /// Bearer tokens allowed to write. Empty means every caller may write.
    pub write_tokens: Vec<String>,
    /// WebSocket ping interval in seconds (default: `30`).
    pub heartbeat_interval_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `3001`                  |
    /// | `CORS_ORIGINS`            | `http://localhost:3000` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `5`                     |
    /// | `EVENT_LOG_CAPACITY`      | `500`                   |
    /// | `HISTORY_CAPACITY`        | `1000`                  |
    /// | `DATA_DIR`                | `./data`                |
    /// | `WRITE_TOKENS`            | (empty)                 |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`                    |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3001".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins = split_list(
            &std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".into()),
        );

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let event_log_capacity: usize = std::env::var("EVENT_LOG_CAPACITY")
            .unwrap_or_else(|_| "500".into())
            .parse()
            .expect("EVENT_LOG_CAPACITY must be a valid usize");

        let history_capacity: usize = std::env::var("HISTORY_CAPACITY")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("HISTORY_CAPACITY must be a valid usize");

        let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()));

        let write_tokens = split_list(&std::env::var("WRITE_TOKENS").unwrap_or_default());

        let heartbeat_interval_secs: u64 = std::env::var("HEARTBEAT_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("HEARTBEAT_INTERVAL_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            event_log_capacity,
            history_capacity,
            data_dir,
            write_tokens,
            heartbeat_interval_secs: heartbeat_interval_secs.max(1),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(split_list(" a, ,b,"), vec!["a", "b"]);
        assert!(split_list("").is_empty());
    }
}
