//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::SagaTimeouts;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `SAGA_CART_TIMEOUT_MS` — budget per cart collaborator call (default: `2000`)
/// - `SAGA_STOCK_TIMEOUT_MS` — budget for the stock read batch (default: `2000`)
/// - `LOW_STOCK_SCAN_INTERVAL_SECS` — pause between ledger scans (default: `60`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub saga_cart_timeout: Duration,
    pub saga_stock_timeout: Duration,
    pub low_stock_scan_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            saga_cart_timeout: env_millis("SAGA_CART_TIMEOUT_MS", defaults.saga_cart_timeout),
            saga_stock_timeout: env_millis("SAGA_STOCK_TIMEOUT_MS", defaults.saga_stock_timeout),
            low_stock_scan_interval: env_secs(
                "LOW_STOCK_SCAN_INTERVAL_SECS",
                defaults.low_stock_scan_interval,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the saga collaborator budgets configured here.
    pub fn saga_timeouts(&self) -> SagaTimeouts {
        SagaTimeouts {
            cart: self.saga_cart_timeout,
            stock: self.saga_stock_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            saga_cart_timeout: Duration::from_millis(2000),
            saga_stock_timeout: Duration::from_millis(2000),
            low_stock_scan_interval: Duration::from_secs(60),
        }
    }
}

fn env_millis(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
