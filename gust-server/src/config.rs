//! Command line and environment configuration.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use gust_core::DeviceMap;

use crate::keep_warm::KeepWarmConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Gust image generation server")]
pub struct Cli {
    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the model and serve /generate and /health
    Serve(ServeArgs),
    /// Download the model files into the hub cache and exit
    Fetch(FetchArgs),
    /// Periodically ping a health endpoint so its container stays warm
    KeepWarm(KeepWarmArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Model to serve
    #[arg(long, env = "GUST_MODEL", default_value = "stabilityai/sdxl-turbo")]
    pub model: String,

    /// Use CPU instead of GPU
    #[arg(long, env = "GUST_CPU")]
    pub cpu: bool,
}

impl ModelArgs {
    pub fn device_map(&self) -> DeviceMap {
        DeviceMap::from_cpu_flag(self.cpu)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Host address to bind the server to
    #[arg(long, env = "GUST_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the server to
    #[arg(long, env = "GUST_PORT", default_value_t = 8000)]
    pub port: u16,
}

impl ServeArgs {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// `--cpu` fetches the full precision files the CPU path loads.
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Args, Debug, Clone)]
pub struct KeepWarmArgs {
    /// Health endpoint to ping
    #[arg(long, env = "GUST_HEALTH_URL")]
    pub health_url: String,

    /// Seconds between pings
    #[arg(long, env = "GUST_KEEP_WARM_INTERVAL_SECS", default_value_t = 300)]
    pub interval_secs: u64,

    /// Seconds to wait for each ping
    #[arg(long, env = "GUST_KEEP_WARM_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Ping once and exit, for use under an external scheduler
    #[arg(long)]
    pub once: bool,
}

impl KeepWarmArgs {
    pub fn to_config(&self) -> KeepWarmConfig {
        KeepWarmConfig {
            health_url: self.health_url.clone(),
            interval: Duration::from_secs(self.interval_secs),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    /// `tracing` filter used when RUST_LOG is unset, e.g. "info" or "debug,tower_http=warn"
    #[arg(long, global = true, env = "GUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Emit log records as newline-delimited JSON
    #[arg(long, global = true, env = "GUST_LOG_JSON")]
    pub log_json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["gust-server", "serve"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.model.model, "stabilityai/sdxl-turbo");
        assert_eq!(args.model.device_map(), DeviceMap::Ordinal(0));
        assert_eq!(args.bind_address(), "0.0.0.0:8000");
        assert_eq!(cli.logging.log_level, "info");
    }

    #[test]
    fn fetch_for_cpu() {
        let cli = Cli::try_parse_from(["gust-server", "fetch", "--cpu"]).unwrap();
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.model.device_map(), DeviceMap::ForceCpu);
    }

    #[test]
    fn keep_warm_defaults_to_five_minutes_and_ten_second_timeout() {
        let cli = Cli::try_parse_from([
            "gust-server",
            "keep-warm",
            "--health-url",
            "http://localhost:8000/health",
        ])
        .unwrap();
        let Command::KeepWarm(args) = cli.command else {
            panic!("expected keep-warm");
        };
        let config = args.to_config();
        assert_eq!(config.health_url, "http://localhost:8000/health");
        assert_eq!(config.interval, Duration::from_secs(300));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(!args.once);
    }

    #[test]
    fn global_logging_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "gust-server",
            "keep-warm",
            "--health-url",
            "http://h/health",
            "--once",
            "--log-json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert!(cli.logging.log_json);
        assert_eq!(cli.logging.log_level, "debug");
    }
}
