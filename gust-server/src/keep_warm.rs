//! Keep-warm job.
//!
//! Pings a health endpoint on a fixed interval so the serving container is
//! not torn down for inactivity. A ping never fails the schedule: every
//! outcome, including a panic inside the ping, is logged and the next tick
//! fires as usual. There is no retry and no backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::routes::health::utc_timestamp;

#[derive(Debug, Clone, PartialEq)]
pub struct KeepWarmConfig {
    pub health_url: String,
    pub interval: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PingOutcome {
    /// 2xx with a JSON body; `timestamp` is `"unknown"` when the body has none.
    Healthy { timestamp: String },
    /// 2xx whose body could not be read as JSON.
    HealthyUnreadable,
    Unhealthy { status: StatusCode },
    /// The request itself failed: DNS, connect, timeout.
    Failed { error: String },
}

#[derive(Deserialize)]
struct HealthReport {
    timestamp: Option<String>,
}

pub struct KeepWarm {
    client: reqwest::Client,
    config: KeepWarmConfig,
}

impl KeepWarm {
    pub fn new(config: KeepWarmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    /// One health check. Logs the outcome and returns it; never errors.
    pub async fn ping(&self) -> PingOutcome {
        let response = match self.client.get(&self.config.health_url).send().await {
            Ok(response) => response,
            Err(e) => {
                error!(url = %self.config.health_url, "Health check error: {e}");
                return PingOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        let status = response.status();
        let outcome = if status.is_success() {
            match response.json::<HealthReport>().await {
                Ok(report) => {
                    let timestamp = report.timestamp.unwrap_or_else(|| "unknown".to_string());
                    info!("Health check at: {timestamp}");
                    PingOutcome::Healthy { timestamp }
                }
                Err(_) => {
                    info!("Health check successful at: {}", utc_timestamp());
                    PingOutcome::HealthyUnreadable
                }
            }
        } else {
            warn!("Health check failed with status: {}", status.as_u16());
            PingOutcome::Unhealthy { status }
        };

        info!("Container kept warm at: {}", utc_timestamp());
        outcome
    }

    /// Ping on every tick until `shutdown` resolves. The first ping fires
    /// immediately.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let job = Arc::new(self);
        info!(
            url = %job.config.health_url,
            interval_secs = job.config.interval.as_secs(),
            "keep-warm job started"
        );
        let interval = job.config.interval;
        schedule(interval, shutdown, move || {
            let job = Arc::clone(&job);
            async move { job.ping().await }
        })
        .await;
    }

    /// One ping in its own task, so that a panic is contained and logged.
    /// Returns `None` when the ping did not complete.
    pub async fn ping_isolated(self: Arc<Self>) -> Option<PingOutcome> {
        isolated(async move { self.ping().await }).await
    }
}

async fn isolated<F>(ping: F) -> Option<PingOutcome>
where
    F: Future<Output = PingOutcome> + Send + 'static,
{
    match tokio::spawn(ping).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!("Unexpected error in keep-warm job: {e}");
            None
        }
    }
}

/// Drive `ping` on every tick of `period` until `shutdown` resolves. Each
/// ping is isolated, so none of them can end the loop.
async fn schedule<P, F>(period: Duration, shutdown: impl Future<Output = ()>, mut ping: P)
where
    P: FnMut() -> F,
    F: Future<Output = PingOutcome> + Send + 'static,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("keep-warm job stopping");
                break;
            }
            _ = interval.tick() => {
                isolated(ping()).await;
            }
        }
    }
}
