//! Health endpoint, polled by the keep-warm job.

use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
}

impl HealthStatus {
    pub fn healthy_now() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: utc_timestamp(),
        }
    }
}

/// Current UTC time as ISO-8601 with microseconds and a `+00:00` offset.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus::healthy_now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn reports_healthy() {
        let Json(body) = health().await;
        assert_eq!(body.status, "healthy");
    }

    #[tokio::test]
    async fn timestamp_is_utc_iso8601() {
        let Json(body) = health().await;
        assert!(body.timestamp.ends_with("+00:00"), "{}", body.timestamp);
        let parsed = DateTime::parse_from_rfc3339(&body.timestamp).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
    }

    #[tokio::test]
    async fn timestamps_do_not_go_backwards() {
        let mut previous = DateTime::parse_from_rfc3339(&health().await.timestamp).unwrap();
        for _ in 0..20 {
            let current = DateTime::parse_from_rfc3339(&health().await.timestamp).unwrap();
            assert!(current >= previous);
            previous = current;
        }
    }
}
