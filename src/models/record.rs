//! Persisted fact that a remote order has been handled.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Final outcome for a remote order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplicationOutcome {
    Replicated,
    Skipped,
    Failed,
}

impl ReplicationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationOutcome::Replicated => "REPLICATED",
            ReplicationOutcome::Skipped => "SKIPPED",
            ReplicationOutcome::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ReplicationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ReplicationOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REPLICATED" => Ok(ReplicationOutcome::Replicated),
            "SKIPPED" => Ok(ReplicationOutcome::Skipped),
            "FAILED" => Ok(ReplicationOutcome::Failed),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

/// Written exactly once per remote order id and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationRecord {
    pub remote_order_id: String,

    pub processed_at: DateTime<Utc>,

    pub outcome: ReplicationOutcome,

    /// USDC size placed, only for REPLICATED
    #[serde(default)]
    pub replicated_size: Option<Decimal>,

    /// Venue order ID of the replicated order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,

    /// Skip reason or failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ReplicationRecord {
    pub fn replicated(remote_order_id: &str, size: Decimal, order_id: &str) -> Self {
        Self {
            remote_order_id: remote_order_id.to_string(),
            processed_at: Utc::now(),
            outcome: ReplicationOutcome::Replicated,
            replicated_size: Some(size),
            order_id: Some(order_id.to_string()),
            detail: None,
        }
    }

    pub fn skipped(remote_order_id: &str, detail: impl Into<String>) -> Self {
        Self {
            remote_order_id: remote_order_id.to_string(),
            processed_at: Utc::now(),
            outcome: ReplicationOutcome::Skipped,
            replicated_size: None,
            order_id: None,
            detail: Some(detail.into()),
        }
    }

    pub fn failed(remote_order_id: &str, detail: impl Into<String>) -> Self {
        Self {
            remote_order_id: remote_order_id.to_string(),
            processed_at: Utc::now(),
            outcome: ReplicationOutcome::Failed,
            replicated_size: None,
            order_id: None,
            detail: Some(detail.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_outcome_parse() {
        assert_eq!(
            "REPLICATED".parse::<ReplicationOutcome>().unwrap(),
            ReplicationOutcome::Replicated
        );
        assert!("replicated".parse::<ReplicationOutcome>().is_err());
    }

    #[test]
    fn test_reads_minimal_entry() {
        // Entries written before order_id/detail existed
        let line = r#"{"remote_order_id":"a","processed_at":"2024-05-01T12:00:00Z","outcome":"SKIPPED","replicated_size":null}"#;
        let record: ReplicationRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.outcome, ReplicationOutcome::Skipped);
        assert!(record.order_id.is_none());
    }

    #[test]
    fn test_ignores_unknown_fields() {
        let line = r#"{"remote_order_id":"a","processed_at":"2024-05-01T12:00:00Z","outcome":"REPLICATED","replicated_size":"12.5","venue":"x"}"#;
        let record: ReplicationRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.replicated_size, Some(dec!(12.5)));
    }

    #[test]
    fn test_constructors() {
        let r = ReplicationRecord::replicated("a", dec!(100), "ord-1");
        assert_eq!(r.outcome, ReplicationOutcome::Replicated);
        assert_eq!(r.replicated_size, Some(dec!(100)));

        let s = ReplicationRecord::skipped("b", "BELOW_MIN");
        assert_eq!(s.replicated_size, None);
        assert_eq!(s.detail.as_deref(), Some("BELOW_MIN"));
    }
}
