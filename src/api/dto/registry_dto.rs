//! Registry inspection and eviction DTOs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{EntryStatus, RegistryError, RegistryStats, ResultEntry};

/// Response body for `GET /registry/stats`.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Number of entries.
    pub total: usize,
    /// Entries in flight.
    pub searching: usize,
    /// Entries ready with a value.
    pub ready: usize,
    /// Entries ready with an error.
    pub errors: usize,
}

impl From<RegistryStats> for StatsResponse {
    fn from(stats: RegistryStats) -> Self {
        Self {
            total: stats.total,
            searching: stats.searching,
            ready: stats.ready,
            errors: stats.errors,
        }
    }
}

/// Response body for `GET /registry/keys`.
#[derive(Debug, Serialize, ToSchema)]
pub struct KeysResponse {
    /// All keys in ascending order.
    pub keys: Vec<String>,
}

/// Response body for `GET /registry/ready`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Value of every entry ready without error, keyed by entry key.
    #[schema(value_type = Object)]
    pub entries: BTreeMap<String, serde_json::Value>,
}

/// Single entry detail for `GET /registry/entries/{key}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct EntryDetailResponse {
    /// Entry key.
    pub key: String,
    /// Lifecycle status.
    pub status: EntryStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Milliseconds since creation.
    pub age_ms: u64,
    /// `true` when the entry failed because its deadline elapsed.
    pub timed_out: bool,
    /// Error message when ready with an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Value when ready without error.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub value: Option<serde_json::Value>,
}

impl From<&ResultEntry<serde_json::Value>> for EntryDetailResponse {
    fn from(entry: &ResultEntry<serde_json::Value>) -> Self {
        Self {
            key: entry.key().to_string(),
            status: entry.status(),
            created_at: entry.created_at(),
            age_ms: u64::try_from(entry.age().as_millis()).unwrap_or(u64::MAX),
            timed_out: entry.error().is_some_and(RegistryError::is_timeout),
            error: entry.error().map(ToString::to_string),
            value: entry.value().cloned(),
        }
    }
}

/// Query parameters for `POST /registry/clear-old`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ClearOldParams {
    /// Maximum entry age in milliseconds. Defaults to one hour.
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: u64,
}

fn default_max_age_ms() -> u64 {
    3_600_000
}

/// Response body for bulk eviction endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClearedResponse {
    /// Number of entries removed.
    pub cleared: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_convert_field_by_field() {
        let response = StatsResponse::from(RegistryStats {
            total: 4,
            searching: 1,
            ready: 2,
            errors: 1,
        });
        assert_eq!(response.total, 4);
        assert_eq!(response.searching, 1);
        assert_eq!(response.ready, 2);
        assert_eq!(response.errors, 1);
    }

    #[test]
    fn clear_old_defaults_to_one_hour() {
        let params: Option<ClearOldParams> = serde_json::from_str("{}").ok();
        assert_eq!(params.map(|p| p.max_age_ms), Some(3_600_000));
    }
}
