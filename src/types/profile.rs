//! Per-user rolling profile

use crate::types::transaction::deserialize_utc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last known state of a user, as stored in the profile store.
///
/// A user either has a full profile or none at all; a missing profile means
/// "no prior history". The 30 minute count is maintained by an external
/// aggregator and is only carried through here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub last_latitude: f64,
    pub last_longitude: f64,
    /// Older writers store the naive ISO string of the inbound timestamp
    #[serde(deserialize_with = "deserialize_utc")]
    pub last_transaction_time: DateTime<Utc>,
    #[serde(default)]
    pub transaction_count_30min: u32,
}

impl UserProfile {
    /// Profile for a user seen for the first time.
    pub fn first_seen(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            last_latitude: latitude,
            last_longitude: longitude,
            last_transaction_time: timestamp,
            transaction_count_30min: 0,
        }
    }

    /// Apply a location update, keeping the externally maintained count.
    pub fn relocated(&self, latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            last_latitude: latitude,
            last_longitude: longitude,
            last_transaction_time: timestamp,
            transaction_count_30min: self.transaction_count_30min,
        }
    }
}
