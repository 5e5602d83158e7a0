//! Profile store client: per-user last known location and activity.
//!
//! Writes are last-write-wins per user. The pipeline serializes records of
//! the same user within a batch; across instances there is no conflict
//! detection.

use crate::types::profile::UserProfile;
use anyhow::{Context, Result};
use async_nats::jetstream::kv;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch a user's profile; `Ok(None)` for a user with no history.
    async fn get(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// Record the user's latest location and transaction time.
    async fn update(
        &self,
        user_id: &str,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;
}

/// Process-local profile store.
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: DashMap<String, UserProfile>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a profile.
    pub fn insert(&self, user_id: &str, profile: UserProfile) {
        self.profiles.insert(user_id.to_string(), profile);
    }

    pub fn snapshot(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles.get(user_id).map(|p| p.clone())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.snapshot(user_id))
    }

    async fn update(
        &self,
        user_id: &str,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.profiles
            .entry(user_id.to_string())
            .and_modify(|p| *p = p.relocated(latitude, longitude, timestamp))
            .or_insert_with(|| UserProfile::first_seen(latitude, longitude, timestamp));
        Ok(())
    }
}

/// Profile store backed by a JetStream key-value bucket keyed by user id.
pub struct KvProfileStore {
    bucket: kv::Store,
}

impl KvProfileStore {
    pub fn new(bucket: kv::Store) -> Self {
        Self { bucket }
    }
}

#[async_trait]
impl ProfileStore for KvProfileStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let entry = self
            .bucket
            .get(user_id)
            .await
            .with_context(|| format!("Failed to read profile for {user_id}"))?;

        match entry {
            Some(bytes) => {
                let profile = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Corrupt profile for {user_id}"))?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        user_id: &str,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let existing = self
            .bucket
            .get(user_id)
            .await
            .with_context(|| format!("Failed to read profile for {user_id}"))?;
        let profile = merge_profile(user_id, existing.as_deref(), latitude, longitude, timestamp);

        let payload = serde_json::to_vec(&profile)?;
        let revision = self
            .bucket
            .put(user_id, payload.into())
            .await
            .with_context(|| format!("Failed to write profile for {user_id}"))?;

        debug!(user_id = %user_id, revision = revision, "Profile updated");
        Ok(())
    }
}

/// Apply a location update to a stored row.
///
/// The rolling count is owned by the external aggregator and is kept. A row
/// that cannot be decoded is replaced rather than left to fail every update.
fn merge_profile(
    user_id: &str,
    existing: Option<&[u8]>,
    latitude: f64,
    longitude: f64,
    timestamp: DateTime<Utc>,
) -> UserProfile {
    let Some(bytes) = existing else {
        return UserProfile::first_seen(latitude, longitude, timestamp);
    };

    match serde_json::from_slice::<UserProfile>(bytes) {
        Ok(stored) => stored.relocated(latitude, longitude, timestamp),
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Undecodable profile row, rewriting");
            UserProfile::first_seen(latitude, longitude, timestamp)
        }
    }
}
