//! Feature engineering from a transaction and the user's last known profile.

use crate::types::features::FeatureVector;
use crate::types::profile::UserProfile;
use crate::types::transaction::Transaction;
use chrono::{Datelike, Timelike};

/// Builds the fixed feature vector for a transaction.
///
/// Pure: no I/O, no clock reads. The caller supplies the profile it fetched.
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// Derive features for `tx`. `profile` is `None` for a user with no history.
    pub fn build(&self, tx: &Transaction, profile: Option<&UserProfile>) -> FeatureVector {
        let timestamp = tx.timestamp;

        let (rolling_txn_count, geo_distance_anomaly) = match profile {
            Some(profile) => (
                profile.transaction_count_30min,
                degree_distance(
                    tx.latitude,
                    tx.longitude,
                    profile.last_latitude,
                    profile.last_longitude,
                ),
            ),
            None => (0, 0.0),
        };

        FeatureVector {
            amount: tx.amount,
            latitude: tx.latitude,
            longitude: tx.longitude,
            hour_of_day: timestamp.hour(),
            day_of_week: timestamp.weekday().num_days_from_monday(),
            rolling_txn_count,
            geo_distance_anomaly,
        }
    }
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self::new()
    }
}

/// Euclidean distance in degree space.
///
/// An approximation: it ignores the earth's curvature and longitude
/// convergence toward the poles. Good enough as a relative anomaly signal.
fn degree_distance(lat: f64, lon: f64, last_lat: f64, last_lon: f64) -> f64 {
    ((lat - last_lat).powi(2) + (lon - last_lon).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tx_at(lat: f64, lon: f64) -> Transaction {
        // 2024-05-04 is a Saturday
        let ts = Utc.with_ymd_and_hms(2024, 5, 4, 21, 15, 0).unwrap();
        Transaction::new("tx_001", "user_1", 45.0, lat, lon, ts)
    }

    #[test]
    fn test_no_profile_means_no_history() {
        let engineer = FeatureEngineer::new();
        let features = engineer.build(&tx_at(34.0, -118.0), None);

        assert_eq!(features.geo_distance_anomaly, 0.0);
        assert_eq!(features.rolling_txn_count, 0);
        assert_eq!(features.amount, 45.0);
    }

    #[test]
    fn test_time_features_are_utc() {
        let engineer = FeatureEngineer::new();
        let features = engineer.build(&tx_at(34.0, -118.0), None);

        assert_eq!(features.hour_of_day, 21);
        assert_eq!(features.day_of_week, 5);
    }

    #[test]
    fn test_geo_distance_from_last_location() {
        let engineer = FeatureEngineer::new();
        let mut profile = UserProfile::first_seen(31.0, -122.0, Utc::now());
        profile.transaction_count_30min = 7;

        let features = engineer.build(&tx_at(34.0, -118.0), Some(&profile));

        // 3-4-5 triangle in degree space
        assert!((features.geo_distance_anomaly - 5.0).abs() < 1e-9);
        assert_eq!(features.rolling_txn_count, 7);
    }

    #[test]
    fn test_geo_distance_is_non_negative() {
        let engineer = FeatureEngineer::new();
        let coords = [(-90.0, -180.0), (90.0, 180.0), (0.0, 0.0), (45.5, -73.6)];

        for &(lat, lon) in &coords {
            for &(last_lat, last_lon) in &coords {
                let profile = UserProfile::first_seen(last_lat, last_lon, Utc::now());
                let features = engineer.build(&tx_at(lat, lon), Some(&profile));
                assert!(features.geo_distance_anomaly >= 0.0);
            }
        }
    }

    #[test]
    fn test_same_location_is_zero_distance() {
        let engineer = FeatureEngineer::new();
        let profile = UserProfile::first_seen(34.0, -118.0, Utc::now());

        let features = engineer.build(&tx_at(34.0, -118.0), Some(&profile));
        assert_eq!(features.geo_distance_anomaly, 0.0);
    }
}
