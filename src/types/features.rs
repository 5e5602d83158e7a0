//! Model feature vector

use serde::{Deserialize, Serialize};

/// Number of features the scoring models consume.
pub const MODEL_FEATURE_COUNT: usize = 5;

/// Feature names in model input order.
pub const MODEL_FEATURE_NAMES: [&str; MODEL_FEATURE_COUNT] =
    ["amount", "latitude", "longitude", "hour_of_day", "day_of_week"];

/// Engineered features for one transaction.
///
/// `rolling_txn_count` and `geo_distance_anomaly` are carried for cases and
/// logs; the models only see the first five fields, see [`Self::model_input`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub amount: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// 0-23, UTC
    pub hour_of_day: u32,
    /// 0-6, Monday = 0
    pub day_of_week: u32,
    pub rolling_txn_count: u32,
    /// Degree-space distance from the last known location
    pub geo_distance_anomaly: f64,
}

impl FeatureVector {
    /// Model input: `[amount, latitude, longitude, hour_of_day, day_of_week]`
    pub fn model_input(&self) -> [f32; MODEL_FEATURE_COUNT] {
        [
            self.amount as f32,
            self.latitude as f32,
            self.longitude as f32,
            self.hour_of_day as f32,
            self.day_of_week as f32,
        ]
    }
}
