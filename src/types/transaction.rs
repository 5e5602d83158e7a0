//! Inbound transaction records

use crate::error::RecordError;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A card transaction as published by the upstream producer.
///
/// Immutable once parsed. Timestamps are not guaranteed to be monotonic per
/// user, so nothing downstream may assume ordering by `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique transaction identifier
    pub transaction_id: String,

    pub user_id: String,

    pub merchant_id: String,

    /// Amount in account currency, never negative
    pub amount: f64,

    pub latitude: f64,

    pub longitude: f64,

    /// Event time in UTC
    #[serde(deserialize_with = "deserialize_utc")]
    pub timestamp: DateTime<Utc>,

    pub ip_address: String,

    pub card_hash: String,
}

impl Transaction {
    /// Create a transaction with placeholder merchant, IP and card values
    pub fn new(
        transaction_id: impl Into<String>,
        user_id: impl Into<String>,
        amount: f64,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            user_id: user_id.into(),
            merchant_id: "merchant_unknown".to_string(),
            amount,
            latitude,
            longitude,
            timestamp,
            ip_address: "0.0.0.0".to_string(),
            card_hash: String::new(),
        }
    }

    /// Decode and validate a JSON message body.
    pub fn from_slice(payload: &[u8]) -> Result<Self, RecordError> {
        let tx: Transaction = serde_json::from_slice(payload)?;
        tx.validate()?;
        Ok(tx)
    }

    /// Reject values the feature engineer cannot use.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.transaction_id.trim().is_empty() {
            return Err(RecordError::invalid("transactionId", "must not be empty"));
        }
        if self.user_id.trim().is_empty() {
            return Err(RecordError::invalid("userId", "must not be empty"));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(RecordError::invalid(
                "amount",
                format!("{} is not a non-negative number", self.amount),
            ));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(RecordError::invalid(
                "latitude",
                format!("{} outside [-90, 90]", self.latitude),
            ));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(RecordError::invalid(
                "longitude",
                format!("{} outside [-180, 180]", self.longitude),
            ));
        }
        Ok(())
    }
}

/// Parse an ISO-8601 timestamp as UTC.
///
/// Accepts RFC 3339 with an explicit offset, or a naive timestamp such as
/// `2024-05-01T13:45:00.123456`, which is taken to already be UTC.
pub fn parse_utc_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match raw.parse::<DateTime<FixedOffset>>() {
        Ok(ts) => Ok(ts.with_timezone(&Utc)),
        Err(_) => raw.parse::<NaiveDateTime>().map(|naive| naive.and_utc()),
    }
}

/// Serde helper for `DateTime<Utc>` fields written by producers that may omit
/// the offset.
pub(crate) fn deserialize_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_utc_timestamp(&raw)
        .map_err(|e| serde::de::Error::custom(format!("unparsable timestamp {raw:?}: {e}")))
}
