//! Fraud alert and case payloads

use crate::types::decision::{Decision, ModelVersion};
use crate::types::features::FeatureVector;
use crate::types::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Determine risk level from score and thresholds
    pub fn from_score(score: f64, thresholds: &RiskLevelThresholds) -> Self {
        if score >= thresholds.critical {
            RiskLevel::Critical
        } else if score >= thresholds.high {
            RiskLevel::High
        } else if score >= thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Graph-linked decisions are always critical.
    pub fn for_decision(decision: &Decision, thresholds: &RiskLevelThresholds) -> Self {
        if decision.graph_flag {
            RiskLevel::Critical
        } else {
            Self::from_score(decision.fraud_probability, thresholds)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Configurable risk level thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLevelThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for RiskLevelThresholds {
    fn default() -> Self {
        Self {
            medium: 0.5,
            high: 0.8,
            critical: 0.95,
        }
    }
}

/// Notification sent for every fraud decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAlert {
    pub alert_id: String,
    pub transaction_id: String,
    pub user_id: String,
    pub amount: f64,
    /// Short subject line for the notification channel
    pub subject: String,
    /// Human-readable summary
    pub message: String,
    pub risk_level: RiskLevel,
    pub fraud_probability: f64,
    pub model_version: ModelVersion,
    pub graph_flag: bool,
    pub timestamp: DateTime<Utc>,
}

impl FraudAlert {
    /// Build the alert for a fraud decision
    pub fn for_decision(
        transaction: &Transaction,
        decision: &Decision,
        thresholds: &RiskLevelThresholds,
    ) -> Self {
        let mut message = format!(
            "Transaction {} for ${:.2} was flagged as fraudulent.",
            transaction.transaction_id, transaction.amount
        );
        if let Some(node) = &decision.linked_node_id {
            message.push_str(&format!(" Linked to known fraudulent node {node}."));
        }

        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            transaction_id: transaction.transaction_id.clone(),
            user_id: transaction.user_id.clone(),
            amount: transaction.amount,
            subject: format!("Fraud Alert for User {}", transaction.user_id),
            message,
            risk_level: RiskLevel::for_decision(decision, thresholds),
            fraud_probability: decision.fraud_probability,
            model_version: decision.model_version,
            graph_flag: decision.graph_flag,
            timestamp: Utc::now(),
        }
    }
}

/// Work item queued for investigation and explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudCase {
    /// `case_<transaction_id>`; redeliveries map to the same case
    pub case_id: String,
    pub transaction: Transaction,
    pub decision: Decision,
    pub features: FeatureVector,
    pub created_at: DateTime<Utc>,
}

impl FraudCase {
    pub fn new(transaction: &Transaction, decision: &Decision, features: &FeatureVector) -> Self {
        Self {
            case_id: format!("case_{}", transaction.transaction_id),
            transaction: transaction.clone(),
            decision: decision.clone(),
            features: *features,
            created_at: Utc::now(),
        }
    }
}
