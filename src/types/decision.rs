//! Graph, scoring and decision results

use serde::{Deserialize, Serialize};
use std::fmt;

/// A/B variant that scored a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVersion {
    Champion,
    Challenger,
}

impl ModelVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVersion::Champion => "champion",
            ModelVersion::Challenger => "challenger",
        }
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a graph linkage check for one entity.
///
/// `CheckUnavailable` is kept distinct so it shows up in logs and metrics,
/// but it never counts as a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GraphLinkResult {
    Linked { related_node_id: String },
    NotLinked,
    CheckUnavailable,
}

impl GraphLinkResult {
    pub fn is_linked(&self) -> bool {
        matches!(self, GraphLinkResult::Linked { .. })
    }

    pub fn linked_node(&self) -> Option<&str> {
        match self {
            GraphLinkResult::Linked { related_node_id } => Some(related_node_id),
            _ => None,
        }
    }

    /// Combine checks over several entities; the first link wins.
    pub fn any_linked<I>(results: I) -> GraphLinkResult
    where
        I: IntoIterator<Item = GraphLinkResult>,
    {
        let mut unavailable = false;
        for result in results {
            match result {
                GraphLinkResult::Linked { .. } => return result,
                GraphLinkResult::CheckUnavailable => unavailable = true,
                GraphLinkResult::NotLinked => {}
            }
        }
        if unavailable {
            GraphLinkResult::CheckUnavailable
        } else {
            GraphLinkResult::NotLinked
        }
    }
}

/// Model verdict for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    pub model_version: ModelVersion,
    /// Probability of the fraud class, in [0, 1]
    pub fraud_probability: f64,
    /// `fraud_probability > threshold`
    pub is_fraud: bool,
}

/// Final, fused decision for a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub transaction_id: String,
    pub is_fraud: bool,
    pub fraud_probability: f64,
    pub model_version: ModelVersion,
    pub graph_flag: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_node_id: Option<String>,
}
