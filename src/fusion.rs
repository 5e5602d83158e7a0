//! Decision fusion: graph linkage OR model verdict.
//!
//! Either signal alone flags fraud. There is no weighting and no veto; an
//! unavailable graph check contributes nothing, exactly like "not linked".

use crate::types::decision::{Decision, GraphLinkResult, ScoringResult};

/// Fuse a boolean graph flag with a model verdict.
pub fn fuse(transaction_id: &str, graph_flag: bool, scoring: &ScoringResult) -> Decision {
    Decision {
        transaction_id: transaction_id.to_string(),
        is_fraud: graph_flag || scoring.is_fraud,
        fraud_probability: scoring.fraud_probability,
        model_version: scoring.model_version,
        graph_flag,
        linked_node_id: None,
    }
}

/// Fuse a graph check result, keeping the linked node for the alert.
pub fn fuse_link(transaction_id: &str, graph: &GraphLinkResult, scoring: &ScoringResult) -> Decision {
    let mut decision = fuse(transaction_id, graph.is_linked(), scoring);
    decision.linked_node_id = graph.linked_node().map(str::to_string);
    decision
}
