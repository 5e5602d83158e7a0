//! Graph linkage checks against the relationship store.
//!
//! The check fails open: a store error or timeout produces
//! `GraphLinkResult::CheckUnavailable`, which is never treated as a link.

use crate::types::decision::GraphLinkResult;
use crate::types::transaction::Transaction;
use anyhow::{Context, Result};
use async_nats::jetstream::kv;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Properties of the node at the other end of an edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeProperties {
    #[serde(default)]
    pub is_fraudulent: bool,
}

/// One adjacency item for a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub related_node_id: String,
    #[serde(default)]
    pub related_node_properties: NodeProperties,
}

/// Transaction attribute used as a graph node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphEntity {
    User,
    Card,
    Ip,
}

impl GraphEntity {
    pub fn id_of<'a>(&self, tx: &'a Transaction) -> &'a str {
        match self {
            GraphEntity::User => &tx.user_id,
            GraphEntity::Card => &tx.card_hash,
            GraphEntity::Ip => &tx.ip_address,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GraphEntity::User => "user",
            GraphEntity::Card => "card",
            GraphEntity::Ip => "ip",
        }
    }
}

/// Adjacency lookup keyed by node id.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// All edges leaving `node_id`; empty for an unknown node.
    async fn edges(&self, node_id: &str) -> Result<Vec<GraphEdge>>;
}

/// Decides whether entities are adjacent to known-fraudulent nodes.
pub struct GraphLinkageChecker {
    store: Arc<dyn GraphStore>,
    timeout: Duration,
}

impl GraphLinkageChecker {
    pub fn new(store: Arc<dyn GraphStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Check a single entity.
    pub async fn check(&self, entity_id: &str) -> GraphLinkResult {
        let edges = match tokio::time::timeout(self.timeout, self.store.edges(entity_id)).await {
            Ok(Ok(edges)) => edges,
            Ok(Err(e)) => {
                warn!(entity_id = %entity_id, error = %e, "Graph query failed, treating as not linked");
                return GraphLinkResult::CheckUnavailable;
            }
            Err(_) => {
                warn!(
                    entity_id = %entity_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Graph query timed out, treating as not linked"
                );
                return GraphLinkResult::CheckUnavailable;
            }
        };

        match edges
            .into_iter()
            .find(|edge| edge.related_node_properties.is_fraudulent)
        {
            Some(edge) => {
                warn!(
                    entity_id = %entity_id,
                    related_node_id = %edge.related_node_id,
                    "Entity linked to fraudulent node"
                );
                GraphLinkResult::Linked {
                    related_node_id: edge.related_node_id,
                }
            }
            None => {
                debug!(entity_id = %entity_id, "No fraudulent links found");
                GraphLinkResult::NotLinked
            }
        }
    }

    /// `true` only when a fraudulent neighbour was actually found.
    pub async fn is_linked_to_fraud(&self, entity_id: &str) -> bool {
        self.check(entity_id).await.is_linked()
    }

    /// Check several entities concurrently; empty ids are skipped.
    pub async fn check_all(&self, entity_ids: &[&str]) -> GraphLinkResult {
        let checks = entity_ids
            .iter()
            .filter(|id| !id.is_empty())
            .map(|id| self.check(id));

        GraphLinkResult::any_linked(futures::future::join_all(checks).await)
    }
}

/// Process-local adjacency store.
#[derive(Default)]
pub struct InMemoryGraphStore {
    adjacency: DashMap<String, Vec<GraphEdge>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&self, node_id: &str, related_node_id: &str, is_fraudulent: bool) {
        self.adjacency
            .entry(node_id.to_string())
            .or_default()
            .push(GraphEdge {
                related_node_id: related_node_id.to_string(),
                related_node_properties: NodeProperties { is_fraudulent },
            });
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn edges(&self, node_id: &str) -> Result<Vec<GraphEdge>> {
        Ok(self
            .adjacency
            .get(node_id)
            .map(|edges| edges.clone())
            .unwrap_or_default())
    }
}

/// Adjacency lists stored as JSON arrays in a JetStream key-value bucket.
pub struct KvGraphStore {
    bucket: kv::Store,
}

impl KvGraphStore {
    pub fn new(bucket: kv::Store) -> Self {
        Self { bucket }
    }
}

#[async_trait]
impl GraphStore for KvGraphStore {
    async fn edges(&self, node_id: &str) -> Result<Vec<GraphEdge>> {
        let entry = self
            .bucket
            .get(node_id)
            .await
            .with_context(|| format!("Failed to query graph node {node_id}"))?;

        match entry {
            Some(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Corrupt adjacency list for {node_id}")),
            None => Ok(Vec::new()),
        }
    }
}
