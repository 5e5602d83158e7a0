//! Action dispatch after a decision.
//!
//! Fraud decisions are escalated (case + alert), legitimate ones refresh the
//! user's profile. Delivery failures are logged and reported, never raised:
//! the decision stands regardless of what happens downstream.

use crate::profile_store::ProfileStore;
use crate::types::alert::{FraudAlert, FraudCase, RiskLevelThresholds};
use crate::types::decision::Decision;
use crate::types::features::FeatureVector;
use crate::types::transaction::Transaction;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Durable queue of cases awaiting investigation.
#[async_trait]
pub trait CaseQueue: Send + Sync {
    async fn enqueue(&self, case: &FraudCase) -> Result<()>;
}

/// Notification channel for fraud alerts.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, alert: &FraudAlert) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed,
}

impl Delivery {
    fn from_result(result: &Result<()>) -> Self {
        if result.is_ok() {
            Delivery::Delivered
        } else {
            Delivery::Failed
        }
    }
}

/// What the dispatcher attempted and how it went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchReport {
    Escalated { case: Delivery, alert: Delivery },
    ProfileUpdated(Delivery),
}

impl DispatchReport {
    /// Number of failed downstream deliveries.
    pub fn failures(&self) -> usize {
        match self {
            DispatchReport::Escalated { case, alert } => {
                (*case == Delivery::Failed) as usize + (*alert == Delivery::Failed) as usize
            }
            DispatchReport::ProfileUpdated(delivery) => (*delivery == Delivery::Failed) as usize,
        }
    }
}

pub struct ActionDispatcher {
    cases: Arc<dyn CaseQueue>,
    alerts: Arc<dyn AlertNotifier>,
    profiles: Arc<dyn ProfileStore>,
    risk_levels: RiskLevelThresholds,
}

impl ActionDispatcher {
    pub fn new(
        cases: Arc<dyn CaseQueue>,
        alerts: Arc<dyn AlertNotifier>,
        profiles: Arc<dyn ProfileStore>,
        risk_levels: RiskLevelThresholds,
    ) -> Self {
        Self {
            cases,
            alerts,
            profiles,
            risk_levels,
        }
    }

    pub async fn dispatch(
        &self,
        tx: &Transaction,
        decision: &Decision,
        features: &FeatureVector,
    ) -> DispatchReport {
        if decision.is_fraud {
            self.escalate(tx, decision, features).await
        } else {
            self.refresh_profile(tx).await
        }
    }

    /// Case and alert are independent; one failing does not stop the other.
    async fn escalate(
        &self,
        tx: &Transaction,
        decision: &Decision,
        features: &FeatureVector,
    ) -> DispatchReport {
        let case = FraudCase::new(tx, decision, features);
        let alert = FraudAlert::for_decision(tx, decision, &self.risk_levels);

        let (case_result, alert_result) =
            tokio::join!(self.cases.enqueue(&case), self.alerts.notify(&alert));

        if let Err(e) = &case_result {
            error!(
                transaction_id = %tx.transaction_id,
                case_id = %case.case_id,
                error = %e,
                "Failed to enqueue fraud case"
            );
        }
        if let Err(e) = &alert_result {
            error!(
                transaction_id = %tx.transaction_id,
                alert_id = %alert.alert_id,
                error = %e,
                "Failed to publish fraud alert"
            );
        }

        let report = DispatchReport::Escalated {
            case: Delivery::from_result(&case_result),
            alert: Delivery::from_result(&alert_result),
        };

        if report.failures() == 0 {
            info!(
                transaction_id = %tx.transaction_id,
                case_id = %case.case_id,
                risk_level = alert.risk_level.as_str(),
                "Fraud case and alert published"
            );
        }
        report
    }

    async fn refresh_profile(&self, tx: &Transaction) -> DispatchReport {
        let result = self
            .profiles
            .update(&tx.user_id, tx.latitude, tx.longitude, tx.timestamp)
            .await;

        if let Err(e) = &result {
            warn!(
                transaction_id = %tx.transaction_id,
                user_id = %tx.user_id,
                error = %e,
                "Profile update failed, profile may be stale"
            );
        }
        DispatchReport::ProfileUpdated(Delivery::from_result(&result))
    }
}
