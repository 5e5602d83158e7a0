//! NATS producers for fraud cases and alerts

use crate::dispatcher::{AlertNotifier, CaseQueue};
use crate::types::alert::{FraudAlert, FraudCase};
use anyhow::{Context, Result};
use async_nats::jetstream::{self, context::Publish, stream};
use async_nats::Client;
use async_trait::async_trait;
use tracing::{debug, info};

/// Publishes cases to a JetStream work-queue stream.
///
/// Each publish waits for the server acknowledgement. The case id is used as
/// the message id, so a redelivered transaction does not open a second case
/// within the stream's duplicate window.
#[derive(Clone)]
pub struct CaseProducer {
    jetstream: jetstream::Context,
    subject: String,
}

impl CaseProducer {
    pub fn new(jetstream: jetstream::Context, subject: &str) -> Self {
        Self {
            jetstream,
            subject: subject.to_string(),
        }
    }

    /// Make sure the work-queue stream for cases exists.
    pub async fn ensure_stream(&self, stream_name: &str) -> Result<()> {
        self.jetstream
            .get_or_create_stream(stream::Config {
                name: stream_name.to_string(),
                subjects: vec![self.subject.clone()],
                retention: stream::RetentionPolicy::WorkQueue,
                ..Default::default()
            })
            .await
            .with_context(|| format!("Failed to open case stream {stream_name}"))?;

        info!(stream = %stream_name, subject = %self.subject, "Case stream ready");
        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[async_trait]
impl CaseQueue for CaseProducer {
    async fn enqueue(&self, case: &FraudCase) -> Result<()> {
        let payload = serde_json::to_vec(case)?;
        let publish = Publish::build()
            .payload(payload.into())
            .message_id(case.case_id.as_str());

        let ack = self
            .jetstream
            .send_publish(self.subject.clone(), publish)
            .await?
            .await?;

        debug!(
            case_id = %case.case_id,
            stream = %ack.stream,
            sequence = ack.sequence,
            duplicate = ack.duplicate,
            "Enqueued fraud case"
        );

        Ok(())
    }
}

/// Producer for publishing fraud alerts to NATS
#[derive(Clone)]
pub struct AlertProducer {
    client: Client,
    subject: String,
}

impl AlertProducer {
    /// Create a new alert producer
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[async_trait]
impl AlertNotifier for AlertProducer {
    async fn notify(&self, alert: &FraudAlert) -> Result<()> {
        let payload = serde_json::to_vec(alert)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            alert_id = %alert.alert_id,
            transaction_id = %alert.transaction_id,
            fraud_probability = alert.fraud_probability,
            "Published fraud alert"
        );

        Ok(())
    }
}
