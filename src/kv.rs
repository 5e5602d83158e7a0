//! JetStream key-value bucket helpers shared by the profile and graph stores.

use anyhow::{Context, Result};
use async_nats::jetstream::{self, context::KeyValueErrorKind, kv};
use tracing::{info, warn};

/// Open a key-value bucket, creating it when the lookup fails.
///
/// The lookup error is logged before creation is attempted; if the server is
/// unreachable the create fails too and both errors are reported.
pub async fn open_bucket(js: &jetstream::Context, bucket: &str) -> Result<kv::Store> {
    match js.get_key_value(bucket).await {
        Ok(store) => Ok(store),
        Err(e) if !lookup_may_create(e.kind()) => {
            Err(e).with_context(|| format!("Invalid key-value bucket name {bucket:?}"))
        }
        Err(lookup) => {
            warn!(bucket = %bucket, error = %lookup, "Key-value bucket lookup failed, creating it");
            let store = js
                .create_key_value(kv::Config {
                    bucket: bucket.to_string(),
                    history: 1,
                    ..Default::default()
                })
                .await
                .with_context(|| {
                    format!("Failed to open key-value bucket {bucket} (lookup: {lookup})")
                })?;
            info!(bucket = %bucket, "Created key-value bucket");
            Ok(store)
        }
    }
}

/// Only a failed bucket lookup is worth a create attempt; a bad name never is.
fn lookup_may_create(kind: KeyValueErrorKind) -> bool {
    !matches!(kind, KeyValueErrorKind::InvalidStoreName)
}
