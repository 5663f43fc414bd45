// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lease-based work queue and event bus for agent coordination.
//!
//! Messages are published into topics, claimed under time-bounded leases,
//! heartbeated while work is in flight, and acknowledged or rejected when it
//! finishes. A background sweeper reclaims expired leases; every transition
//! is recorded in an append-only audit log from which windowed metrics are
//! derived. [`Bus`] wires the pieces over one shared store.

pub mod lease;
pub mod metrics;
pub mod publisher;
pub mod recorder;
pub mod subscriber;
pub mod sweeper;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use drover_config::DroverConfig;
use drover_core::types::{ClaimFilter, Message, NewMessage, SubscribeFilter};
use drover_core::{BusError, BusStore};
use drover_storage::SqliteStore;

pub use lease::LeaseManager;
pub use metrics::MetricsAggregator;
pub use publisher::Publisher;
pub use recorder::EventRecorder;
pub use subscriber::{Subscriber, Subscription};
pub use sweeper::{SweepStats, Sweeper};

/// One bus over one store: publish, claim/extend/ack/nack, subscriptions,
/// audit access, and constructors for the background loops.
pub struct Bus {
    store: Arc<dyn BusStore>,
    config: DroverConfig,
    max_retries: u32,
    publisher: Publisher,
    leases: LeaseManager,
    subscriber: Subscriber,
    recorder: EventRecorder,
}

impl Bus {
    /// Open the configured SQLite store and build a bus over it. The config
    /// must pass [`drover_config::validate_config`] first; this only
    /// re-checks what the bus itself cannot run without.
    pub async fn open(config: DroverConfig) -> Result<Self, BusError> {
        let store = SqliteStore::open(&config.storage).await?;
        Self::with_store(Arc::new(store), config)
    }

    /// Build a bus over an existing store.
    pub fn with_store(store: Arc<dyn BusStore>, config: DroverConfig) -> Result<Self, BusError> {
        let max_retries = config
            .bus
            .max_retries
            .filter(|n| *n > 0)
            .ok_or_else(|| BusError::Config("bus.max_retries must be set and positive".into()))?;
        Ok(Bus {
            publisher: Publisher::new(store.clone(), config.bus.clone()),
            leases: LeaseManager::new(store.clone(), config.bus.clone(), max_retries),
            subscriber: Subscriber::new(store.clone(), config.bus.clone()),
            recorder: EventRecorder::new(store.clone()),
            store,
            config,
            max_retries,
        })
    }

    pub fn store(&self) -> Arc<dyn BusStore> {
        self.store.clone()
    }

    pub fn config(&self) -> &DroverConfig {
        &self.config
    }

    /// Validate, default, and enqueue a message.
    pub async fn publish(&self, new: NewMessage) -> Result<Message, BusError> {
        self.publisher.publish(new).await
    }

    /// Claim the best matching queued message for `claimant` under a lease
    /// of `lease_ms` (the configured default when `None`). `Ok(None)` means
    /// the queue is empty for this filter.
    pub async fn claim(
        &self,
        filter: &ClaimFilter,
        claimant: &str,
        lease_ms: Option<i64>,
    ) -> Result<Option<Message>, BusError> {
        self.leases.claim(filter, claimant, lease_ms).await
    }

    /// Heartbeat a held lease. Returns the new expiry timestamp.
    pub async fn extend(
        &self,
        message_id: &str,
        claimant: &str,
        additional_ms: i64,
    ) -> Result<i64, BusError> {
        self.leases.extend(message_id, claimant, additional_ms).await
    }

    /// Acknowledge completed work. Idempotent per claimant.
    pub async fn ack(&self, message_id: &str, claimant: &str) -> Result<(), BusError> {
        self.leases.ack(message_id, claimant).await
    }

    /// Reject work, either back to the queue or into a terminal error.
    pub async fn nack(
        &self,
        message_id: &str,
        claimant: &str,
        requeue: bool,
        reason: Option<&str>,
    ) -> Result<(), BusError> {
        self.leases.nack(message_id, claimant, requeue, reason).await
    }

    /// Fetch a message row by id.
    pub async fn get_message(&self, id: &str) -> Result<Option<Message>, BusError> {
        self.store.get_message(id).await
    }

    /// Open a polling subscription.
    pub fn subscribe(&self, filter: SubscribeFilter) -> Subscription {
        self.subscriber.subscribe(filter)
    }

    /// Audit-log access.
    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    /// A sweeper bound to this bus's store and retry budget.
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(self.store.clone(), self.config.bus.clone(), self.max_retries)
    }

    /// A metrics aggregator starting from cursor zero.
    pub fn metrics_aggregator(&self) -> MetricsAggregator {
        MetricsAggregator::new(self.store.clone(), self.config.metrics.clone())
    }

    /// Spawn the sweeper and metrics loops; both stop when `cancel` fires.
    pub fn start_background(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.sweeper().run(cancel.clone())),
            tokio::spawn(self.metrics_aggregator().run(cancel.clone())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn bus_requires_a_retry_budget() {
        let dir = tempdir().unwrap();
        let mut config = DroverConfig::default();
        config.storage.database_path =
            dir.path().join("bus.db").to_str().unwrap().to_string();
        assert!(config.bus.max_retries.is_none());

        let err = Bus::open(config.clone()).await.err().unwrap();
        assert!(matches!(err, BusError::Config(_)));

        config.bus.max_retries = Some(3);
        assert!(Bus::open(config).await.is_ok());
    }
}
