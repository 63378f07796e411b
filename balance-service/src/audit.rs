//! Audit sinks for committed balance changes
//!
//! Sinks are append-only and are called after a balance write has committed.
//! Delivery is at-least-once: consumers deduplicate on [`AuditRecord::id`].
//! A failed append never undoes the balance change it describes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::error::{Error, Result};
use common::model::audit::AuditRecord;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one record
    async fn append(&self, record: AuditRecord) -> Result<()>;
}

/// Discards every record
#[derive(Debug, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn append(&self, _record: AuditRecord) -> Result<()> {
        Ok(())
    }
}

/// Writes each record as a structured log event
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        info!(
            target: "audit",
            id = %record.id,
            account_id = %record.account_id,
            user_id = record.user_id,
            kind = %record.kind,
            old_balance = record.old_balance,
            new_balance = record.new_balance,
            timestamp = %record.timestamp,
            "balance changed"
        );
        Ok(())
    }
}

/// Keeps records in memory, in append order
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

/// Queues records on a bounded channel so the mutation path never waits on
/// the downstream sink
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::Sender<AuditRecord>,
}

/// Delivery attempts per record before it is dropped by the forwarder
const MAX_DELIVERY_ATTEMPTS: u32 = 3;

impl ChannelAuditSink {
    /// Create a sink and the receiving end of its queue
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AuditRecord>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Create a sink whose queue is drained into `downstream` by a
    /// background task
    pub fn spawn(capacity: usize, downstream: Arc<dyn AuditSink>) -> (Self, JoinHandle<()>) {
        let (sink, receiver) = Self::new(capacity);
        let handle = tokio::spawn(forward(receiver, downstream));
        (sink, handle)
    }
}

#[async_trait]
impl AuditSink for ChannelAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        self.sender.try_send(record).map_err(|e| match e {
            mpsc::error::TrySendError::Full(record) => Error::operation_failed(format!(
                "audit queue full, dropping record {}",
                record.id
            )),
            mpsc::error::TrySendError::Closed(record) => Error::operation_failed(format!(
                "audit queue closed, dropping record {}",
                record.id
            )),
        })
    }
}

/// Drain `receiver` into `downstream`, retrying failed appends
async fn forward(mut receiver: mpsc::Receiver<AuditRecord>, downstream: Arc<dyn AuditSink>) {
    while let Some(record) = receiver.recv().await {
        let mut attempt = 1;
        loop {
            match downstream.append(record.clone()).await {
                Ok(()) => break,
                Err(e) if attempt < MAX_DELIVERY_ATTEMPTS => {
                    warn!("Audit delivery attempt {} for {} failed: {}", attempt, record.id, e);
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Giving up on audit record {}: {}", record.id, e);
                    break;
                }
            }
        }
    }
}
