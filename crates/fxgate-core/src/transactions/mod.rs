//! Tracking of transactions broadcast through the gateway.
//!
//! A broadcast registers its hash as `pending`. Status lookups that find a receipt move
//! it to `confirmed` or `failed`. Entries age out after `max_age` regardless of status;
//! the cleanup task removes them, and lookups never return an aged-out entry.
//!
//! The table is bounded by `max_tracked`. While it is full, new hashes are still
//! broadcast but not tracked until the cleanup task frees space.

use crate::{config::TransactionsConfig, upstream::parse_hex_u64};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

/// Lifecycle of a tracked transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
    /// Neither tracked nor known to the upstream nodes.
    NotFound,
}

impl TxStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
            TxStatus::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is known about one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedTransaction {
    pub transaction_hash: String,
    pub status: TxStatus,
    pub block_number: Option<u64>,
    pub confirmations: Option<u64>,
    pub gas_used: Option<u64>,
    pub effective_gas_price: Option<String>,
    pub error: Option<String>,
    #[serde(skip)]
    tracked_at: Option<Instant>,
}

impl TrackedTransaction {
    fn pending(hash: String, now: Instant) -> Self {
        Self {
            transaction_hash: hash,
            status: TxStatus::Pending,
            block_number: None,
            confirmations: None,
            gas_used: None,
            effective_gas_price: None,
            error: None,
            tracked_at: Some(now),
        }
    }

    /// Pending record for a broadcast the tracker had no room for.
    #[must_use]
    pub fn untracked(hash: &str) -> Self {
        Self { status: TxStatus::Pending, ..Self::not_found(hash) }
    }

    /// Record for a hash nobody knows about.
    #[must_use]
    pub fn not_found(hash: &str) -> Self {
        Self {
            transaction_hash: hash.to_ascii_lowercase(),
            status: TxStatus::NotFound,
            block_number: None,
            confirmations: None,
            gas_used: None,
            effective_gas_price: None,
            error: None,
            tracked_at: None,
        }
    }

    /// Record built from a receipt alone, for hashes that were never tracked.
    #[must_use]
    pub fn from_outcome(hash: &str, outcome: &ReceiptOutcome) -> Self {
        let mut record = Self::not_found(hash);
        outcome.apply_to(&mut record);
        record
    }

    /// Whether the gateway itself broadcast this transaction.
    #[must_use]
    pub fn is_tracked(&self) -> bool {
        self.tracked_at.is_some()
    }

    fn is_expired(&self, now: Instant, max_age: Duration) -> bool {
        self.tracked_at.is_some_and(|at| now.duration_since(at) >= max_age)
    }
}

/// Inclusion details read from a transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptOutcome {
    pub status: TxStatus,
    pub block_number: Option<u64>,
    pub confirmations: Option<u64>,
    pub gas_used: Option<u64>,
    pub effective_gas_price: Option<String>,
}

impl ReceiptOutcome {
    /// Reads a receipt object. `status` `0x1` is confirmed, anything else failed.
    ///
    /// `latest_block` is used to count confirmations when known.
    #[must_use]
    pub fn from_receipt(receipt: &Value, latest_block: Option<u64>) -> Self {
        let status = if receipt.get("status").and_then(Value::as_str) == Some("0x1") {
            TxStatus::Confirmed
        } else {
            TxStatus::Failed
        };
        let block_number = receipt.get("blockNumber").and_then(parse_hex_u64);
        let confirmations = block_number
            .zip(latest_block)
            .map(|(included, latest)| latest.saturating_sub(included));

        Self {
            status,
            block_number,
            confirmations,
            gas_used: receipt.get("gasUsed").and_then(parse_hex_u64),
            effective_gas_price: receipt
                .get("effectiveGasPrice")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    fn apply_to(&self, record: &mut TrackedTransaction) {
        record.status = self.status;
        record.block_number = self.block_number;
        record.confirmations = self.confirmations;
        record.gas_used = self.gas_used;
        record.effective_gas_price.clone_from(&self.effective_gas_price);
        record.error = (self.status == TxStatus::Failed).then(|| "Transaction reverted".to_string());
    }
}

/// Counts reported under `transactions` in the metrics summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub total_tracked: usize,
    pub status_counts: StatusCounts,
    pub max_age_seconds: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub confirmed: usize,
    pub failed: usize,
}

/// In-memory table of broadcast transactions keyed by lower-cased hash.
pub struct TransactionTracker {
    transactions: Arc<DashMap<String, TrackedTransaction>>,
    max_age: Duration,
    max_tracked: usize,
}

impl Default for TransactionTracker {
    fn default() -> Self {
        Self::from_config(&TransactionsConfig::default())
    }
}

fn remove_expired(
    transactions: &DashMap<String, TrackedTransaction>,
    max_age: Duration,
    now: Instant,
) -> usize {
    let mut removed = 0;
    transactions.retain(|_, tx| {
        let expired = tx.is_expired(now, max_age);
        removed += usize::from(expired);
        !expired
    });
    removed
}

impl TransactionTracker {
    #[must_use]
    pub fn new(max_age: Duration, max_tracked: usize) -> Self {
        Self { transactions: Arc::new(DashMap::new()), max_age, max_tracked }
    }

    #[must_use]
    pub fn from_config(config: &TransactionsConfig) -> Self {
        Self::new(Duration::from_secs(config.max_age_seconds), config.max_tracked)
    }

    /// Starts tracking `hash` as pending, replacing any earlier entry for it.
    ///
    /// Returns `None` when the table is full.
    pub fn track(&self, hash: &str) -> Option<TrackedTransaction> {
        let key = hash.to_ascii_lowercase();

        if !self.transactions.contains_key(&key) && self.transactions.len() >= self.max_tracked {
            warn!(hash = %key, tracked = self.transactions.len(), "transaction tracker full, not tracking");
            return None;
        }

        let record = TrackedTransaction::pending(key.clone(), Instant::now());
        self.transactions.insert(key, record.clone());
        info!(hash = %record.transaction_hash, "tracking transaction");
        Some(record)
    }

    /// Returns the tracked entry for `hash`, ignoring case.
    #[must_use]
    pub fn get(&self, hash: &str) -> Option<TrackedTransaction> {
        let now = Instant::now();
        self.transactions
            .get(&hash.to_ascii_lowercase())
            .filter(|tx| !tx.is_expired(now, self.max_age))
            .map(|tx| tx.value().clone())
    }

    /// Applies a receipt to a tracked entry. Returns `None` for untracked hashes.
    pub fn update(&self, hash: &str, outcome: &ReceiptOutcome) -> Option<TrackedTransaction> {
        let now = Instant::now();
        let mut tx = self.transactions.get_mut(&hash.to_ascii_lowercase())?;
        if tx.is_expired(now, self.max_age) {
            return None;
        }

        if tx.status != outcome.status {
            debug!(hash = %tx.transaction_hash, from = %tx.status, to = %outcome.status, "transaction status changed");
        }
        outcome.apply_to(tx.value_mut());
        Some(tx.value().clone())
    }

    /// Drops entries older than `max_age`. Returns how many were removed.
    #[must_use = "the removal count is useful for logging"]
    pub fn cleanup(&self) -> usize {
        remove_expired(&self.transactions, self.max_age, Instant::now())
    }

    #[must_use]
    pub fn stats(&self) -> TrackerStats {
        let mut status_counts = StatusCounts::default();
        for tx in self.transactions.iter() {
            match tx.status {
                TxStatus::Pending => status_counts.pending += 1,
                TxStatus::Confirmed => status_counts.confirmed += 1,
                TxStatus::Failed => status_counts.failed += 1,
                TxStatus::NotFound => {}
            }
        }

        TrackerStats {
            total_tracked: self.transactions.len(),
            status_counts,
            max_age_seconds: self.max_age.as_secs(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Spawns periodic cleanup until `shutdown_rx` fires.
    pub fn start_cleanup_task(
        &self,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let transactions = Arc::clone(&self.transactions);
        let max_age = self.max_age;

        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "starting transaction tracker cleanup task");
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = remove_expired(&transactions, max_age, Instant::now());
                        if removed > 0 {
                            info!(removed = removed, tracked = transactions.len(), "cleaned up old transactions");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("transaction tracker cleanup task shutting down");
                        break;
                    }
                }
            }
        })
    }
}
