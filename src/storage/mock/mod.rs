//! Mock storage implementation for testing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Delegation, DelegationStore, NewDelegation, Result, StorageError, Watermark};

#[derive(Default)]
struct Rows {
    delegations: Vec<(i32, Delegation)>,
    tzkt_ids: HashSet<i64>,
    next_id: i64,
}

/// Mock delegation store that keeps rows in memory.
///
/// Mirrors the SQL semantics: unique upstream ids, atomic batches, and
/// newest-first paging with surrogate id tie-break.
#[derive(Default)]
pub struct MockDelegationStore {
    rows: RwLock<Rows>,
    fail_on_write: RwLock<bool>,
    fail_on_watermark: RwLock<bool>,
    fail_on_page: RwLock<bool>,
    fail_on_ping: RwLock<bool>,
    calls: AtomicUsize,
}

impl MockDelegationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    pub async fn set_fail_on_watermark(&self, fail: bool) {
        *self.fail_on_watermark.write().await = fail;
    }

    pub async fn set_fail_on_page(&self, fail: bool) {
        *self.fail_on_page.write().await = fail;
    }

    pub async fn set_fail_on_ping(&self, fail: bool) {
        *self.fail_on_ping.write().await = fail;
    }

    /// Number of storage operations invoked so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of persisted rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.delegations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// All persisted rows in insertion order.
    pub async fn all(&self) -> Vec<Delegation> {
        self.rows
            .read()
            .await
            .delegations
            .iter()
            .map(|(_, row)| row.clone())
            .collect()
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn injected(operation: &str) -> StorageError {
    StorageError::Unavailable(format!("injected {} failure", operation))
}

#[async_trait]
impl DelegationStore for MockDelegationStore {
    async fn bulk_write(&self, rows: &[NewDelegation]) -> Result<()> {
        self.record_call();
        if rows.is_empty() {
            return Ok(());
        }
        if *self.fail_on_write.read().await {
            return Err(injected("write"));
        }

        let mut store = self.rows.write().await;
        for row in rows {
            if !store.tzkt_ids.insert(row.tzkt_id) {
                continue;
            }
            store.next_id += 1;
            let delegation = Delegation {
                id: store.next_id,
                timestamp: row.timestamp,
                amount: row.amount,
                delegator: row.delegator.clone(),
                level: row.level,
            };
            store.delegations.push((row.year(), delegation));
        }
        Ok(())
    }

    async fn watermark(&self) -> Result<Watermark> {
        self.record_call();
        if *self.fail_on_watermark.read().await {
            return Err(injected("watermark"));
        }

        let store = self.rows.read().await;
        let timestamp = store.delegations.iter().map(|(_, d)| d.timestamp).max();
        let level = store.delegations.iter().map(|(_, d)| d.level).max();

        Ok(match timestamp {
            Some(timestamp) => Watermark {
                timestamp,
                level: level.unwrap_or(0),
            },
            None => Watermark::empty(),
        })
    }

    async fn page(&self, year: Option<i32>, limit: u64, offset: u64) -> Result<Vec<Delegation>> {
        self.record_call();
        if *self.fail_on_page.read().await {
            return Err(injected("page"));
        }

        let store = self.rows.read().await;
        let mut matching: Vec<Delegation> = store
            .delegations
            .iter()
            .filter(|(row_year, _)| year.map_or(true, |y| y == *row_year))
            .map(|(_, d)| d.clone())
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn ping(&self) -> Result<()> {
        self.record_call();
        if *self.fail_on_ping.read().await {
            return Err(injected("ping"));
        }
        Ok(())
    }

    fn open_connections(&self) -> u32 {
        1
    }
}
