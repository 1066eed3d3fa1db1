use crate::error::BenchmarkError;
use crate::policy::CachePolicy;
use analytics::compute_benchmark;
use chrono::Utc;
use core_types::{BenchmarkEntry, BenchmarkKey, Metric, SegmentTier};
use database::{BenchmarkStore, CustomerStore};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// How a read-path request was satisfied.
#[derive(Debug, Clone)]
pub enum BenchmarkRead {
    /// A live entry was already cached.
    Hit(Arc<BenchmarkEntry>),
    /// The entry was missing or expired and has just been recomputed.
    Refreshed(Arc<BenchmarkEntry>),
    /// Recomputation failed; this is the last stored entry, already expired.
    Stale(Arc<BenchmarkEntry>),
}

impl BenchmarkRead {
    pub fn entry(&self) -> &Arc<BenchmarkEntry> {
        match self {
            BenchmarkRead::Hit(entry) | BenchmarkRead::Refreshed(entry) | BenchmarkRead::Stale(entry) => entry,
        }
    }

    pub fn into_entry(self) -> Arc<BenchmarkEntry> {
        match self {
            BenchmarkRead::Hit(entry) | BenchmarkRead::Refreshed(entry) | BenchmarkRead::Stale(entry) => entry,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, BenchmarkRead::Stale(_))
    }
}

/// TTL-gated distribution statistics per `(metric, segment)`.
///
/// The store holds the durable copy; `hot` mirrors it in-process. Both only
/// ever receive complete entries, and the hot map swaps whole `Arc`s, so a
/// reader sees one refresh generation or another, never a mix.
pub struct BenchmarkCache {
    customers: Arc<dyn CustomerStore>,
    store: Arc<dyn BenchmarkStore>,
    policy: CachePolicy,
    hot: RwLock<HashMap<BenchmarkKey, Arc<BenchmarkEntry>>>,
}

impl BenchmarkCache {
    pub fn new(customers: Arc<dyn CustomerStore>, store: Arc<dyn BenchmarkStore>, policy: CachePolicy) -> Self {
        Self { customers, store, policy, hot: RwLock::new(HashMap::new()) }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Fails with `InvalidMetric` unless `metric` is on the whitelist.
    pub fn ensure_metric(&self, metric: Metric) -> Result<(), BenchmarkError> {
        if self.policy.allows(metric) {
            Ok(())
        } else {
            Err(BenchmarkError::InvalidMetric(metric.to_string()))
        }
    }

    /// Recomputes the entry for one key and replaces the stored one.
    ///
    /// The computation runs under the refresh timeout. On timeout nothing is
    /// written and the previous entry stays in place.
    pub async fn refresh(
        &self,
        metric: Metric,
        segment: Option<SegmentTier>,
    ) -> Result<Arc<BenchmarkEntry>, BenchmarkError> {
        self.ensure_metric(metric)?;
        let key = BenchmarkKey::new(metric, segment);

        let entry = tokio::time::timeout(self.policy.refresh_timeout, self.compute(key))
            .await
            .map_err(|_| BenchmarkError::Timeout(key.to_string()))??;

        self.store.upsert_benchmark(&entry).await?;
        let entry = Arc::new(entry);
        self.remember(entry.clone()).await;

        tracing::info!(
            key = %key,
            sample_size = entry.stats.sample_size,
            expires_at = %entry.expires_at,
            "Benchmark refreshed."
        );
        Ok(entry)
    }

    /// The live entry for a key, or `None` when it is missing or expired.
    pub async fn lookup(
        &self,
        metric: Metric,
        segment: Option<SegmentTier>,
    ) -> Result<Option<Arc<BenchmarkEntry>>, BenchmarkError> {
        self.ensure_metric(metric)?;
        let key = BenchmarkKey::new(metric, segment);
        let now = Utc::now();

        if let Some(entry) = self.hot.read().await.get(&key) {
            if !entry.is_expired(now) {
                tracing::debug!(key = %key, "Benchmark served from memory.");
                return Ok(Some(entry.clone()));
            }
        }

        // Another process may have refreshed the key since we last looked.
        match self.store.get_benchmark(key).await? {
            Some(entry) if !entry.is_expired(now) => {
                let entry = Arc::new(entry);
                self.remember(entry.clone()).await;
                Ok(Some(entry))
            }
            _ => Ok(None),
        }
    }

    /// The stored entry for a key, expired or not.
    pub async fn peek(
        &self,
        metric: Metric,
        segment: Option<SegmentTier>,
    ) -> Result<Option<Arc<BenchmarkEntry>>, BenchmarkError> {
        self.ensure_metric(metric)?;
        let key = BenchmarkKey::new(metric, segment);
        if let Some(entry) = self.hot.read().await.get(&key) {
            return Ok(Some(entry.clone()));
        }
        Ok(self.store.get_benchmark(key).await?.map(Arc::new))
    }

    /// The read path: a live entry if there is one, otherwise a bounded
    /// refresh, falling back to the expired entry if the refresh fails.
    pub async fn get_or_refresh(
        &self,
        metric: Metric,
        segment: Option<SegmentTier>,
    ) -> Result<BenchmarkRead, BenchmarkError> {
        if let Some(entry) = self.lookup(metric, segment).await? {
            return Ok(BenchmarkRead::Hit(entry));
        }

        match self.refresh(metric, segment).await {
            Ok(entry) => Ok(BenchmarkRead::Refreshed(entry)),
            Err(err) => match self.peek(metric, segment).await {
                Ok(Some(stale)) => {
                    tracing::warn!(
                        key = %stale.key(),
                        expires_at = %stale.expires_at,
                        error = %err,
                        "Benchmark refresh failed; serving stale entry."
                    );
                    Ok(BenchmarkRead::Stale(stale))
                }
                _ => Err(err),
            },
        }
    }

    /// Refreshes every key whose entry is missing or expired, concurrently.
    ///
    /// Returns the keys that were attempted with their outcome.
    pub async fn refresh_expired(&self) -> Vec<(BenchmarkKey, Result<Arc<BenchmarkEntry>, BenchmarkError>)> {
        let mut due = Vec::new();
        for key in self.policy.keys() {
            match self.lookup(key.metric, key.segment).await {
                Ok(Some(_)) => {}
                Ok(None) => due.push(key),
                Err(err) => tracing::warn!(key = %key, error = %err, "Benchmark lookup failed; refreshing anyway."),
            }
        }

        let outcomes = join_all(due.iter().map(|key| self.refresh(key.metric, key.segment))).await;
        due.into_iter().zip(outcomes).collect()
    }

    async fn compute(&self, key: BenchmarkKey) -> Result<BenchmarkEntry, BenchmarkError> {
        let customers = self.customers.list_live_customers(key.segment).await?;
        let computed = compute_benchmark(&customers, key.metric, self.policy.performer_count)?;

        let calculated_at = Utc::now();
        Ok(BenchmarkEntry {
            metric: key.metric,
            segment: key.segment,
            stats: computed.stats,
            top_performers: computed.top_performers,
            bottom_performers: computed.bottom_performers,
            distribution: computed.distribution,
            calculated_at,
            expires_at: calculated_at + self.policy.ttl,
        })
    }

    /// Installs an entry in the hot map unless a newer generation is already there.
    async fn remember(&self, entry: Arc<BenchmarkEntry>) {
        let mut hot = self.hot.write().await;
        let key = entry.key();
        let newer_present = hot.get(&key).is_some_and(|current| current.calculated_at > entry.calculated_at);
        if !newer_present {
            hot.insert(key, entry);
        }
    }
}
