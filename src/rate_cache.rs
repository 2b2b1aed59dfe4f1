// Exchange rate cache
// Sits between price display and the upstream rate provider. Entries live for
// the configured TTL (24h by default); lookups never fail, they degrade to 1.0.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::RateCacheConfig;
use crate::model::Currency;
use crate::rate_provider::RateProvider;

#[derive(Debug, Default)]
pub struct CacheStats {
    pub items_count: AtomicUsize,
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub expired_count: AtomicUsize,
    pub fetch_count: AtomicUsize,
    pub fallback_count: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStatsReport {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub expired_count: usize,
    pub fetch_count: usize,
    pub fallback_count: usize,
}

/// Outcome of a rate lookup. `Unavailable` is only collapsed to an
/// identity rate at the pricing boundary, so it still shows up in logs
/// and in `fallback_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLookup {
    Rate(Decimal),
    Unavailable,
}

impl RateLookup {
    pub fn or_identity(self) -> Decimal {
        match self {
            RateLookup::Rate(rate) => rate,
            RateLookup::Unavailable => Decimal::ONE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateEntry {
    pub base: Currency,
    pub target: Currency,
    pub rate: Decimal,
    pub created_at: DateTime<Utc>,
}

impl RateEntry {
    fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.created_at <= ttl
    }
}

pub struct ExchangeRateCache {
    entries: DashMap<(Currency, Currency), RateEntry>,
    provider: Arc<dyn RateProvider>,
    clock: Arc<dyn Clock>,
    config: RateCacheConfig,
    stats: CacheStats,
}

impl ExchangeRateCache {
    pub fn new(
        config: RateCacheConfig,
        provider: Arc<dyn RateProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            provider,
            clock,
            config,
            stats: CacheStats::default(),
        }
    }

    /// Rate for `base -> target`, falling back to 1.0 when the provider
    /// cannot be reached.
    pub async fn get_rate(&self, base: Currency, target: Currency) -> Decimal {
        match self.lookup(base, target).await {
            RateLookup::Rate(rate) => rate,
            RateLookup::Unavailable => {
                self.stats.fallback_count.fetch_add(1, Ordering::SeqCst);
                warn!(%base, %target, "exchange rate unavailable, using identity rate");
                RateLookup::Unavailable.or_identity()
            }
        }
    }

    pub async fn lookup(&self, base: Currency, target: Currency) -> RateLookup {
        if base == target {
            return RateLookup::Rate(Decimal::ONE);
        }

        if let Some(entry) = self.cached(base, target) {
            self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
            return RateLookup::Rate(entry.rate);
        }
        self.stats.miss_count.fetch_add(1, Ordering::SeqCst);

        self.fetch(base, target).await
    }

    // Fresh entry for the pair, if any. Does not touch the provider.
    pub fn cached(&self, base: Currency, target: Currency) -> Option<RateEntry> {
        let entry = self
            .entries
            .get(&(base, target))
            .map(|e| e.value().clone())?;

        if entry.is_fresh(self.clock.now(), self.config.ttl()) {
            Some(entry)
        } else {
            self.stats.expired_count.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    // Record a rate obtained elsewhere, replacing whatever was cached for the pair
    pub fn insert(&self, entry: RateEntry) {
        if self
            .entries
            .insert((entry.base, entry.target), entry)
            .is_none()
        {
            self.stats.items_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn fetch(&self, base: Currency, target: Currency) -> RateLookup {
        self.stats.fetch_count.fetch_add(1, Ordering::SeqCst);

        let result =
            tokio::time::timeout(self.config.upstream_timeout(), self.provider.latest_rates(base))
                .await;

        let rates = match result {
            Ok(Ok(rates)) => rates,
            Ok(Err(e)) => {
                warn!(%base, %target, reason = %e, "exchange rate fetch failed");
                return RateLookup::Unavailable;
            }
            Err(_) => {
                warn!(
                    %base,
                    %target,
                    timeout_ms = self.config.upstream_timeout_ms,
                    "exchange rate fetch timed out"
                );
                return RateLookup::Unavailable;
            }
        };

        let Some(rate) = rates.get(&target).copied() else {
            warn!(%base, %target, "provider response has no rate for target");
            return RateLookup::Unavailable;
        };

        debug!(%base, %target, %rate, "caching exchange rate");
        self.insert(RateEntry {
            base,
            target,
            rate,
            created_at: self.clock.now(),
        });
        RateLookup::Rate(rate)
    }

    // Drop entries past their TTL; returns how many were removed
    pub fn prune_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.config.ttl();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now, ttl));
        let removed = before.saturating_sub(self.entries.len());
        self.stats.items_count.fetch_sub(removed, Ordering::SeqCst);
        removed
    }

    // Bulk invalidate entries matching the given base and/or target
    pub fn invalidate(&self, base: Option<Currency>, target: Option<Currency>) -> usize {
        let keys_to_remove: Vec<(Currency, Currency)> = self
            .entries
            .iter()
            .map(|e| *e.key())
            .filter(|(b, t)| base.map_or(true, |x| x == *b) && target.map_or(true, |x| x == *t))
            .collect();

        let mut count = 0;
        for key in keys_to_remove {
            if self.entries.remove(&key).is_some() {
                self.stats.items_count.fetch_sub(1, Ordering::SeqCst);
                count += 1;
            }
        }
        count
    }

    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            items_count: self.stats.items_count.load(Ordering::SeqCst),
            hit_count: self.stats.hit_count.load(Ordering::SeqCst),
            miss_count: self.stats.miss_count.load(Ordering::SeqCst),
            expired_count: self.stats.expired_count.load(Ordering::SeqCst),
            fetch_count: self.stats.fetch_count.load(Ordering::SeqCst),
            fallback_count: self.stats.fallback_count.load(Ordering::SeqCst),
        }
    }
}
