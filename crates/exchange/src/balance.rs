use crate::error::ExchangeError;
use crate::ExchangeClient;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Caches the free balance of one asset for a short TTL.
///
/// Routine reads go through [`get`](Self::get); the order path calls
/// [`fresh`](Self::fresh) immediately before validating a buy so the risk
/// check never runs against a stale number.
pub struct BalanceCache {
    client: Arc<dyn ExchangeClient>,
    asset: String,
    ttl: Duration,
    state: Mutex<Option<CachedBalance>>,
}

#[derive(Debug, Clone, Copy)]
struct CachedBalance {
    fetched_at: Instant,
    value: Decimal,
}

impl BalanceCache {
    pub fn new(client: Arc<dyn ExchangeClient>, asset: impl Into<String>, ttl: Duration) -> Self {
        Self {
            client,
            asset: asset.into(),
            ttl,
            state: Mutex::new(None),
        }
    }

    /// The cached balance, re-fetched when older than the TTL.
    pub async fn get(&self) -> Result<Decimal, ExchangeError> {
        let mut state = self.state.lock().await;
        if let Some(cached) = *state {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.value);
            }
        }
        let value = self.client.balance(&self.asset).await?;
        *state = Some(CachedBalance {
            fetched_at: Instant::now(),
            value,
        });
        Ok(value)
    }

    /// Always fetches from the exchange and refreshes the cache.
    pub async fn fresh(&self) -> Result<Decimal, ExchangeError> {
        let value = self.client.balance(&self.asset).await?;
        let mut state = self.state.lock().await;
        *state = Some(CachedBalance {
            fetched_at: Instant::now(),
            value,
        });
        Ok(value)
    }

    /// Drops the cached value, forcing the next [`get`](Self::get) to fetch.
    pub async fn invalidate(&self) {
        *self.state.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responses::FillResult;
    use async_trait::async_trait;
    use core_types::{Kline, LotSize};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingClient {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ExchangeClient for CountingClient {
        async fn current_price(&self, _symbol: &str) -> Result<Decimal, ExchangeError> {
            unimplemented!()
        }
        async fn klines(
            &self,
            _symbol: &str,
            _interval: &str,
            _limit: u32,
        ) -> Result<Vec<Kline>, ExchangeError> {
            unimplemented!()
        }
        async fn balance(&self, _asset: &str) -> Result<Decimal, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(dec!(100))
        }
        async fn lot_size(&self, _symbol: &str) -> Result<LotSize, ExchangeError> {
            unimplemented!()
        }
        async fn market_buy(
            &self,
            _symbol: &str,
            _quantity: Decimal,
        ) -> Result<FillResult, ExchangeError> {
            unimplemented!()
        }
        async fn market_sell(
            &self,
            _symbol: &str,
            _quantity: Decimal,
        ) -> Result<FillResult, ExchangeError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn cached_reads_do_not_refetch_within_ttl() {
        let client = Arc::new(CountingClient {
            calls: AtomicU32::new(0),
        });
        let cache = BalanceCache::new(client.clone(), "USDT", Duration::from_secs(60));

        assert_eq!(cache.get().await.unwrap(), dec!(100));
        assert_eq!(cache.get().await.unwrap(), dec!(100));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fresh_always_refetches() {
        let client = Arc::new(CountingClient {
            calls: AtomicU32::new(0),
        });
        let cache = BalanceCache::new(client.clone(), "USDT", Duration::from_secs(60));

        cache.get().await.unwrap();
        cache.fresh().await.unwrap();
        cache.fresh().await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn invalidate_forces_a_refetch() {
        let client = Arc::new(CountingClient {
            calls: AtomicU32::new(0),
        });
        let cache = BalanceCache::new(client.clone(), "USDT", Duration::from_secs(60));

        cache.get().await.unwrap();
        cache.invalidate().await;
        cache.get().await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }
}
