//! 响应缓存
//!
//! 按 操作 + 参数 缓存序列化后的 JSON：
//! - 未过期直接返回，同一 key 两次命中的内容逐字节相同
//! - 过期条目保留，重新获取失败时作为兜底返回并标记为过期数据
//! - 同一 key 同一时刻只有一次上游调用，并发请求共享结果
//! - 条目数超过上限时淘汰最早写入的条目

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::config::CacheConfig;
use crate::services::error::{ServiceError, ServiceResult};

// ==================== 时钟 ====================

/// 可注入的时钟，测试中使用手动时钟
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动推进的时钟
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let (Ok(mut now), Ok(by)) = (self.now.lock(), chrono::Duration::from_std(by)) {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

// ==================== TTL ====================

/// 缓存类别，决定 TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Quote,
    History,
    Overview,
    News,
    Currency,
    Auxiliary,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Quote => "quote",
            CacheKind::History => "history",
            CacheKind::Overview => "overview",
            CacheKind::News => "news",
            CacheKind::Currency => "currency",
            CacheKind::Auxiliary => "aux",
        }
    }

    /// 缓存 key：类别 + 参数
    pub fn key(&self, parts: &[&str]) -> String {
        let mut key = self.as_str().to_string();
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }
}

/// 各类别的 TTL
#[derive(Debug, Clone)]
pub struct TtlTable {
    pub quote: Duration,
    pub history: Duration,
    pub overview: Duration,
    pub news: Duration,
    pub currency: Duration,
    pub auxiliary: Duration,
}

impl TtlTable {
    pub fn get(&self, kind: CacheKind) -> Duration {
        match kind {
            CacheKind::Quote => self.quote,
            CacheKind::History => self.history,
            CacheKind::Overview => self.overview,
            CacheKind::News => self.news,
            CacheKind::Currency => self.currency,
            CacheKind::Auxiliary => self.auxiliary,
        }
    }
}

impl From<&CacheConfig> for TtlTable {
    fn from(config: &CacheConfig) -> Self {
        Self {
            quote: Duration::from_secs(config.quote_ttl_secs),
            history: Duration::from_secs(config.history_ttl_secs),
            overview: Duration::from_secs(config.overview_ttl_secs),
            news: Duration::from_secs(config.news_ttl_secs),
            currency: Duration::from_secs(config.currency_ttl_secs),
            auxiliary: Duration::from_secs(config.auxiliary_ttl_secs),
        }
    }
}

// ==================== 缓存服务 ====================

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    stored_at: DateTime<Utc>,
}

/// 缓存读取结果
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPayload {
    pub body: String,
    /// 是否为重新获取失败后返回的过期数据
    pub stale: bool,
}

type SharedFetch = Shared<BoxFuture<'static, ServiceResult<String>>>;

/// 缓存服务
pub struct CacheService {
    clock: Arc<dyn Clock>,
    ttls: TtlTable,
    max_entries: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
    in_flight: Mutex<HashMap<String, SharedFetch>>,
}

impl CacheService {
    pub fn new(clock: Arc<dyn Clock>, ttls: TtlTable, max_entries: usize) -> Self {
        Self {
            clock,
            ttls,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Arc::new(SystemClock), TtlTable::from(config), config.max_entries)
    }

    /// 读取缓存，未命中时调用 `fetch` 获取并写入
    ///
    /// `fetch` 只在没有同 key 请求进行中时被调用
    pub async fn get_or_fetch<F, Fut>(&self, kind: CacheKind, key: String, fetch: F) -> ServiceResult<CachedPayload>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ServiceResult<String>> + Send + 'static,
    {
        if let Some(body) = self.fresh(kind, &key)? {
            log::debug!("缓存命中: {}", key);
            return Ok(CachedPayload { body, stale: false });
        }

        let shared = {
            let mut in_flight = self.in_flight.lock().map_err(|_| lock_error())?;
            match in_flight.get(&key) {
                Some(existing) => {
                    log::debug!("等待进行中的请求: {}", key);
                    existing.clone()
                }
                None => {
                    log::debug!("缓存未命中: {}", key);
                    let shared = fetch().boxed().shared();
                    in_flight.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };

        let result = shared.clone().await;

        // 第一个完成的等待者负责清理进行中标记并写入缓存
        let finished_first = {
            let mut in_flight = self.in_flight.lock().map_err(|_| lock_error())?;
            match in_flight.get(&key) {
                Some(current) if current.ptr_eq(&shared) => {
                    in_flight.remove(&key);
                    true
                }
                _ => false,
            }
        };

        match result {
            Ok(body) => {
                if finished_first {
                    self.store(&key, body.clone())?;
                }
                Ok(CachedPayload { body, stale: false })
            }
            Err(e) => match self.stale(&key)? {
                Some(body) => {
                    log::warn!("{} 获取失败（{}），返回过期缓存", key, e);
                    Ok(CachedPayload { body, stale: true })
                }
                None => Err(e),
            },
        }
    }

    /// 当前条目数（包括已过期的）
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    fn fresh(&self, kind: CacheKind, key: &str) -> ServiceResult<Option<String>> {
        let ttl = chrono::Duration::from_std(self.ttls.get(kind)).unwrap_or_else(|_| chrono::Duration::zero());
        let now = self.clock.now();
        let entries = self.entries.lock().map_err(|_| lock_error())?;
        Ok(entries
            .get(key)
            .filter(|entry| now - entry.stored_at < ttl)
            .map(|entry| entry.body.clone()))
    }

    fn stale(&self, key: &str) -> ServiceResult<Option<String>> {
        let entries = self.entries.lock().map_err(|_| lock_error())?;
        Ok(entries.get(key).map(|entry| entry.body.clone()))
    }

    fn store(&self, key: &str, body: String) -> ServiceResult<()> {
        let stored_at = self.clock.now();
        let mut entries = self.entries.lock().map_err(|_| lock_error())?;

        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                log::debug!("缓存已满，淘汰 {}", oldest);
                entries.remove(&oldest);
            }
        }

        entries.insert(key.to_string(), CacheEntry { body, stored_at });
        Ok(())
    }
}

fn lock_error() -> ServiceError {
    ServiceError::internal("缓存锁已损坏")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup(max_entries: usize) -> (Arc<ManualClock>, CacheService) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 3, 12, 0, 0).unwrap()));
        let ttls = TtlTable::from(&CacheConfig::default());
        let cache = CacheService::new(clock.clone(), ttls, max_entries);
        (clock, cache)
    }

    fn counting_fetch(
        counter: &Arc<AtomicUsize>,
        result: ServiceResult<String>,
    ) -> impl FnOnce() -> BoxFuture<'static, ServiceResult<String>> {
        let counter = counter.clone();
        move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                result
            }
            .boxed()
        }
    }

    #[test]
    fn test_key_format() {
        assert_eq!(CacheKind::History.key(&["AAPL", "1y", "1wk"]), "history:AAPL:1y:1wk");
        assert_eq!(CacheKind::Quote.key(&["MSFT"]), "quote:MSFT");
    }

    #[tokio::test]
    async fn test_hit_within_ttl_is_identical() {
        let (clock, cache) = setup(100);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKind::Quote.key(&["AAPL"]);

        let first = cache
            .get_or_fetch(CacheKind::Quote, key.clone(), counting_fetch(&calls, Ok(r#"{"price":1.5}"#.into())))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(59));
        let second = cache
            .get_or_fetch(CacheKind::Quote, key, counting_fetch(&calls, Ok(r#"{"price":2.0}"#.into())))
            .await
            .unwrap();

        assert_eq!(first.body.as_bytes(), second.body.as_bytes());
        assert!(!second.stale);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let (clock, cache) = setup(100);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKind::Quote.key(&["AAPL"]);

        cache
            .get_or_fetch(CacheKind::Quote, key.clone(), counting_fetch(&calls, Ok("1".into())))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(60));
        let refreshed = cache
            .get_or_fetch(CacheKind::Quote, key, counting_fetch(&calls, Ok("2".into())))
            .await
            .unwrap();

        assert_eq!(refreshed.body, "2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stale_entry_served_on_failure() {
        let (clock, cache) = setup(100);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKind::Overview.key(&["AAPL"]);

        cache
            .get_or_fetch(CacheKind::Overview, key.clone(), counting_fetch(&calls, Ok("good".into())))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(2 * 86400));

        let payload = cache
            .get_or_fetch(
                CacheKind::Overview,
                key.clone(),
                counting_fetch(&calls, Err(ServiceError::not_found("gone"))),
            )
            .await
            .unwrap();
        assert_eq!(payload.body, "good");
        assert!(payload.stale);

        // 没有旧数据时错误原样返回
        let err = cache
            .get_or_fetch(
                CacheKind::Overview,
                CacheKind::Overview.key(&["ZZZZ"]),
                counting_fetch(&calls, Err(ServiceError::not_found("gone"))),
            )
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::not_found("gone"));
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let (_clock, cache) = setup(100);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKind::Quote.key(&["AAPL"]);

        let _ = cache
            .get_or_fetch(CacheKind::Quote, key.clone(), counting_fetch(&calls, Err(ServiceError::not_found("x"))))
            .await;
        let ok = cache
            .get_or_fetch(CacheKind::Quote, key, counting_fetch(&calls, Ok("1".into())))
            .await
            .unwrap();
        assert_eq!(ok.body, "1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let (_clock, cache) = setup(100);
        let cache = Arc::new(cache);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKind::History.key(&["AAPL", "3mo", "1d"]);

        let slow_fetch = |calls: Arc<AtomicUsize>| {
            move || {
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, ServiceError>("[1,2,3]".to_string())
                }
                .boxed()
            }
        };

        let (a, b, c) = tokio::join!(
            cache.get_or_fetch(CacheKind::History, key.clone(), slow_fetch(calls.clone())),
            cache.get_or_fetch(CacheKind::History, key.clone(), slow_fetch(calls.clone())),
            cache.get_or_fetch(CacheKind::History, key.clone(), slow_fetch(calls.clone())),
        );

        assert_eq!(a.unwrap().body, "[1,2,3]");
        assert_eq!(b.unwrap().body, "[1,2,3]");
        assert_eq!(c.unwrap().body, "[1,2,3]");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let (clock, cache) = setup(2);
        let calls = Arc::new(AtomicUsize::new(0));

        for symbol in ["A", "B", "C"] {
            cache
                .get_or_fetch(CacheKind::Quote, CacheKind::Quote.key(&[symbol]), counting_fetch(&calls, Ok(symbol.into())))
                .await
                .unwrap();
            clock.advance(Duration::from_secs(1));
        }
        assert_eq!(cache.len(), 2);

        // A 已被淘汰，需要重新获取
        cache
            .get_or_fetch(CacheKind::Quote, CacheKind::Quote.key(&["A"]), counting_fetch(&calls, Ok("A".into())))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        // C 仍在缓存中
        cache
            .get_or_fetch(CacheKind::Quote, CacheKind::Quote.key(&["C"]), counting_fetch(&calls, Ok("C".into())))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
