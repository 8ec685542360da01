//! 单数据源调用间隔控制
//!
//! 免费档位的数据源要求相邻两次调用间隔一定时间，否则返回 429。
//! 同一数据源的所有调用方（适配器与透传接口）共享一个 [`RateGate`]，
//! 调用前先预约下一个可用时刻；需要等待的时间超过上限时直接返回限速错误，
//! 让回退链立即转向下一个数据源

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{ProviderError, ProviderId, ProviderResult};

/// 最小调用间隔闸门，克隆后共享同一个预约状态
#[derive(Debug, Clone)]
pub struct RateGate {
    min_interval: Duration,
    max_wait: Duration,
    next_slot: Arc<Mutex<Option<Instant>>>,
}

impl RateGate {
    /// `max_wait` 为单次调用愿意排队的最长时间
    pub fn new(min_interval: Duration, max_wait: Duration) -> Self {
        Self {
            min_interval,
            max_wait,
            next_slot: Arc::new(Mutex::new(None)),
        }
    }

    /// 不限速
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// 预约一个调用时刻并等待到达
    ///
    /// 预约成功后立即释放锁，等待期间其他调用方可以继续预约后续时刻。
    /// 需要等待超过 `max_wait` 时不做预约，返回 [`ProviderError::RateLimited`]
    pub async fn acquire(&self, provider: ProviderId) -> ProviderResult<()> {
        if self.min_interval.is_zero() {
            return Ok(());
        }

        let ready_at = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let ready_at = next_slot.map_or(now, |slot| slot.max(now));
            let wait = ready_at - now;
            if wait > self.max_wait {
                log::warn!("{} 限速需等待 {:?}，超过上限 {:?}，跳过本次调用", provider, wait, self.max_wait);
                return Err(ProviderError::RateLimited { provider });
            }
            *next_slot = Some(ready_at + self.min_interval);
            ready_at
        };

        if ready_at > Instant::now() {
            log::debug!("{} 限速等待 {:?}", provider, ready_at - Instant::now());
            tokio::time::sleep_until(ready_at).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: ProviderId = ProviderId::AlphaVantage;

    #[tokio::test]
    async fn test_first_call_is_immediate() {
        let gate = RateGate::new(Duration::from_secs(5), Duration::from_secs(5));
        let start = Instant::now();
        gate.acquire(ID).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_consecutive_calls_are_spaced() {
        let gate = RateGate::new(Duration::from_millis(80), Duration::from_secs(1));
        let start = Instant::now();
        gate.acquire(ID).await.unwrap();
        gate.acquire(ID).await.unwrap();
        gate.acquire(ID).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(160));
    }

    #[tokio::test]
    async fn test_concurrent_callers_queue() {
        let gate = RateGate::new(Duration::from_millis(50), Duration::from_secs(1));
        let start = Instant::now();

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.acquire(ID).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_wait_beyond_budget_fails_fast() {
        // 间隔 12 秒、等待上限 5 秒：第二次调用不应等待
        let gate = RateGate::new(Duration::from_secs(12), Duration::from_secs(5));
        gate.acquire(ID).await.unwrap();

        let start = Instant::now();
        let result = gate.acquire(ID).await;
        assert!(matches!(result, Err(ProviderError::RateLimited { provider }) if provider == ID));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_rejected_call_does_not_reserve() {
        let gate = RateGate::new(Duration::from_millis(100), Duration::from_millis(20));
        gate.acquire(ID).await.unwrap();
        assert!(gate.acquire(ID).await.is_err());

        tokio::time::sleep(Duration::from_millis(110)).await;
        let start = Instant::now();
        gate.acquire(ID).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_clones_share_spacing() {
        let gate = RateGate::new(Duration::from_millis(80), Duration::from_secs(1));
        let other = gate.clone();

        gate.acquire(ID).await.unwrap();
        let start = Instant::now();
        other.acquire(ID).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let gate = RateGate::unlimited();
        let start = Instant::now();
        for _ in 0..10 {
            gate.acquire(ID).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
