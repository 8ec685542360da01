//! 行情服务
//!
//! 处理器唯一依赖的入口：在回退链编排之上加一层缓存，
//! 返回序列化好的 JSON，处理器原样写入响应体

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::future::join_all;
use regex::Regex;

use crate::config::AppConfig;
use crate::models::{HistoryRange, Quote, StockRef, TopMovers};
use crate::services::cache::{CacheKind, CacheService, CachedPayload};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::movers::{mover_entry, rank_movers};
use crate::services::orchestrator::{FallbackOrchestrator, OrchestratorSettings};
use crate::services::passthrough::PassthroughService;
use crate::services::providers::{build_client, ProviderId};
use crate::services::registry::{rate_gates, ProviderRegistry};

// ==================== 参数校验 ====================

fn ticker_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9.^=\-]{1,20}$").ok())
        .as_ref()
}

/// 校验并规范化股票代码（转大写）
pub fn normalize_ticker(raw: &str) -> ServiceResult<String> {
    let ticker = raw.trim();
    if ticker_pattern().map_or(false, |re| re.is_match(ticker)) {
        Ok(ticker.to_ascii_uppercase())
    } else {
        Err(ServiceError::BadRequest(format!("无效的股票代码: {}", raw)))
    }
}

/// 校验并规范化货币代码（三个字母，转大写）
pub fn normalize_currency(raw: &str) -> ServiceResult<String> {
    let code = raw.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(ServiceError::BadRequest(format!("无效的货币代码: {}", raw)))
    }
}

// ==================== 服务 ====================

/// 行情服务
pub struct MarketService {
    orchestrator: Arc<FallbackOrchestrator>,
    cache: CacheService,
    passthrough: Arc<PassthroughService>,
    movers_len: usize,
}

impl MarketService {
    pub fn new(
        orchestrator: Arc<FallbackOrchestrator>,
        cache: CacheService,
        passthrough: Arc<PassthroughService>,
        movers_len: usize,
    ) -> Self {
        Self {
            orchestrator,
            cache,
            passthrough,
            movers_len,
        }
    }

    /// 适配器与透传接口共用一个 HTTP 客户端和同一组限速闸门
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let client = build_client(
            Duration::from_secs(config.api.timeout_secs),
            Duration::from_secs(config.api.connect_timeout_secs),
        )?;
        let gates = rate_gates(config);

        let registry = Arc::new(ProviderRegistry::from_config(config, &client, &gates));
        let settings = OrchestratorSettings {
            timeout: Duration::from_secs(config.api.timeout_secs),
            news_target: config.api.news_target,
            news_max: config.api.news_max,
        };

        Ok(Self::new(
            Arc::new(FallbackOrchestrator::new(registry, settings)),
            CacheService::from_config(&config.cache),
            Arc::new(PassthroughService::from_config(client, config, &gates)),
            config.api.movers_len,
        ))
    }

    pub async fn get_quote(&self, ticker: &str) -> ServiceResult<CachedPayload> {
        let orchestrator = self.orchestrator.clone();
        let symbol = ticker.to_string();
        self.cache
            .get_or_fetch(CacheKind::Quote, CacheKind::Quote.key(&[ticker]), move || async move {
                let quote = orchestrator.get_quote(&symbol).await?;
                Ok(serde_json::to_string(&quote)?)
            })
            .await
    }

    pub async fn get_history(&self, ticker: &str, range: HistoryRange) -> ServiceResult<CachedPayload> {
        let orchestrator = self.orchestrator.clone();
        let symbol = ticker.to_string();
        let key = CacheKind::History.key(&[ticker, range.period.as_str(), range.interval.as_str()]);
        self.cache
            .get_or_fetch(CacheKind::History, key, move || async move {
                let points = orchestrator.get_history(&symbol, range).await?;
                Ok(serde_json::to_string(&points)?)
            })
            .await
    }

    pub async fn get_overview(&self, ticker: &str) -> ServiceResult<CachedPayload> {
        let orchestrator = self.orchestrator.clone();
        let symbol = ticker.to_string();
        self.cache
            .get_or_fetch(CacheKind::Overview, CacheKind::Overview.key(&[ticker]), move || async move {
                let overview = orchestrator.get_overview(&symbol).await?;
                Ok(serde_json::to_string(&overview)?)
            })
            .await
    }

    /// 新闻，没有结果时返回空数组
    ///
    /// 缓存键与请求使用同一个查询词：数据源按大小写区分股票代码和关键词
    pub async fn get_news(&self, query: &str) -> ServiceResult<CachedPayload> {
        let orchestrator = self.orchestrator.clone();
        let q = query.trim().to_string();
        let key = CacheKind::News.key(&[q.as_str()]);
        self.cache
            .get_or_fetch(CacheKind::News, key, move || async move {
                let articles = orchestrator.get_news(&q).await;
                Ok(serde_json::to_string(&articles)?)
            })
            .await
    }

    pub async fn get_currency(&self, base: &str, quote: &str) -> ServiceResult<CachedPayload> {
        let orchestrator = self.orchestrator.clone();
        let (from, to) = (base.to_string(), quote.to_string());
        self.cache
            .get_or_fetch(CacheKind::Currency, CacheKind::Currency.key(&[base, quote]), move || async move {
                let rate = orchestrator.get_currency_rate(&from, &to).await?;
                Ok(serde_json::to_string(&rate)?)
            })
            .await
    }

    /// 涨跌榜：并发获取每只股票的报价（走报价缓存），失败的股票直接剔除
    ///
    /// 规范化后重复的代码只保留第一次出现
    pub async fn get_top_movers(&self, stocks: &[StockRef]) -> TopMovers {
        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(stocks.len());
        for stock in stocks {
            match normalize_ticker(stock.ticker()) {
                Ok(ticker) if seen.insert(ticker.clone()) => targets.push((stock, ticker)),
                Ok(ticker) => log::debug!("涨跌榜忽略重复代码: {}", ticker),
                Err(e) => log::warn!("涨跌榜跳过: {}", e),
            }
        }

        let lookups = targets.into_iter().map(|(stock, ticker)| async move {
            match self.cached_quote(&ticker).await {
                Ok(quote) => Some(mover_entry(stock, &ticker, &quote)),
                Err(e) => {
                    log::warn!("涨跌榜 {} 报价获取失败: {}", ticker, e);
                    None
                }
            }
        });

        let entries = join_all(lookups).await.into_iter().flatten().collect();
        rank_movers(entries, self.movers_len)
    }

    /// 透传接口，按路径和查询参数缓存
    pub async fn forward(
        &self,
        provider: ProviderId,
        path: &str,
        query: Vec<(String, String)>,
    ) -> ServiceResult<CachedPayload> {
        let mut sorted = query.clone();
        sorted.sort();
        let query_key = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let key = CacheKind::Auxiliary.key(&[provider.as_str(), path, query_key.as_str()]);

        let passthrough = self.passthrough.clone();
        let path = path.to_string();
        self.cache
            .get_or_fetch(CacheKind::Auxiliary, key, move || async move {
                passthrough.forward(provider, &path, &query).await
            })
            .await
    }

    async fn cached_quote(&self, ticker: &str) -> ServiceResult<Quote> {
        let payload = self.get_quote(ticker).await?;
        Ok(serde_json::from_str(&payload.body)?)
    }
}
