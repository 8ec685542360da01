//! 回退链编排
//!
//! 按注册表中的顺序依次调用适配器，每次调用都有超时：
//! - 报价、K线、公司概况、汇率：第一个返回可用数据的数据源胜出
//! - 新闻：逐个合并直到凑够目标条数，按 URL 去重后按时间倒序
//!
//! 适配器错误只影响日志级别，一律换下一个数据源

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;

use crate::models::{
    CompanyOverview, CurrencyRate, HistoryPoint, HistoryRange, NewsArticle, Quote, Usable,
};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::providers::{
    market_today, MarketDataProvider, Operation, ProviderError, ProviderId, ProviderResult,
};
use crate::services::registry::ProviderRegistry;

/// 编排参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// 单个适配器调用超时
    pub timeout: Duration,
    /// 新闻合并目标条数
    pub news_target: usize,
    /// 新闻最多返回条数
    pub news_max: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            news_target: 5,
            news_max: 50,
        }
    }
}

/// 回退链编排器
pub struct FallbackOrchestrator {
    registry: Arc<ProviderRegistry>,
    settings: OrchestratorSettings,
    /// 已记录过"未配置"的数据源，每个只记录一次
    reported_unavailable: Mutex<HashSet<ProviderId>>,
}

impl FallbackOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, settings: OrchestratorSettings) -> Self {
        Self {
            registry,
            settings,
            reported_unavailable: Mutex::new(HashSet::new()),
        }
    }

    // ==================== 单一结果操作 ====================

    /// 获取报价，缺少成交量时尝试补全一次
    pub async fn get_quote(&self, symbol: &str) -> ServiceResult<Quote> {
        let chain = self.registry.chain(Operation::Quote);
        let (mut quote, winner) = self
            .first_success(&chain, Operation::Quote, symbol, |_| true, |p| async move {
                p.get_quote(symbol).await
            })
            .await?;

        if quote.volume.is_none() {
            quote.volume = self.backfill_volume(&chain[winner + 1..], symbol).await;
        }
        Ok(quote)
    }

    /// 获取历史K线，结果按日期升序、无重复日期，并裁剪到窗口起点
    pub async fn get_history(&self, symbol: &str, range: HistoryRange) -> ServiceResult<Vec<HistoryPoint>> {
        let chain = self.registry.chain(Operation::History);
        let start = range.period.start_date(market_today());

        let (points, _) = self
            .first_success(
                &chain,
                Operation::History,
                symbol,
                |p| p.supports_history(range),
                |p| async move {
                    let raw = p.get_history(symbol, range).await?;
                    Ok(normalize_history(raw, start))
                },
            )
            .await?;
        Ok(points)
    }

    pub async fn get_overview(&self, symbol: &str) -> ServiceResult<CompanyOverview> {
        let chain = self.registry.chain(Operation::Overview);
        let (overview, _) = self
            .first_success(&chain, Operation::Overview, symbol, |_| true, |p| async move {
                p.get_overview(symbol).await
            })
            .await?;
        Ok(overview)
    }

    pub async fn get_currency_rate(&self, base: &str, quote: &str) -> ServiceResult<CurrencyRate> {
        let chain = self.registry.chain(Operation::Currency);
        let subject = format!("{}/{}", base, quote);
        let (rate, _) = self
            .first_success(&chain, Operation::Currency, &subject, |_| true, |p| async move {
                p.get_currency_rate(base, quote).await
            })
            .await?;
        Ok(rate)
    }

    // ==================== 合并操作 ====================

    /// 获取新闻：逐个数据源追加，不重复的 URL 凑够目标条数即停止
    ///
    /// 没有任何结果时返回空列表而不是错误
    pub async fn get_news(&self, query: &str) -> Vec<NewsArticle> {
        let chain = self.registry.chain(Operation::News);
        let mut collected: Vec<NewsArticle> = Vec::new();
        let mut unique_urls: HashSet<String> = HashSet::new();

        for provider in chain {
            if unique_urls.len() >= self.settings.news_target {
                break;
            }
            if !self.is_ready(provider.as_ref(), Operation::News) {
                continue;
            }

            match self.call(provider.clone(), |p| async move { p.get_news(query).await }).await {
                Ok(articles) => {
                    let usable: Vec<NewsArticle> = articles.into_iter().filter(|a| a.is_usable()).collect();
                    log::debug!("{} 返回 {} 条新闻: {}", provider.name(), usable.len(), query);
                    unique_urls.extend(usable.iter().map(|a| a.url.clone()));
                    collected.extend(usable);
                }
                Err(e) => self.log_failure(Operation::News, query, &e),
            }
        }

        merge_news(collected, self.settings.news_max)
    }

    // ==================== 内部 ====================

    /// 按顺序调用，返回第一个可用结果及其在链中的位置
    async fn first_success<T, S, F, Fut>(
        &self,
        chain: &[Arc<dyn MarketDataProvider>],
        operation: Operation,
        subject: &str,
        select: S,
        fetch: F,
    ) -> ServiceResult<(T, usize)>
    where
        T: Usable,
        S: Fn(&dyn MarketDataProvider) -> bool,
        F: Fn(Arc<dyn MarketDataProvider>) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut any_ready = false;
        for (index, provider) in chain.iter().enumerate() {
            if !self.is_ready(provider.as_ref(), operation) {
                continue;
            }
            any_ready = true;
            if !select(provider.as_ref()) {
                log::debug!("{} 不支持本次 {} 请求，跳过", provider.name(), operation);
                continue;
            }

            match self.call(provider.clone(), &fetch).await {
                Ok(value) if value.is_usable() => {
                    log::info!("{} {} 由 {} 提供", operation, subject, provider.name());
                    return Ok((value, index));
                }
                Ok(_) => {
                    log::warn!("{} 的 {} 数据不可用: {}", provider.name(), operation, subject);
                }
                Err(e) => self.log_failure(operation, subject, &e),
            }
        }

        if !any_ready {
            log::warn!("{} {}: 回退链中没有已配置的数据源", operation, subject);
            return Err(ServiceError::Unavailable(format!(
                "{}数据源均未配置 API Key，该接口不可用",
                operation_label(operation)
            )));
        }

        Err(ServiceError::not_found(format!(
            "所有数据源均未返回 {} 的{}数据",
            subject,
            operation_label(operation)
        )))
    }

    /// 带超时调用单个适配器
    async fn call<T, F, Fut>(&self, provider: Arc<dyn MarketDataProvider>, fetch: F) -> ProviderResult<T>
    where
        F: Fn(Arc<dyn MarketDataProvider>) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let id = provider.id();
        match tokio::time::timeout(self.settings.timeout, fetch(provider)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout { provider: id }),
        }
    }

    /// 适配器是否可以参与本次操作；未配置 Key 的只记录一次
    fn is_ready(&self, provider: &dyn MarketDataProvider, operation: Operation) -> bool {
        if !provider.is_available() {
            let first_time = self
                .reported_unavailable
                .lock()
                .map(|mut reported| reported.insert(provider.id()))
                .unwrap_or(false);
            if first_time {
                log::info!("数据源 {} 未配置 API Key，已跳过", provider.name());
            }
            return false;
        }
        provider.capabilities().supports(operation)
    }

    /// 成交量补全：只尝试链中下一个报告成交量的数据源
    async fn backfill_volume(&self, rest: &[Arc<dyn MarketDataProvider>], symbol: &str) -> Option<u64> {
        let provider = rest
            .iter()
            .find(|p| p.is_available() && p.capabilities().quote && p.capabilities().reports_volume)?;

        match self.call(provider.clone(), |p| async move { p.get_quote(symbol).await }).await {
            Ok(quote) if quote.volume.is_some() => {
                log::debug!("{} 成交量由 {} 补全", symbol, provider.name());
                quote.volume
            }
            Ok(_) => None,
            Err(e) => {
                log::warn!("{} 成交量补全失败: {}", symbol, e);
                None
            }
        }
    }

    fn log_failure(&self, operation: Operation, subject: &str, error: &ProviderError) {
        match error {
            ProviderError::Unsupported { .. } => log::debug!("{} ({}): {}", operation, subject, error),
            _ if error.is_fault() => log::error!("{} ({}): {}", operation, subject, error),
            _ => log::warn!("{} ({}): {}", operation, subject, error),
        }
    }
}

fn operation_label(operation: Operation) -> &'static str {
    match operation {
        Operation::Quote => "报价",
        Operation::History => "历史",
        Operation::Overview => "公司概况",
        Operation::News => "新闻",
        Operation::Currency => "汇率",
    }
}

/// 去重（保留首次出现）、升序排序并裁剪到窗口起点
pub fn normalize_history(points: Vec<HistoryPoint>, start: Option<NaiveDate>) -> Vec<HistoryPoint> {
    let mut seen = HashSet::new();
    let mut series: Vec<HistoryPoint> = points
        .into_iter()
        .filter(|p| start.map_or(true, |s| p.date >= s))
        .filter(|p| seen.insert(p.date))
        .collect();
    series.sort_by_key(|p| p.date);
    series
}

/// 按 URL 去重（后出现的覆盖先出现的），按发布时间倒序并截断
pub fn merge_news(articles: Vec<NewsArticle>, max: usize) -> Vec<NewsArticle> {
    let mut by_url: HashMap<String, NewsArticle> = HashMap::new();
    for article in articles {
        by_url.insert(article.url.clone(), article);
    }

    let mut merged: Vec<NewsArticle> = by_url.into_values().collect();
    merged.sort_by(|a, b| b.published_at.cmp(&a.published_at).then_with(|| a.url.cmp(&b.url)));
    merged.truncate(max);
    merged
}
