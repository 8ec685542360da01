//! 行情数据源适配器
//!
//! 每个外部数据源一个适配器，负责构造请求并把各自的响应格式转换为规范化记录
//!
//! ## 数据源
//! - Alpha Vantage：报价、日/周/月线、公司概况、新闻、外汇
//! - Yahoo Finance：报价、K线、新闻、外汇（无需 Key）
//! - Finnhub：报价（无成交量）、K线、公司概况、新闻
//! - Twelve Data：报价、K线、外汇
//! - Marketstack：报价、日线
//! - FMP：报价、日线、公司概况、新闻、外汇
//! - CoinGecko：加密货币报价、日线、汇率
//! - FRED：美元相关汇率
//! - EODHD：报价、K线、公司概况、新闻、外汇
//! - NewsAPI：新闻
//!
//! 适配器边界之外只区分"有数据"和"没有数据"，
//! 网络错误、非 2xx、缺少 Key、字段缺失都折叠为 [`ProviderError`]

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CompanyOverview, CurrencyRate, HistoryPoint, HistoryRange, Interval, NewsArticle, Quote};

mod common;
mod rate_limit;

pub mod alpha_vantage;
pub mod coingecko;
pub mod eodhd;
pub mod finnhub;
pub mod fmp;
pub mod fred;
pub mod marketstack;
pub mod news_api;
pub mod twelve_data;
pub mod yahoo;

pub use common::{
    build_client, fetch_json, mask_secret, market_today, COINGECKO_API, EODHD_API, FMP_API, FRED_API,
};
pub use rate_limit::RateGate;

/// 数据源标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderId {
    AlphaVantage,
    Yahoo,
    Finnhub,
    TwelveData,
    Marketstack,
    Fmp,
    CoinGecko,
    Fred,
    Eodhd,
    NewsApi,
}

impl ProviderId {
    pub const ALL: [ProviderId; 10] = [
        ProviderId::AlphaVantage,
        ProviderId::Yahoo,
        ProviderId::Finnhub,
        ProviderId::TwelveData,
        ProviderId::Marketstack,
        ProviderId::Fmp,
        ProviderId::CoinGecko,
        ProviderId::Fred,
        ProviderId::Eodhd,
        ProviderId::NewsApi,
    ];

    /// 配置文件中使用的标识
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::AlphaVantage => "alpha_vantage",
            ProviderId::Yahoo => "yahoo",
            ProviderId::Finnhub => "finnhub",
            ProviderId::TwelveData => "twelve_data",
            ProviderId::Marketstack => "marketstack",
            ProviderId::Fmp => "fmp",
            ProviderId::CoinGecko => "coingecko",
            ProviderId::Fred => "fred",
            ProviderId::Eodhd => "eodhd",
            ProviderId::NewsApi => "news_api",
        }
    }

    /// 写入记录 `sourceName` 的显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::AlphaVantage => "Alpha Vantage",
            ProviderId::Yahoo => "Yahoo Finance",
            ProviderId::Finnhub => "Finnhub",
            ProviderId::TwelveData => "Twelve Data",
            ProviderId::Marketstack => "Marketstack",
            ProviderId::Fmp => "FMP",
            ProviderId::CoinGecko => "CoinGecko",
            ProviderId::Fred => "FRED",
            ProviderId::Eodhd => "EODHD",
            ProviderId::NewsApi => "NewsAPI",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ProviderId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| format!("未知数据源: {}", s))
    }
}

/// 逻辑操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Quote,
    History,
    Overview,
    News,
    Currency,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Quote => "quote",
            Operation::History => "history",
            Operation::Overview => "overview",
            Operation::News => "news",
            Operation::Currency => "currency",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 数据源能力声明
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub quote: bool,
    /// 支持的K线周期，为空表示不支持历史数据
    pub history: &'static [Interval],
    pub overview: bool,
    pub news: bool,
    pub currency: bool,
    /// 报价中是否包含成交量，用于成交量补全
    pub reports_volume: bool,
}

impl Capabilities {
    pub fn supports(&self, operation: Operation) -> bool {
        match operation {
            Operation::Quote => self.quote,
            Operation::History => !self.history.is_empty(),
            Operation::Overview => self.overview,
            Operation::News => self.news,
            Operation::Currency => self.currency,
        }
    }
}

/// 适配器错误
///
/// 所有变体对回退链的含义相同：换下一个数据源。变体只决定日志级别
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider} 未配置 API Key")]
    Unavailable { provider: ProviderId },

    #[error("{provider} 不支持 {operation}")]
    Unsupported {
        provider: ProviderId,
        operation: &'static str,
    },

    #[error("{provider} 无可用数据: {reason}")]
    NoData { provider: ProviderId, reason: String },

    #[error("{provider} 请求超时")]
    Timeout { provider: ProviderId },

    #[error("{provider} 触发限流")]
    RateLimited { provider: ProviderId },

    #[error("{provider} 返回 HTTP {status}")]
    Http { provider: ProviderId, status: u16 },

    #[error("{provider} 网络错误: {source}")]
    Network {
        provider: ProviderId,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} 响应解析失败: {message}")]
    Decode { provider: ProviderId, message: String },

    /// 请求本身有问题（构造 URL 失败、4xx 参数错误等），需要单独排查
    #[error("{provider} 请求异常: {message}")]
    Upstream { provider: ProviderId, message: String },
}

impl ProviderError {
    pub fn no_data(provider: ProviderId, reason: impl Into<String>) -> Self {
        ProviderError::NoData {
            provider,
            reason: reason.into(),
        }
    }

    pub fn provider(&self) -> ProviderId {
        match self {
            ProviderError::Unavailable { provider }
            | ProviderError::Unsupported { provider, .. }
            | ProviderError::NoData { provider, .. }
            | ProviderError::Timeout { provider }
            | ProviderError::RateLimited { provider }
            | ProviderError::Http { provider, .. }
            | ProviderError::Network { provider, .. }
            | ProviderError::Decode { provider, .. }
            | ProviderError::Upstream { provider, .. } => *provider,
        }
    }

    /// 是否属于需要单独记录的上游故障
    pub fn is_fault(&self) -> bool {
        matches!(self, ProviderError::Upstream { .. })
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// 行情数据源适配器
///
/// 默认实现全部返回 `Unsupported`，适配器只覆盖自己支持的操作
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn name(&self) -> &'static str {
        self.id().display_name()
    }

    fn capabilities(&self) -> Capabilities;

    /// 所需的 API Key 是否已配置
    fn is_available(&self) -> bool {
        true
    }

    fn supports_history(&self, range: HistoryRange) -> bool {
        self.capabilities().history.contains(&range.interval)
    }

    async fn get_quote(&self, symbol: &str) -> ProviderResult<Quote> {
        let _ = symbol;
        Err(self.unsupported("quote"))
    }

    /// 返回的序列顺序不做要求，排序与去重由回退链统一处理
    async fn get_history(&self, symbol: &str, range: HistoryRange) -> ProviderResult<Vec<HistoryPoint>> {
        let _ = (symbol, range);
        Err(self.unsupported("history"))
    }

    async fn get_overview(&self, symbol: &str) -> ProviderResult<CompanyOverview> {
        let _ = symbol;
        Err(self.unsupported("overview"))
    }

    async fn get_news(&self, query: &str) -> ProviderResult<Vec<NewsArticle>> {
        let _ = query;
        Err(self.unsupported("news"))
    }

    async fn get_currency_rate(&self, base: &str, quote: &str) -> ProviderResult<CurrencyRate> {
        let _ = (base, quote);
        Err(self.unsupported("currency"))
    }

    fn unsupported(&self, operation: &'static str) -> ProviderError {
        ProviderError::Unsupported {
            provider: self.id(),
            operation,
        }
    }
}
