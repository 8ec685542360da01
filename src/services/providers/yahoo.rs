//! Yahoo Finance 适配器
//!
//! 无需 API Key：
//! - v8 chart：报价（meta + 最后一根K线）和历史K线
//! - v1 search：新闻
//! - 外汇代码格式为 `EURUSD=X`
//!
//! 时间戳为 Unix 秒，交易日按 `exchangeTimezoneName` 换算

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::common::{
    fetch_json, int, market_timezone, num, text, unix_to_datetime, unix_to_market_date, QuoteParts,
    YAHOO_CHART_API, YAHOO_SEARCH_API,
};
use super::{Capabilities, MarketDataProvider, ProviderError, ProviderId, ProviderResult, RateGate};
use crate::models::{
    CurrencyRate, HistoryPoint, HistoryRange, Interval, NewsArticle, Quote,
};

const PROVIDER: ProviderId = ProviderId::Yahoo;

/// Yahoo Finance 数据源
pub struct YahooProvider {
    client: Client,
    gate: RateGate,
}

impl YahooProvider {
    pub fn new(client: Client, gate: RateGate) -> Self {
        Self { client, gate }
    }

    async fn chart(&self, symbol: &str, range: &str, interval: &str) -> ProviderResult<Value> {
        self.gate.acquire(PROVIDER).await?;
        let url = format!("{}/{}", YAHOO_CHART_API, symbol);
        let body = fetch_json(
            &self.client,
            PROVIDER,
            &url,
            &[("range", range), ("interval", interval), ("includePrePost", "false")],
            None,
        )
        .await?;

        if let Some(description) = text(&body["chart"]["error"]["description"]) {
            return Err(ProviderError::no_data(PROVIDER, description));
        }
        Ok(body)
    }

    /// chart.result[0]
    fn chart_result(body: &Value) -> ProviderResult<&Value> {
        let result = &body["chart"]["result"][0];
        if result.is_null() {
            return Err(ProviderError::no_data(PROVIDER, "chart.result 为空"));
        }
        Ok(result)
    }

    // ==================== 报价 ====================

    fn parse_quote(body: &Value) -> ProviderResult<Quote> {
        let result = Self::chart_result(body)?;
        let meta = &result["meta"];
        let tz = market_timezone(meta["exchangeTimezoneName"].as_str());
        let bar = &result["indicators"]["quote"][0];

        // 取最后一根有效K线的开高低量
        let last_value = |field: &str| -> Option<f64> {
            bar[field].as_array()?.iter().rev().find_map(num)
        };

        let last_trading_day = meta["regularMarketTime"]
            .as_i64()
            .and_then(|secs| unix_to_market_date(secs, tz));

        QuoteParts {
            price: num(&meta["regularMarketPrice"]),
            change: None,
            change_percent: None,
            prev_close: num(&meta["previousClose"]).or_else(|| num(&meta["chartPreviousClose"])),
            open: num(&meta["regularMarketOpen"]).or_else(|| last_value("open")),
            day_high: num(&meta["regularMarketDayHigh"]).or_else(|| last_value("high")),
            day_low: num(&meta["regularMarketDayLow"]).or_else(|| last_value("low")),
            volume: int(&meta["regularMarketVolume"]).or_else(|| last_value("volume").map(|v| v.round() as u64)),
            last_trading_day,
        }
        .finish(PROVIDER)
    }

    // ==================== K线 ====================

    fn parse_history(body: &Value) -> ProviderResult<Vec<HistoryPoint>> {
        let result = Self::chart_result(body)?;
        let tz = market_timezone(result["meta"]["exchangeTimezoneName"].as_str());

        let timestamps = result["timestamp"]
            .as_array()
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少 timestamp"))?;
        let quote = &result["indicators"]["quote"][0];
        let adjclose = &result["indicators"]["adjclose"][0]["adjclose"];

        let points: Vec<HistoryPoint> = timestamps
            .iter()
            .enumerate()
            .filter_map(|(i, ts)| {
                let date = unix_to_market_date(ts.as_i64()?, tz)?;
                let price = num(&adjclose[i]).or_else(|| num(&quote["close"][i]))?;
                Some(HistoryPoint {
                    date,
                    price,
                    volume: int(&quote["volume"][i]),
                    source_name: PROVIDER.display_name().to_string(),
                })
            })
            .collect();

        if points.is_empty() {
            return Err(ProviderError::no_data(PROVIDER, "K线序列为空"));
        }
        Ok(points)
    }

    // ==================== 新闻 ====================

    fn parse_news(body: &Value) -> ProviderResult<Vec<NewsArticle>> {
        let items = body["news"]
            .as_array()
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少 news"))?;

        Ok(items
            .iter()
            .filter_map(|item| {
                let title = text(&item["title"])?;
                let url = text(&item["link"])?;
                let published_at = unix_to_datetime(item["providerPublishTime"].as_i64()?)?;
                let publisher = text(&item["publisher"]).unwrap_or_else(|| PROVIDER.display_name().to_string());
                Some(NewsArticle::new(title, None, url, publisher, published_at, PROVIDER.display_name()))
            })
            .collect())
    }

    // ==================== 外汇 ====================

    fn parse_currency(body: &Value, base: &str, quote: &str) -> ProviderResult<CurrencyRate> {
        let meta = &Self::chart_result(body)?["meta"];
        let rate = num(&meta["regularMarketPrice"])
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少汇率"))?;
        let previous = num(&meta["previousClose"])
            .or_else(|| num(&meta["chartPreviousClose"]))
            .unwrap_or(rate);
        let last_update = meta["regularMarketTime"]
            .as_i64()
            .and_then(unix_to_datetime)
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少更新时间"))?;

        Ok(CurrencyRate::from_pair(base, quote, rate, previous, last_update, PROVIDER.display_name()))
    }
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            quote: true,
            history: &[Interval::Daily, Interval::Weekly, Interval::Monthly],
            overview: false,
            news: true,
            currency: true,
            reports_volume: true,
        }
    }

    async fn get_quote(&self, symbol: &str) -> ProviderResult<Quote> {
        let body = self.chart(symbol, "5d", "1d").await?;
        Self::parse_quote(&body)
    }

    async fn get_history(&self, symbol: &str, range: HistoryRange) -> ProviderResult<Vec<HistoryPoint>> {
        let body = self
            .chart(symbol, range.period.as_str(), range.interval.as_str())
            .await?;
        Self::parse_history(&body)
    }

    async fn get_news(&self, query: &str) -> ProviderResult<Vec<NewsArticle>> {
        self.gate.acquire(PROVIDER).await?;
        let body = fetch_json(
            &self.client,
            PROVIDER,
            YAHOO_SEARCH_API,
            &[("q", query), ("quotesCount", "0"), ("newsCount", "20")],
            None,
        )
        .await?;
        Self::parse_news(&body)
    }

    async fn get_currency_rate(&self, base: &str, quote: &str) -> ProviderResult<CurrencyRate> {
        let symbol = format!("{}{}=X", base, quote);
        let body = self.chart(&symbol, "5d", "1d").await?;
        Self::parse_currency(&body, base, quote)
    }
}
