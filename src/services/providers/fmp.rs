//! Financial Modeling Prep 适配器
//!
//! v3 接口大多返回数组，未知代码时返回空数组

use async_trait::async_trait;
use chrono_tz::America::New_York;
use reqwest::Client;
use serde_json::Value;

use super::common::{
    fetch_json, int, looks_like_ticker, num, parse_date, parse_timestamp, require_key, text,
    unix_to_datetime, unix_to_market_date, window_start, QuoteParts, FMP_API,
};
use super::{Capabilities, MarketDataProvider, ProviderError, ProviderId, ProviderResult, RateGate};
use crate::models::{CompanyOverview, CurrencyRate, HistoryPoint, HistoryRange, Interval, NewsArticle, Quote};

const PROVIDER: ProviderId = ProviderId::Fmp;

/// FMP 数据源
pub struct FmpProvider {
    client: Client,
    api_key: Option<String>,
    gate: RateGate,
}

impl FmpProvider {
    pub fn new(client: Client, api_key: Option<String>, gate: RateGate) -> Self {
        Self {
            client,
            api_key,
            gate,
        }
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> ProviderResult<Value> {
        let key = require_key(&self.api_key, PROVIDER)?;
        self.gate.acquire(PROVIDER).await?;

        let url = format!("{}/v3/{}", FMP_API, path);
        let mut all_params = params.to_vec();
        all_params.push(("apikey", key));

        let body = fetch_json(&self.client, PROVIDER, &url, &all_params, Some(key)).await?;
        if let Some(message) = text(&body["Error Message"]) {
            return Err(ProviderError::no_data(PROVIDER, message));
        }
        Ok(body)
    }

    /// 数组响应的第一项
    fn first(body: &Value) -> ProviderResult<&Value> {
        body.as_array()
            .and_then(|items| items.first())
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "结果为空"))
    }

    fn parse_quote(body: &Value) -> ProviderResult<Quote> {
        let item = Self::first(body)?;
        QuoteParts {
            price: num(&item["price"]),
            change: num(&item["change"]),
            change_percent: num(&item["changesPercentage"]),
            prev_close: num(&item["previousClose"]),
            open: num(&item["open"]),
            day_high: num(&item["dayHigh"]),
            day_low: num(&item["dayLow"]),
            volume: int(&item["volume"]),
            last_trading_day: item["timestamp"].as_i64().and_then(|t| unix_to_market_date(t, New_York)),
        }
        .finish(PROVIDER)
    }

    fn parse_history(body: &Value) -> ProviderResult<Vec<HistoryPoint>> {
        let historical = body["historical"]
            .as_array()
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少 historical"))?;

        let points: Vec<HistoryPoint> = historical
            .iter()
            .filter_map(|bar| {
                Some(HistoryPoint {
                    date: parse_date(bar["date"].as_str()?)?,
                    price: num(&bar["adjClose"]).or_else(|| num(&bar["close"]))?,
                    volume: int(&bar["volume"]),
                    source_name: PROVIDER.display_name().to_string(),
                })
            })
            .collect();

        if points.is_empty() {
            return Err(ProviderError::no_data(PROVIDER, "K线序列为空"));
        }
        Ok(points)
    }

    /// 52 周区间格式为 "164.08-199.62"
    fn parse_range(raw: &str) -> (Option<f64>, Option<f64>) {
        match raw.split_once('-') {
            Some((low, high)) => (low.trim().parse().ok(), high.trim().parse().ok()),
            None => (None, None),
        }
    }

    fn parse_profile(body: &Value) -> ProviderResult<CompanyOverview> {
        let item = Self::first(body)?;
        let name = text(&item["companyName"]).ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少公司名称"))?;
        let symbol = text(&item["symbol"]).ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少代码"))?;
        let (low, high) = item["range"].as_str().map(Self::parse_range).unwrap_or((None, None));

        // 最近一次年度分红 / 股价
        let dividend_yield = match (num(&item["lastDiv"]), num(&item["price"])) {
            (Some(div), Some(price)) if price > 0.0 => Some(div / price * 100.0),
            _ => None,
        };

        Ok(CompanyOverview {
            symbol,
            name,
            description: text(&item["description"]),
            sector: text(&item["sector"]),
            industry: text(&item["industry"]),
            market_cap: int(&item["mktCap"]),
            pe_ratio: num(&item["pe"]),
            dividend_yield,
            fifty_two_week_high: high,
            fifty_two_week_low: low,
            logo: text(&item["image"]),
            website: text(&item["website"]),
            source_name: PROVIDER.display_name().to_string(),
        })
    }

    fn parse_news(body: &Value) -> ProviderResult<Vec<NewsArticle>> {
        let items = body
            .as_array()
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "新闻响应不是数组"))?;

        Ok(items
            .iter()
            .filter_map(|item| {
                let title = text(&item["title"])?;
                let url = text(&item["url"])?;
                let published_at = item["publishedDate"].as_str().and_then(parse_timestamp)?;
                let site = text(&item["site"]).unwrap_or_else(|| PROVIDER.display_name().to_string());
                Some(NewsArticle::new(title, text(&item["text"]), url, site, published_at, PROVIDER.display_name()))
            })
            .collect())
    }

    fn parse_currency(body: &Value, base: &str, quote: &str) -> ProviderResult<CurrencyRate> {
        let item = Self::first(body)?;
        let rate = num(&item["price"]).ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少汇率"))?;
        let previous = num(&item["previousClose"]).unwrap_or(rate);
        let last_update = item["timestamp"]
            .as_i64()
            .and_then(unix_to_datetime)
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少更新时间"))?;

        Ok(CurrencyRate::from_pair(base, quote, rate, previous, last_update, PROVIDER.display_name()))
    }
}

#[async_trait]
impl MarketDataProvider for FmpProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            quote: true,
            history: &[Interval::Daily],
            overview: true,
            news: true,
            currency: true,
            reports_volume: true,
        }
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get_quote(&self, symbol: &str) -> ProviderResult<Quote> {
        let body = self.get(&format!("quote/{}", symbol), &[]).await?;
        Self::parse_quote(&body)
    }

    async fn get_history(&self, symbol: &str, range: HistoryRange) -> ProviderResult<Vec<HistoryPoint>> {
        if range.interval != Interval::Daily {
            return Err(self.unsupported("weekly/monthly history"));
        }

        let from = window_start(range).map(|d| d.to_string());
        let params: Vec<(&str, &str)> = from.as_deref().map(|f| vec![("from", f)]).unwrap_or_default();
        let body = self
            .get(&format!("historical-price-full/{}", symbol), &params)
            .await?;
        Self::parse_history(&body)
    }

    async fn get_overview(&self, symbol: &str) -> ProviderResult<CompanyOverview> {
        let body = self.get(&format!("profile/{}", symbol), &[]).await?;
        Self::parse_profile(&body)
    }

    async fn get_news(&self, query: &str) -> ProviderResult<Vec<NewsArticle>> {
        if !looks_like_ticker(query) {
            return Err(ProviderError::no_data(PROVIDER, "仅支持按股票代码查询新闻"));
        }
        let body = self
            .get("stock_news", &[("tickers", query.trim()), ("limit", "50")])
            .await?;
        Self::parse_news(&body)
    }

    async fn get_currency_rate(&self, base: &str, quote: &str) -> ProviderResult<CurrencyRate> {
        let body = self.get(&format!("quote/{}{}", base, quote), &[]).await?;
        Self::parse_currency(&body, base, quote)
    }
}
