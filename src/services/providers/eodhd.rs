//! EODHD 适配器
//!
//! 代码需带交易所后缀（`AAPL.US`），未带后缀的按美股处理；
//! 外汇代码为 `EURUSD.FOREX`。缺失值以 "NA" 表示

use async_trait::async_trait;
use chrono_tz::America::New_York;
use reqwest::Client;
use serde_json::Value;

use super::common::{
    fetch_json, int, looks_like_ticker, num, parse_date, parse_timestamp, require_key, text, unix_to_datetime,
    unix_to_market_date, window_start, QuoteParts, EODHD_API,
};
use super::{Capabilities, MarketDataProvider, ProviderError, ProviderId, ProviderResult, RateGate};
use crate::models::{CompanyOverview, CurrencyRate, HistoryPoint, HistoryRange, Interval, NewsArticle, Quote};

const PROVIDER: ProviderId = ProviderId::Eodhd;
const LOGO_HOST: &str = "https://eodhd.com";

/// EODHD 数据源
pub struct EodhdProvider {
    client: Client,
    api_key: Option<String>,
    gate: RateGate,
}

impl EodhdProvider {
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

        let url = format!("{}/{}", EODHD_API, path);
        let mut all_params = params.to_vec();
        all_params.push(("api_token", key));
        all_params.push(("fmt", "json"));

        fetch_json(&self.client, PROVIDER, &url, &all_params, Some(key)).await
    }

    /// AAPL -> AAPL.US，已带后缀的保持不变
    pub fn exchange_symbol(symbol: &str) -> String {
        if symbol.contains('.') {
            symbol.to_string()
        } else {
            format!("{}.US", symbol)
        }
    }

    fn period_param(interval: Interval) -> &'static str {
        match interval {
            Interval::Daily => "d",
            Interval::Weekly => "w",
            Interval::Monthly => "m",
        }
    }

    fn parse_real_time(body: &Value) -> ProviderResult<Quote> {
        QuoteParts {
            price: num(&body["close"]),
            change: num(&body["change"]),
            change_percent: num(&body["change_p"]),
            prev_close: num(&body["previousClose"]),
            open: num(&body["open"]),
            day_high: num(&body["high"]),
            day_low: num(&body["low"]),
            volume: int(&body["volume"]),
            last_trading_day: body["timestamp"].as_i64().and_then(|t| unix_to_market_date(t, New_York)),
        }
        .finish(PROVIDER)
    }

    fn parse_eod(body: &Value) -> ProviderResult<Vec<HistoryPoint>> {
        let bars = body
            .as_array()
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "eod 响应不是数组"))?;

        let points: Vec<HistoryPoint> = bars
            .iter()
            .filter_map(|bar| {
                Some(HistoryPoint {
                    date: parse_date(bar["date"].as_str()?)?,
                    price: num(&bar["adjusted_close"]).or_else(|| num(&bar["close"]))?,
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

    fn parse_fundamentals(body: &Value, symbol: &str) -> ProviderResult<CompanyOverview> {
        let general = &body["General"];
        let highlights = &body["Highlights"];
        let technicals = &body["Technicals"];
        let name = text(&general["Name"]).ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少公司名称"))?;

        let logo = text(&general["LogoURL"]).map(|path| {
            if path.starts_with("http") {
                path
            } else {
                format!("{}{}", LOGO_HOST, path)
            }
        });

        Ok(CompanyOverview {
            symbol: text(&general["Code"]).unwrap_or_else(|| symbol.to_string()).to_uppercase(),
            name,
            description: text(&general["Description"]),
            sector: text(&general["Sector"]),
            industry: text(&general["Industry"]),
            market_cap: int(&highlights["MarketCapitalization"]),
            pe_ratio: num(&highlights["PERatio"]),
            dividend_yield: num(&highlights["DividendYield"]).map(|v| v * 100.0),
            fifty_two_week_high: num(&technicals["52WeekHigh"]),
            fifty_two_week_low: num(&technicals["52WeekLow"]),
            logo,
            website: text(&general["WebURL"]),
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
                let url = text(&item["link"])?;
                let published_at = item["date"].as_str().and_then(parse_timestamp)?;
                let summary = text(&item["content"]).map(|c| c.chars().take(500).collect::<String>());
                Some(NewsArticle::new(title, summary, url, PROVIDER.display_name(), published_at, PROVIDER.display_name()))
            })
            .collect())
    }

    fn parse_forex(body: &Value, base: &str, quote: &str) -> ProviderResult<CurrencyRate> {
        let rate = num(&body["close"]).ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少汇率"))?;
        let previous = num(&body["previousClose"]).unwrap_or(rate);
        let last_update = body["timestamp"]
            .as_i64()
            .and_then(unix_to_datetime)
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少更新时间"))?;

        Ok(CurrencyRate::from_pair(base, quote, rate, previous, last_update, PROVIDER.display_name()))
    }
}

#[async_trait]
impl MarketDataProvider for EodhdProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            quote: true,
            history: &[Interval::Daily, Interval::Weekly, Interval::Monthly],
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
        let path = format!("real-time/{}", Self::exchange_symbol(symbol));
        let body = self.get(&path, &[]).await?;
        Self::parse_real_time(&body)
    }

    async fn get_history(&self, symbol: &str, range: HistoryRange) -> ProviderResult<Vec<HistoryPoint>> {
        let path = format!("eod/{}", Self::exchange_symbol(symbol));
        let from = window_start(range).map(|d| d.to_string());
        let mut params = vec![("period", Self::period_param(range.interval))];
        if let Some(from) = from.as_deref() {
            params.push(("from", from));
        }

        let body = self.get(&path, &params).await?;
        Self::parse_eod(&body)
    }

    async fn get_overview(&self, symbol: &str) -> ProviderResult<CompanyOverview> {
        let path = format!("fundamentals/{}", Self::exchange_symbol(symbol));
        let body = self.get(&path, &[]).await?;
        Self::parse_fundamentals(&body, symbol)
    }

    async fn get_news(&self, query: &str) -> ProviderResult<Vec<NewsArticle>> {
        let query = query.trim();
        let body = if looks_like_ticker(query) {
            let symbol = Self::exchange_symbol(query);
            self.get("news", &[("s", symbol.as_str()), ("limit", "50")]).await?
        } else {
            self.get("news", &[("t", query), ("limit", "50")]).await?
        };
        Self::parse_news(&body)
    }

    async fn get_currency_rate(&self, base: &str, quote: &str) -> ProviderResult<CurrencyRate> {
        let path = format!("real-time/{}{}.FOREX", base, quote);
        let body = self.get(&path, &[]).await?;
        Self::parse_forex(&body, base, quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exchange_symbol() {
        assert_eq!(EodhdProvider::exchange_symbol("AAPL"), "AAPL.US");
        assert_eq!(EodhdProvider::exchange_symbol("VOD.LSE"), "VOD.LSE");
    }

    #[test]
    fn test_parse_real_time() {
        let body = json!({
            "code": "AAPL.US",
            "timestamp": 1_714_766_401,
            "open": 186.65,
            "high": 187.0,
            "low": 182.66,
            "close": 183.38,
            "volume": 163_224_100u64,
            "previousClose": 173.03,
            "change": 10.35,
            "change_p": 5.9816
        });
        let quote = EodhdProvider::parse_real_time(&body).unwrap();
        assert_eq!(quote.price, 183.38);
        assert_eq!(quote.source_name, "EODHD");
    }

    #[test]
    fn test_real_time_na_values() {
        let body = json!({ "code": "ZZZZ.US", "timestamp": "NA", "close": "NA", "previousClose": "NA" });
        assert!(matches!(
            EodhdProvider::parse_real_time(&body),
            Err(ProviderError::NoData { .. })
        ));
    }

    #[test]
    fn test_parse_fundamentals() {
        let body = json!({
            "General": {
                "Code": "AAPL",
                "Name": "Apple Inc",
                "Sector": "Technology",
                "Industry": "Consumer Electronics",
                "LogoURL": "/img/logos/US/aapl.png",
                "WebURL": "https://www.apple.com"
            },
            "Highlights": { "MarketCapitalization": 2_837_369_831_000u64, "PERatio": 28.5, "DividendYield": 0.0052 },
            "Technicals": { "52WeekHigh": 199.62, "52WeekLow": 164.08 }
        });

        let overview = EodhdProvider::parse_fundamentals(&body, "AAPL").unwrap();
        assert_eq!(overview.logo.as_deref(), Some("https://eodhd.com/img/logos/US/aapl.png"));
        assert!((overview.dividend_yield.unwrap() - 0.52).abs() < 1e-9);
        assert_eq!(overview.fifty_two_week_high, Some(199.62));
    }

    #[test]
    fn test_parse_news() {
        let body = json!([{
            "date": "2024-05-03T13:30:00+00:00",
            "title": "Apple posts record buyback",
            "content": "Apple Inc. said on Thursday...",
            "link": "https://eodhd.com/financial-news/apple",
            "symbols": ["AAPL.US"]
        }]);
        let articles = EodhdProvider::parse_news(&body).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].provider_tag, "EODHD");
    }

    #[test]
    fn test_parse_eod() {
        let body = json!([
            { "date": "2024-05-02", "close": 173.03, "adjusted_close": 172.5, "volume": 94_214_900u64 },
            { "date": "2024-05-03", "close": 183.38, "adjusted_close": 183.38, "volume": 163_224_100u64 }
        ]);
        let points = EodhdProvider::parse_eod(&body).unwrap();
        assert_eq!(points[0].price, 172.5);
        assert!(EodhdProvider::parse_eod(&json!([])).is_err());
    }
}
