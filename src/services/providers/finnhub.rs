//! Finnhub 适配器
//!
//! - /quote：字段为单字母缩写，不含成交量
//! - /stock/candle：分辨率 D/W/M，`s` 为 "no_data" 时表示无数据
//! - /stock/profile2：市值单位为百万
//! - /company-news 按代码，/news?category=general 按大盘

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use chrono_tz::America::New_York;
use reqwest::Client;
use serde_json::Value;

use super::common::{
    fetch_json, int, looks_like_ticker, market_today, num, require_key, text, unix_to_datetime,
    unix_to_market_date, window_start, QuoteParts, FINNHUB_API,
};
use super::{Capabilities, MarketDataProvider, ProviderError, ProviderId, ProviderResult, RateGate};
use crate::models::{CompanyOverview, HistoryPoint, HistoryRange, Interval, NewsArticle, Quote};

const PROVIDER: ProviderId = ProviderId::Finnhub;

/// Finnhub 数据源
pub struct FinnhubProvider {
    client: Client,
    api_key: Option<String>,
    gate: RateGate,
}

impl FinnhubProvider {
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

        let url = format!("{}{}", FINNHUB_API, path);
        let mut all_params = params.to_vec();
        all_params.push(("token", key));

        let body = fetch_json(&self.client, PROVIDER, &url, &all_params, Some(key)).await?;
        if let Some(message) = text(&body["error"]) {
            return Err(ProviderError::no_data(PROVIDER, message));
        }
        Ok(body)
    }

    fn resolution(interval: Interval) -> &'static str {
        match interval {
            Interval::Daily => "D",
            Interval::Weekly => "W",
            Interval::Monthly => "M",
        }
    }

    fn parse_quote(body: &Value) -> ProviderResult<Quote> {
        // 未知代码返回全 0
        if num(&body["c"]).map_or(true, |c| c == 0.0) && num(&body["t"]).map_or(true, |t| t == 0.0) {
            return Err(ProviderError::no_data(PROVIDER, "未知代码"));
        }

        QuoteParts {
            price: num(&body["c"]),
            change: num(&body["d"]),
            change_percent: num(&body["dp"]),
            prev_close: num(&body["pc"]),
            open: num(&body["o"]),
            day_high: num(&body["h"]),
            day_low: num(&body["l"]),
            volume: None,
            last_trading_day: body["t"].as_i64().and_then(|t| unix_to_market_date(t, New_York)),
        }
        .finish(PROVIDER)
    }

    fn parse_candles(body: &Value) -> ProviderResult<Vec<HistoryPoint>> {
        if body["s"].as_str() != Some("ok") {
            return Err(ProviderError::no_data(PROVIDER, "candle 无数据"));
        }

        let timestamps = body["t"].as_array().map(Vec::as_slice).unwrap_or_default();
        let points: Vec<HistoryPoint> = timestamps
            .iter()
            .enumerate()
            .filter_map(|(i, ts)| {
                Some(HistoryPoint {
                    date: unix_to_market_date(ts.as_i64()?, New_York)?,
                    price: num(&body["c"][i])?,
                    volume: int(&body["v"][i]),
                    source_name: PROVIDER.display_name().to_string(),
                })
            })
            .collect();

        if points.is_empty() {
            return Err(ProviderError::no_data(PROVIDER, "candle 序列为空"));
        }
        Ok(points)
    }

    fn parse_profile(body: &Value, symbol: &str) -> ProviderResult<CompanyOverview> {
        let name = text(&body["name"]).ok_or_else(|| ProviderError::no_data(PROVIDER, "profile 为空"))?;

        Ok(CompanyOverview {
            symbol: text(&body["ticker"]).unwrap_or_else(|| symbol.to_string()).to_uppercase(),
            name,
            description: None,
            sector: None,
            industry: text(&body["finnhubIndustry"]),
            // 单位为百万美元
            market_cap: num(&body["marketCapitalization"]).map(|m| (m * 1_000_000.0).round() as u64),
            pe_ratio: None,
            dividend_yield: None,
            fifty_two_week_high: None,
            fifty_two_week_low: None,
            logo: text(&body["logo"]),
            website: text(&body["weburl"]),
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
                let title = text(&item["headline"])?;
                let url = text(&item["url"])?;
                let published_at = unix_to_datetime(item["datetime"].as_i64()?)?;
                let source = text(&item["source"]).unwrap_or_else(|| PROVIDER.display_name().to_string());
                Some(NewsArticle::new(
                    title,
                    text(&item["summary"]),
                    url,
                    source,
                    published_at,
                    PROVIDER.display_name(),
                ))
            })
            .collect())
    }
}

#[async_trait]
impl MarketDataProvider for FinnhubProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            quote: true,
            history: &[Interval::Daily, Interval::Weekly, Interval::Monthly],
            overview: true,
            news: true,
            currency: false,
            reports_volume: false,
        }
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get_quote(&self, symbol: &str) -> ProviderResult<Quote> {
        let body = self.get("/quote", &[("symbol", symbol)]).await?;
        Self::parse_quote(&body)
    }

    async fn get_history(&self, symbol: &str, range: HistoryRange) -> ProviderResult<Vec<HistoryPoint>> {
        let to = chrono::Utc::now().timestamp();
        let from = match window_start(range).and_then(|d| d.and_hms_opt(0, 0, 0)) {
            Some(start) => start.and_utc().timestamp(),
            None => 0,
        };
        let (from, to) = (from.to_string(), to.to_string());

        let body = self
            .get(
                "/stock/candle",
                &[
                    ("symbol", symbol),
                    ("resolution", Self::resolution(range.interval)),
                    ("from", from.as_str()),
                    ("to", to.as_str()),
                ],
            )
            .await?;
        Self::parse_candles(&body)
    }

    async fn get_overview(&self, symbol: &str) -> ProviderResult<CompanyOverview> {
        let body = self.get("/stock/profile2", &[("symbol", symbol)]).await?;
        Self::parse_profile(&body, symbol)
    }

    async fn get_news(&self, query: &str) -> ProviderResult<Vec<NewsArticle>> {
        let body = if looks_like_ticker(query) {
            let to = market_today();
            let from = to - ChronoDuration::days(7);
            let (from, to) = (from.to_string(), to.to_string());
            self.get(
                "/company-news",
                &[("symbol", query.trim()), ("from", from.as_str()), ("to", to.as_str())],
            )
            .await?
        } else {
            // 大盘新闻不支持关键字，按标题和摘要过滤
            let body = self.get("/news", &[("category", "general")]).await?;
            let keyword = query.trim().to_lowercase();
            return Ok(Self::parse_news(&body)?
                .into_iter()
                .filter(|article| {
                    article.title.to_lowercase().contains(&keyword)
                        || article
                            .summary
                            .as_deref()
                            .map_or(false, |s| s.to_lowercase().contains(&keyword))
                })
                .collect());
        };
        Self::parse_news(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_parse_quote_has_no_volume() {
        let body = json!({
            "c": 183.38, "d": 10.35, "dp": 5.9816,
            "h": 187.0, "l": 182.66, "o": 186.65,
            "pc": 173.03, "t": 1_714_766_401
        });

        let quote = FinnhubProvider::parse_quote(&body).unwrap();
        assert_eq!(quote.price, 183.38);
        assert_eq!(quote.change_percent, 5.9816);
        assert!(quote.volume.is_none());
        assert_eq!(quote.last_trading_day, NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
        assert_eq!(quote.source_name, "Finnhub");
    }

    #[test]
    fn test_unknown_symbol_quote_is_no_data() {
        let body = json!({ "c": 0, "d": null, "dp": null, "h": 0, "l": 0, "o": 0, "pc": 0, "t": 0 });
        assert!(matches!(
            FinnhubProvider::parse_quote(&body),
            Err(ProviderError::NoData { .. })
        ));
    }

    #[test]
    fn test_parse_candles() {
        let body = json!({
            "s": "ok",
            "t": [1_714_656_600, 1_714_743_000],
            "c": [173.03, 183.38],
            "v": [94_214_900, 163_224_100u64]
        });
        let points = FinnhubProvider::parse_candles(&body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].volume, Some(163_224_100));

        let body = json!({ "s": "no_data" });
        assert!(FinnhubProvider::parse_candles(&body).is_err());
    }

    #[test]
    fn test_parse_profile_scales_market_cap() {
        let body = json!({
            "name": "Apple Inc",
            "ticker": "AAPL",
            "finnhubIndustry": "Technology",
            "marketCapitalization": 2_837_369.83,
            "logo": "https://static.finnhub.io/logo/aapl.png",
            "weburl": "https://www.apple.com/"
        });

        let overview = FinnhubProvider::parse_profile(&body, "AAPL").unwrap();
        assert_eq!(overview.market_cap, Some(2_837_369_830_000));
        assert_eq!(overview.industry.as_deref(), Some("Technology"));
        assert!(overview.pe_ratio.is_none());

        assert!(FinnhubProvider::parse_profile(&json!({}), "ZZZZ").is_err());
    }

    #[test]
    fn test_parse_company_news() {
        let body = json!([
            {
                "headline": "Apple unveils new iPad",
                "url": "https://news.test/ipad",
                "datetime": 1_714_743_000,
                "source": "CNBC",
                "summary": ""
            }
        ]);
        let articles = FinnhubProvider::parse_news(&body).unwrap();
        assert_eq!(articles.len(), 1);
        assert!(articles[0].summary.is_none());
        assert_eq!(articles[0].source_label, "CNBC");
    }
}
