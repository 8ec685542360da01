//! Alpha Vantage 适配器
//!
//! 对接 https://www.alphavantage.co/query ，所有功能通过 `function` 参数区分：
//! - GLOBAL_QUOTE：实时报价，涨跌幅为带 `%` 的字符串
//! - TIME_SERIES_{DAILY,WEEKLY,MONTHLY}_ADJUSTED：复权K线
//! - OVERVIEW：公司概况，股息率为小数
//! - NEWS_SENTIMENT：按代码查询新闻及情绪
//! - FX_DAILY：外汇日线
//!
//! 免费档位频率很低，超限时返回 200 + "Note"/"Information" 字段而不是 429

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;

use super::common::{
    fetch_json, int, looks_like_ticker, num, parse_date, parse_timestamp, require_key, text,
    window_start, QuoteParts, ALPHA_VANTAGE_API,
};
use super::{
    Capabilities, MarketDataProvider, ProviderError, ProviderId, ProviderResult, RateGate,
};
use crate::models::{
    CompanyOverview, CurrencyRate, HistoryPoint, HistoryRange, Interval, NewsArticle, Period, Quote,
};

const PROVIDER: ProviderId = ProviderId::AlphaVantage;

/// Alpha Vantage 数据源
pub struct AlphaVantageProvider {
    client: Client,
    api_key: Option<String>,
    gate: RateGate,
}

impl AlphaVantageProvider {
    pub fn new(client: Client, api_key: Option<String>, gate: RateGate) -> Self {
        Self {
            client,
            api_key,
            gate,
        }
    }

    async fn query(&self, params: &[(&str, &str)]) -> ProviderResult<Value> {
        let key = require_key(&self.api_key, PROVIDER)?;
        self.gate.acquire(PROVIDER).await?;

        let mut all_params = params.to_vec();
        all_params.push(("apikey", key));

        let body = fetch_json(&self.client, PROVIDER, ALPHA_VANTAGE_API, &all_params, Some(key)).await?;
        Self::check_api_error(&body)?;
        Ok(body)
    }

    /// 检查接口级错误：限流和无效参数都以 200 返回
    fn check_api_error(body: &Value) -> ProviderResult<()> {
        if let Some(message) = text(&body["Error Message"]) {
            return Err(ProviderError::no_data(PROVIDER, message));
        }

        for field in ["Note", "Information"] {
            if let Some(message) = text(&body[field]) {
                let lower = message.to_lowercase();
                if lower.contains("frequency") || lower.contains("rate limit") || lower.contains("requests per") {
                    return Err(ProviderError::RateLimited { provider: PROVIDER });
                }
                return Err(ProviderError::no_data(PROVIDER, message));
            }
        }

        Ok(())
    }

    // ==================== 报价 ====================

    fn parse_quote(body: &Value) -> ProviderResult<Quote> {
        let data = &body["Global Quote"];
        if data.as_object().map_or(true, |m| m.is_empty()) {
            return Err(ProviderError::no_data(PROVIDER, "Global Quote 为空"));
        }

        QuoteParts {
            price: num(&data["05. price"]),
            change: num(&data["09. change"]),
            change_percent: num(&data["10. change percent"]),
            prev_close: num(&data["08. previous close"]),
            open: num(&data["02. open"]),
            day_high: num(&data["03. high"]),
            day_low: num(&data["04. low"]),
            volume: int(&data["06. volume"]),
            last_trading_day: data["07. latest trading day"].as_str().and_then(parse_date),
        }
        .finish(PROVIDER)
    }

    // ==================== K线 ====================

    /// 周期对应的 function 参数和响应中的序列字段名
    fn series_function(interval: Interval) -> (&'static str, &'static str) {
        match interval {
            Interval::Daily => ("TIME_SERIES_DAILY_ADJUSTED", "Time Series (Daily)"),
            Interval::Weekly => ("TIME_SERIES_WEEKLY_ADJUSTED", "Weekly Adjusted Time Series"),
            Interval::Monthly => ("TIME_SERIES_MONTHLY_ADJUSTED", "Monthly Adjusted Time Series"),
        }
    }

    fn parse_history(body: &Value, series_key: &str) -> ProviderResult<Vec<HistoryPoint>> {
        let series = body[series_key]
            .as_object()
            .ok_or_else(|| ProviderError::no_data(PROVIDER, format!("缺少 {}", series_key)))?;

        let points: Vec<HistoryPoint> = series
            .iter()
            .filter_map(|(date, values)| {
                let date = parse_date(date)?;
                let price = num(&values["5. adjusted close"]).or_else(|| num(&values["4. close"]))?;
                let volume = int(&values["6. volume"]).or_else(|| int(&values["5. volume"]));
                Some(HistoryPoint {
                    date,
                    price,
                    volume,
                    source_name: PROVIDER.display_name().to_string(),
                })
            })
            .collect();

        if points.is_empty() {
            return Err(ProviderError::no_data(PROVIDER, "K线序列为空"));
        }
        Ok(points)
    }

    // ==================== 公司概况 ====================

    fn parse_overview(body: &Value, symbol: &str) -> ProviderResult<CompanyOverview> {
        let reported = text(&body["Symbol"]).unwrap_or_default();
        if !reported.eq_ignore_ascii_case(symbol) {
            return Err(ProviderError::no_data(PROVIDER, "OVERVIEW 代码不匹配"));
        }
        let name = text(&body["Name"]).ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少公司名称"))?;

        Ok(CompanyOverview {
            symbol: reported.to_uppercase(),
            name,
            description: text(&body["Description"]),
            sector: text(&body["Sector"]),
            industry: text(&body["Industry"]),
            market_cap: int(&body["MarketCapitalization"]),
            pe_ratio: num(&body["PERatio"]),
            // 接口返回小数（0.0052），统一为百分比
            dividend_yield: num(&body["DividendYield"]).map(|v| v * 100.0),
            fifty_two_week_high: num(&body["52WeekHigh"]),
            fifty_two_week_low: num(&body["52WeekLow"]),
            logo: None,
            website: text(&body["OfficialSite"]),
            source_name: PROVIDER.display_name().to_string(),
        })
    }

    // ==================== 新闻 ====================

    fn parse_news(body: &Value) -> ProviderResult<Vec<NewsArticle>> {
        let feed = body["feed"]
            .as_array()
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少 feed"))?;

        Ok(feed
            .iter()
            .filter_map(|item| {
                let title = text(&item["title"])?;
                let url = text(&item["url"])?;
                let published_at = item["time_published"].as_str().and_then(parse_timestamp)?;
                let source = text(&item["source"]).unwrap_or_else(|| PROVIDER.display_name().to_string());
                Some(
                    NewsArticle::new(title, text(&item["summary"]), url, source, published_at, PROVIDER.display_name())
                        .with_sentiment(text(&item["overall_sentiment_label"])),
                )
            })
            .collect())
    }

    // ==================== 外汇 ====================

    fn parse_fx_daily(body: &Value, base: &str, quote: &str) -> ProviderResult<CurrencyRate> {
        let series = body["Time Series FX (Daily)"]
            .as_object()
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少外汇序列"))?;

        let mut closes: Vec<(NaiveDate, f64)> = series
            .iter()
            .filter_map(|(date, values)| Some((parse_date(date)?, num(&values["4. close"])?)))
            .collect();
        closes.sort_by(|a, b| b.0.cmp(&a.0));

        let (latest_date, latest) = *closes
            .first()
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "外汇序列为空"))?;
        let previous = closes.get(1).map(|(_, close)| *close).unwrap_or(latest);

        let last_update = body["Meta Data"]["5. Last Refreshed"]
            .as_str()
            .and_then(parse_timestamp)
            .or_else(|| parse_timestamp(&latest_date.to_string()))
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少更新时间"))?;

        Ok(CurrencyRate::from_pair(base, quote, latest, previous, last_update, PROVIDER.display_name()))
    }
}

#[async_trait]
impl MarketDataProvider for AlphaVantageProvider {
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
        let body = self.query(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol)]).await?;
        Self::parse_quote(&body)
    }

    async fn get_history(&self, symbol: &str, range: HistoryRange) -> ProviderResult<Vec<HistoryPoint>> {
        let (function, series_key) = Self::series_function(range.interval);
        // compact 只有最近 100 个交易日
        let output_size = match range.period {
            Period::OneMonth | Period::ThreeMonths => "compact",
            _ => "full",
        };

        let body = self
            .query(&[("function", function), ("symbol", symbol), ("outputsize", output_size)])
            .await?;
        let points = Self::parse_history(&body, series_key)?;

        match window_start(range) {
            Some(start) => Ok(points.into_iter().filter(|p| p.date >= start).collect()),
            None => Ok(points),
        }
    }

    async fn get_overview(&self, symbol: &str) -> ProviderResult<CompanyOverview> {
        let body = self.query(&[("function", "OVERVIEW"), ("symbol", symbol)]).await?;
        Self::parse_overview(&body, symbol)
    }

    async fn get_news(&self, query: &str) -> ProviderResult<Vec<NewsArticle>> {
        // NEWS_SENTIMENT 只支持按代码过滤
        if !looks_like_ticker(query) {
            return Err(ProviderError::no_data(PROVIDER, "仅支持按股票代码查询新闻"));
        }
        let body = self
            .query(&[("function", "NEWS_SENTIMENT"), ("tickers", query.trim()), ("limit", "50")])
            .await?;
        Self::parse_news(&body)
    }

    async fn get_currency_rate(&self, base: &str, quote: &str) -> ProviderResult<CurrencyRate> {
        let body = self
            .query(&[("function", "FX_DAILY"), ("from_symbol", base), ("to_symbol", quote)])
            .await?;
        Self::parse_fx_daily(&body, base, quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_global_quote() {
        let body = json!({
            "Global Quote": {
                "01. symbol": "IBM",
                "02. open": "166.5000",
                "03. high": "168.4000",
                "04. low": "165.9100",
                "05. price": "167.1300",
                "06. volume": "3356287",
                "07. latest trading day": "2024-05-03",
                "08. previous close": "165.2900",
                "09. change": "1.8400",
                "10. change percent": "1.1132%"
            }
        });

        let quote = AlphaVantageProvider::parse_quote(&body).unwrap();
        println!("  IBM 最新价: {} 涨跌幅: {}%", quote.price, quote.change_percent);
        assert_eq!(quote.price, 167.13);
        assert_eq!(quote.change_percent, 1.1132);
        assert_eq!(quote.volume, Some(3_356_287));
        assert_eq!(quote.last_trading_day, NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
        assert_eq!(quote.source_name, "Alpha Vantage");
    }

    #[test]
    fn test_empty_global_quote_is_no_data() {
        let body = json!({ "Global Quote": {} });
        assert!(matches!(
            AlphaVantageProvider::parse_quote(&body),
            Err(ProviderError::NoData { .. })
        ));
    }

    #[test]
    fn test_rate_limit_note() {
        let body = json!({
            "Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."
        });
        assert!(matches!(
            AlphaVantageProvider::check_api_error(&body),
            Err(ProviderError::RateLimited { .. })
        ));

        let body = json!({ "Error Message": "Invalid API call." });
        assert!(matches!(
            AlphaVantageProvider::check_api_error(&body),
            Err(ProviderError::NoData { .. })
        ));
    }

    #[test]
    fn test_parse_daily_adjusted_history() {
        let body = json!({
            "Time Series (Daily)": {
                "2024-05-03": { "4. close": "167.13", "5. adjusted close": "166.00", "6. volume": "3356287" },
                "2024-05-02": { "4. close": "165.29", "5. adjusted close": "164.20", "6. volume": "2840000" },
                "bad-date": { "4. close": "1" }
            }
        });

        let points = AlphaVantageProvider::parse_history(&body, "Time Series (Daily)").unwrap();
        assert_eq!(points.len(), 2);
        let may3 = points
            .iter()
            .find(|p| p.date == NaiveDate::from_ymd_opt(2024, 5, 3).unwrap())
            .unwrap();
        assert_eq!(may3.price, 166.0);
        assert_eq!(may3.volume, Some(3_356_287));
    }

    #[test]
    fn test_missing_series_is_no_data() {
        let body = json!({ "Meta Data": {} });
        assert!(AlphaVantageProvider::parse_history(&body, "Weekly Adjusted Time Series").is_err());
    }

    #[test]
    fn test_parse_overview_scales_dividend_yield() {
        let body = json!({
            "Symbol": "AAPL",
            "Name": "Apple Inc",
            "Description": "Apple designs smartphones.",
            "Sector": "TECHNOLOGY",
            "Industry": "ELECTRONIC COMPUTERS",
            "MarketCapitalization": "2837369831000",
            "PERatio": "28.5",
            "DividendYield": "0.0052",
            "52WeekHigh": "199.62",
            "52WeekLow": "164.08"
        });

        let overview = AlphaVantageProvider::parse_overview(&body, "aapl").unwrap();
        assert_eq!(overview.market_cap, Some(2_837_369_831_000));
        assert!((overview.dividend_yield.unwrap() - 0.52).abs() < 1e-9);
        assert_eq!(overview.fifty_two_week_low, Some(164.08));
    }

    #[test]
    fn test_parse_overview_none_values_stay_null() {
        let body = json!({
            "Symbol": "XYZ",
            "Name": "XYZ Corp",
            "PERatio": "None",
            "DividendYield": "None",
            "MarketCapitalization": "-"
        });

        let overview = AlphaVantageProvider::parse_overview(&body, "XYZ").unwrap();
        assert!(overview.pe_ratio.is_none());
        assert!(overview.dividend_yield.is_none());
        assert!(overview.market_cap.is_none());
    }

    #[test]
    fn test_overview_symbol_mismatch() {
        let body = json!({});
        assert!(AlphaVantageProvider::parse_overview(&body, "ZZZZ").is_err());
    }

    #[test]
    fn test_parse_news_sentiment() {
        let body = json!({
            "feed": [
                {
                    "title": "Apple beats estimates",
                    "url": "https://news.test/apple",
                    "time_published": "20240503T133000",
                    "summary": "Strong quarter.",
                    "source": "Benzinga",
                    "overall_sentiment_label": "Bullish"
                },
                { "title": "no url" }
            ]
        });

        let articles = AlphaVantageProvider::parse_news(&body).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source_label, "Benzinga");
        assert_eq!(articles[0].provider_tag, "Alpha Vantage");
        assert_eq!(articles[0].sentiment.as_deref(), Some("Bullish"));
    }

    #[test]
    fn test_parse_fx_daily() {
        let body = json!({
            "Meta Data": { "5. Last Refreshed": "2024-05-03 16:00:00" },
            "Time Series FX (Daily)": {
                "2024-05-02": { "4. close": "10.80" },
                "2024-05-03": { "4. close": "10.90" }
            }
        });

        let rate = AlphaVantageProvider::parse_fx_daily(&body, "USD", "SEK").unwrap();
        assert_eq!(rate.rate, 10.90);
        assert!((rate.change - 0.10).abs() < 1e-9);
        assert_eq!(rate.base, "USD");
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let provider = AlphaVantageProvider::new(Client::new(), None, RateGate::unlimited());
        assert!(!provider.is_available());
        assert!(matches!(
            provider.get_quote("IBM").await,
            Err(ProviderError::Unavailable { .. })
        ));
    }
}
