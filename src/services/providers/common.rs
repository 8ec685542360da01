//! 公共常量和辅助函数

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use chrono_tz::Tz;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;

use super::{ProviderError, ProviderId, ProviderResult};
use crate::models::{HistoryRange, Quote};

// ==================== 数据源 API 地址 ====================

/// Alpha Vantage 统一查询入口
pub const ALPHA_VANTAGE_API: &str = "https://www.alphavantage.co/query";
/// Yahoo Finance 图表接口
pub const YAHOO_CHART_API: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
/// Yahoo Finance 搜索接口（含新闻）
pub const YAHOO_SEARCH_API: &str = "https://query1.finance.yahoo.com/v1/finance/search";
/// Finnhub API
pub const FINNHUB_API: &str = "https://finnhub.io/api/v1";
/// Twelve Data API
pub const TWELVE_DATA_API: &str = "https://api.twelvedata.com";
/// Marketstack API
pub const MARKETSTACK_API: &str = "https://api.marketstack.com/v1";
/// FMP API
pub const FMP_API: &str = "https://financialmodelingprep.com/api";
/// CoinGecko API
pub const COINGECKO_API: &str = "https://api.coingecko.com/api/v3";
/// FRED API
pub const FRED_API: &str = "https://api.stlouisfed.org/fred";
/// EODHD API
pub const EODHD_API: &str = "https://eodhd.com/api";
/// NewsAPI 全文检索
pub const NEWS_API: &str = "https://newsapi.org/v2/everything";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

// ==================== HTTP ====================

/// 创建所有适配器共用的 HTTP 客户端
pub fn build_client(timeout: Duration, connect_timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .user_agent(USER_AGENT)
        .gzip(true)
        .build()
}

/// 发送 GET 请求并解析 JSON
///
/// 状态码按数据源错误分类：429 限流，404 无数据，其余 4xx 视为请求异常
pub async fn fetch_json(
    client: &Client,
    provider: ProviderId,
    base: &str,
    params: &[(&str, &str)],
    secret: Option<&str>,
) -> ProviderResult<Value> {
    let url = Url::parse_with_params(base, params).map_err(|e| ProviderError::Upstream {
        provider,
        message: format!("构造 URL 失败: {}", e),
    })?;

    log::debug!("📡 {} 请求 URL: {}", provider, mask_secret(url.as_str(), secret));

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::Timeout { provider }
        } else {
            ProviderError::Network { provider, source: e }
        }
    })?;

    let status = response.status();
    match status {
        StatusCode::TOO_MANY_REQUESTS => return Err(ProviderError::RateLimited { provider }),
        StatusCode::NOT_FOUND => return Err(ProviderError::no_data(provider, "HTTP 404")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(ProviderError::Http {
                provider,
                status: status.as_u16(),
            })
        }
        s if s.is_client_error() => {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream {
                provider,
                message: format!("HTTP {} {}", s.as_u16(), truncate(&body, 200)),
            });
        }
        s if !s.is_success() => {
            return Err(ProviderError::Http {
                provider,
                status: s.as_u16(),
            })
        }
        _ => {}
    }

    response.json::<Value>().await.map_err(|e| ProviderError::Decode {
        provider,
        message: e.to_string(),
    })
}

/// 日志中隐藏 API Key
pub fn mask_secret(text: &str, secret: Option<&str>) -> String {
    match secret {
        Some(key) if !key.is_empty() => text.replace(key, "***"),
        _ => text.to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// 已配置的 Key，未配置时返回 `Unavailable`
pub fn require_key(key: &Option<String>, provider: ProviderId) -> ProviderResult<&str> {
    key.as_deref().ok_or(ProviderError::Unavailable { provider })
}

// ==================== 字段解析 ====================

/// 解析数字字符串，兼容 "1.23%"、"1,234"、"None"、"-" 等写法
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().trim_end_matches('%').replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "-" || cleaned == "." || cleaned.eq_ignore_ascii_case("none") {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// 数值字段，可以是 JSON 数字或数字字符串
pub fn num(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// 整数字段（成交量、市值）
pub fn int(value: &Value) -> Option<u64> {
    num(value).filter(|v| *v >= 0.0).map(|v| v.round() as u64)
}

/// 非空文本字段
pub fn text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"))
        .map(String::from)
}

/// 必填数值字段
pub fn require(value: Option<f64>, provider: ProviderId, field: &str) -> ProviderResult<f64> {
    value.ok_or_else(|| ProviderError::no_data(provider, format!("缺少字段 {}", field)))
}

/// 解析日期，兼容带时间部分的写法（只取前 10 位）
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    raw.trim()
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

/// 解析时间戳，无时区信息的按 UTC 处理
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y%m%dT%H%M%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    parse_date(raw)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Unix 秒转 UTC 时间
pub fn unix_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Unix 秒转交易所当地日期
pub fn unix_to_market_date(secs: i64, tz: Tz) -> Option<NaiveDate> {
    unix_to_datetime(secs).map(|dt| dt.with_timezone(&tz).date_naive())
}

/// 交易所时区，无法识别时按美东处理
pub fn market_timezone(name: Option<&str>) -> Tz {
    name.and_then(|n| n.parse::<Tz>().ok()).unwrap_or(New_York)
}

/// 美东当前日期
pub fn market_today() -> NaiveDate {
    Utc::now().with_timezone(&New_York).date_naive()
}

/// 历史窗口起始日期
pub fn window_start(range: HistoryRange) -> Option<NaiveDate> {
    range.period.start_date(market_today())
}

/// 拆分加密货币代码，如 BTC-USD -> (BTC, USD)
pub fn crypto_pair(symbol: &str) -> Option<(String, String)> {
    let (base, quote) = symbol.split_once('-')?;
    let valid = |s: &str| (2..=10).contains(&s.len()) && s.chars().all(|c| c.is_ascii_alphanumeric());
    if valid(base) && valid(quote) && quote.len() == 3 {
        Some((base.to_ascii_uppercase(), quote.to_ascii_uppercase()))
    } else {
        None
    }
}

/// 新闻关键字是否是股票代码（全大写），是则按代码查询，否则按关键字检索
pub fn looks_like_ticker(query: &str) -> bool {
    let query = query.trim();
    !query.is_empty()
        && query.len() <= 10
        && query.starts_with(|c: char| c.is_ascii_uppercase())
        && query
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-')
}

// ==================== 报价组装 ====================

/// 报价字段收集器
///
/// 缺少的涨跌额/涨跌幅由最新价与昨收推出，其余价格字段必须齐全
#[derive(Debug, Default)]
pub struct QuoteParts {
    pub price: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub prev_close: Option<f64>,
    pub open: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub volume: Option<u64>,
    pub last_trading_day: Option<NaiveDate>,
}

impl QuoteParts {
    pub fn finish(self, provider: ProviderId) -> ProviderResult<Quote> {
        let price = require(self.price, provider, "price")?;
        let prev_close = self.prev_close.or_else(|| self.change.map(|c| price - c));
        let prev_close = require(prev_close, provider, "prevClose")?;
        let change = self.change.unwrap_or(price - prev_close);
        let change_percent = self.change_percent.unwrap_or(if prev_close != 0.0 {
            change / prev_close * 100.0
        } else {
            0.0
        });

        Ok(Quote {
            price,
            change,
            change_percent,
            volume: self.volume,
            prev_close,
            open: require(self.open, provider, "open")?,
            day_high: require(self.day_high, provider, "dayHigh")?,
            day_low: require(self.day_low, provider, "dayLow")?,
            last_trading_day: self
                .last_trading_day
                .ok_or_else(|| ProviderError::no_data(provider, "缺少字段 lastTradingDay"))?,
            source_name: provider.display_name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_number_variants() {
        assert_eq!(parse_number("1.25%"), Some(1.25));
        assert_eq!(parse_number(" -0.5% "), Some(-0.5));
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("None"), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("."), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn test_num_and_int() {
        assert_eq!(num(&json!(3.5)), Some(3.5));
        assert_eq!(num(&json!("3.5")), Some(3.5));
        assert_eq!(num(&json!(null)), None);
        assert_eq!(int(&json!("1200")), Some(1200));
        assert_eq!(int(&json!(-3)), None);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 3, 13, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-03T13:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("20240503T133000"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-03 13:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-03T13:30:00+0000"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-05-03"),
            Some(Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_unix_to_market_date_uses_exchange_timezone() {
        // 2024-05-03 23:30 UTC 在纽约仍是 5 月 3 日，在东京已是 5 月 4 日
        let secs = 1_714_779_000;
        assert_eq!(
            unix_to_market_date(secs, New_York),
            NaiveDate::from_ymd_opt(2024, 5, 3)
        );
        assert_eq!(
            unix_to_market_date(secs, market_timezone(Some("Asia/Tokyo"))),
            NaiveDate::from_ymd_opt(2024, 5, 4)
        );
        assert_eq!(market_timezone(Some("Mars/Olympus")), New_York);
    }

    #[test]
    fn test_crypto_pair() {
        assert_eq!(crypto_pair("btc-usd"), Some(("BTC".into(), "USD".into())));
        assert_eq!(crypto_pair("AAPL"), None);
        assert_eq!(crypto_pair("BRK-B"), None);
    }

    #[test]
    fn test_looks_like_ticker() {
        assert!(looks_like_ticker("AAPL"));
        assert!(looks_like_ticker("BRK.B"));
        assert!(!looks_like_ticker("Apple earnings"));
        assert!(!looks_like_ticker("aapl"));
        assert!(!looks_like_ticker(""));
    }

    #[test]
    fn test_quote_parts_derives_change() {
        let quote = QuoteParts {
            price: Some(110.0),
            prev_close: Some(100.0),
            open: Some(101.0),
            day_high: Some(111.0),
            day_low: Some(99.0),
            last_trading_day: NaiveDate::from_ymd_opt(2024, 5, 3),
            ..Default::default()
        }
        .finish(ProviderId::Yahoo)
        .unwrap();

        assert_eq!(quote.change, 10.0);
        assert_eq!(quote.change_percent, 10.0);
        assert_eq!(quote.source_name, "Yahoo Finance");
        assert!(quote.volume.is_none());
    }

    #[test]
    fn test_quote_parts_requires_price() {
        let err = QuoteParts {
            prev_close: Some(100.0),
            ..Default::default()
        }
        .finish(ProviderId::Fmp)
        .unwrap_err();
        assert!(matches!(err, ProviderError::NoData { .. }));
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(
            mask_secret("https://x.test/?apikey=abc123", Some("abc123")),
            "https://x.test/?apikey=***"
        );
        assert_eq!(mask_secret("https://x.test/", None), "https://x.test/");
    }
}
