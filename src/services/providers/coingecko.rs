//! CoinGecko 适配器
//!
//! 只处理加密货币：股票代码形如 `BTC-USD`，汇率的基础货币为币种代码。
//! 公共接口无需 Key，配置了 Demo Key 时附加 `x_cg_demo_api_key`

use async_trait::async_trait;
use chrono_tz::UTC;
use reqwest::Client;
use serde_json::Value;

use super::common::{
    crypto_pair, fetch_json, int, num, parse_timestamp, unix_to_datetime, unix_to_market_date, QuoteParts,
    COINGECKO_API,
};
use super::{Capabilities, MarketDataProvider, ProviderError, ProviderId, ProviderResult, RateGate};
use crate::models::{CurrencyRate, HistoryPoint, HistoryRange, Interval, Quote};

const PROVIDER: ProviderId = ProviderId::CoinGecko;

/// 常见币种代码到 CoinGecko id 的映射
const COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("BNB", "binancecoin"),
    ("XRP", "ripple"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("DOT", "polkadot"),
    ("LTC", "litecoin"),
    ("AVAX", "avalanche-2"),
    ("LINK", "chainlink"),
    ("MATIC", "matic-network"),
    ("USDT", "tether"),
    ("USDC", "usd-coin"),
];

/// CoinGecko 数据源
pub struct CoinGeckoProvider {
    client: Client,
    api_key: Option<String>,
    gate: RateGate,
}

impl CoinGeckoProvider {
    pub fn new(client: Client, api_key: Option<String>, gate: RateGate) -> Self {
        Self {
            client,
            api_key,
            gate,
        }
    }

    pub fn coin_id(code: &str) -> Option<&'static str> {
        COIN_IDS
            .iter()
            .find(|(symbol, _)| symbol.eq_ignore_ascii_case(code))
            .map(|(_, id)| *id)
    }

    /// 解析 `BTC-USD` 为 (coin id, 计价货币小写)
    fn resolve(symbol: &str) -> ProviderResult<(&'static str, String)> {
        let (base, quote) =
            crypto_pair(symbol).ok_or_else(|| ProviderError::no_data(PROVIDER, "不是加密货币代码"))?;
        let id = Self::coin_id(&base).ok_or_else(|| ProviderError::no_data(PROVIDER, format!("未知币种 {}", base)))?;
        Ok((id, quote.to_lowercase()))
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> ProviderResult<Value> {
        self.gate.acquire(PROVIDER).await?;

        let url = format!("{}{}", COINGECKO_API, path);
        let mut all_params = params.to_vec();
        if let Some(key) = self.api_key.as_deref() {
            all_params.push(("x_cg_demo_api_key", key));
        }
        fetch_json(&self.client, PROVIDER, &url, &all_params, self.api_key.as_deref()).await
    }

    fn parse_market(body: &Value) -> ProviderResult<Quote> {
        let item = body
            .as_array()
            .and_then(|items| items.first())
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "markets 为空"))?;

        let price = num(&item["current_price"]);
        let change = num(&item["price_change_24h"]);
        // 24 小时前的价格作为开盘价与昨收
        let reference = price.zip(change).map(|(p, c)| p - c);
        let last_update = item["last_updated"].as_str().and_then(parse_timestamp);

        QuoteParts {
            price,
            change,
            change_percent: num(&item["price_change_percentage_24h"]),
            prev_close: reference,
            open: reference,
            day_high: num(&item["high_24h"]),
            day_low: num(&item["low_24h"]),
            volume: int(&item["total_volume"]),
            last_trading_day: last_update.map(|dt| dt.date_naive()),
        }
        .finish(PROVIDER)
    }

    fn parse_market_chart(body: &Value) -> ProviderResult<Vec<HistoryPoint>> {
        let prices = body["prices"]
            .as_array()
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少 prices"))?;
        let volumes = body["total_volumes"].as_array();

        let points: Vec<HistoryPoint> = prices
            .iter()
            .enumerate()
            .filter_map(|(i, pair)| {
                let millis = pair[0].as_i64()?;
                Some(HistoryPoint {
                    date: unix_to_market_date(millis / 1000, UTC)?,
                    price: num(&pair[1])?,
                    volume: volumes.and_then(|v| v.get(i)).and_then(|v| int(&v[1])),
                    source_name: PROVIDER.display_name().to_string(),
                })
            })
            .collect();

        if points.is_empty() {
            return Err(ProviderError::no_data(PROVIDER, "K线序列为空"));
        }
        Ok(points)
    }

    fn parse_simple_price(body: &Value, id: &str, base: &str, quote: &str) -> ProviderResult<CurrencyRate> {
        let vs = quote.to_lowercase();
        let entry = &body[id];
        let rate = num(&entry[vs.as_str()]).ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少汇率"))?;
        let change_pct = num(&entry[format!("{}_24h_change", vs).as_str()]).unwrap_or(0.0);
        let previous = rate / (1.0 + change_pct / 100.0);
        let last_update = entry["last_updated_at"]
            .as_i64()
            .and_then(unix_to_datetime)
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少更新时间"))?;

        Ok(CurrencyRate::from_pair(base, quote, rate, previous, last_update, PROVIDER.display_name()))
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            quote: true,
            history: &[Interval::Daily],
            overview: false,
            news: false,
            currency: true,
            reports_volume: true,
        }
    }

    async fn get_quote(&self, symbol: &str) -> ProviderResult<Quote> {
        let (id, vs) = Self::resolve(symbol)?;
        let body = self
            .get("/coins/markets", &[("vs_currency", vs.as_str()), ("ids", id)])
            .await?;
        Self::parse_market(&body)
    }

    async fn get_history(&self, symbol: &str, range: HistoryRange) -> ProviderResult<Vec<HistoryPoint>> {
        if range.interval != Interval::Daily {
            return Err(self.unsupported("weekly/monthly history"));
        }
        let (id, vs) = Self::resolve(symbol)?;
        let days = range
            .period
            .approx_days()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "max".to_string());

        let body = self
            .get(
                &format!("/coins/{}/market_chart", id),
                &[("vs_currency", vs.as_str()), ("days", days.as_str()), ("interval", "daily")],
            )
            .await?;
        Self::parse_market_chart(&body)
    }

    async fn get_currency_rate(&self, base: &str, quote: &str) -> ProviderResult<CurrencyRate> {
        let id = Self::coin_id(base)
            .ok_or_else(|| ProviderError::no_data(PROVIDER, format!("{} 不是加密货币", base)))?;
        let vs = quote.to_lowercase();
        let body = self
            .get(
                "/simple/price",
                &[
                    ("ids", id),
                    ("vs_currencies", vs.as_str()),
                    ("include_24hr_change", "true"),
                    ("include_last_updated_at", "true"),
                ],
            )
            .await?;
        Self::parse_simple_price(&body, id, base, quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_resolve_symbol() {
        assert_eq!(
            CoinGeckoProvider::resolve("BTC-USD").unwrap(),
            ("bitcoin", "usd".to_string())
        );
        assert!(CoinGeckoProvider::resolve("AAPL").is_err());
        assert!(CoinGeckoProvider::resolve("XYZ-USD").is_err());
    }

    #[test]
    fn test_parse_market() {
        let body = json!([{
            "id": "bitcoin",
            "current_price": 63000.0,
            "high_24h": 64000.0,
            "low_24h": 61000.0,
            "price_change_24h": 1000.0,
            "price_change_percentage_24h": 1.6129,
            "total_volume": 25_000_000_000u64,
            "last_updated": "2024-05-03T23:30:00.000Z"
        }]);

        let quote = CoinGeckoProvider::parse_market(&body).unwrap();
        assert_eq!(quote.prev_close, 62000.0);
        assert_eq!(quote.open, 62000.0);
        assert_eq!(quote.volume, Some(25_000_000_000));
        assert_eq!(quote.last_trading_day, NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
    }

    #[test]
    fn test_parse_market_chart() {
        let body = json!({
            "prices": [[1_714_694_400_000i64, 59000.5], [1_714_780_800_000i64, 63000.0]],
            "total_volumes": [[1_714_694_400_000i64, 3.1e10], [1_714_780_800_000i64, 2.5e10]]
        });
        let points = CoinGeckoProvider::parse_market_chart(&body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
        assert_eq!(points[1].volume, Some(25_000_000_000));
    }

    #[test]
    fn test_parse_simple_price() {
        let body = json!({
            "bitcoin": { "usd": 63000.0, "usd_24h_change": 5.0, "last_updated_at": 1_714_779_000 }
        });
        let rate = CoinGeckoProvider::parse_simple_price(&body, "bitcoin", "BTC", "USD").unwrap();
        assert_eq!(rate.rate, 63000.0);
        assert!((rate.change_percent - 5.0).abs() < 1e-9);
    }
}
