//! Marketstack 适配器
//!
//! 只提供日终数据：报价取最近两根日线，历史只支持日线

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::common::{
    fetch_json, int, num, parse_date, require_key, text, window_start, QuoteParts, MARKETSTACK_API,
};
use super::{Capabilities, MarketDataProvider, ProviderError, ProviderId, ProviderResult, RateGate};
use crate::models::{HistoryPoint, HistoryRange, Interval, Quote};

const PROVIDER: ProviderId = ProviderId::Marketstack;

/// Marketstack 数据源
pub struct MarketstackProvider {
    client: Client,
    api_key: Option<String>,
    gate: RateGate,
}

impl MarketstackProvider {
    pub fn new(client: Client, api_key: Option<String>, gate: RateGate) -> Self {
        Self {
            client,
            api_key,
            gate,
        }
    }

    async fn eod(&self, params: &[(&str, &str)]) -> ProviderResult<Vec<Value>> {
        let key = require_key(&self.api_key, PROVIDER)?;
        self.gate.acquire(PROVIDER).await?;

        let url = format!("{}/eod", MARKETSTACK_API);
        let mut all_params = params.to_vec();
        all_params.push(("access_key", key));

        let body = fetch_json(&self.client, PROVIDER, &url, &all_params, Some(key)).await?;
        Self::bars(body)
    }

    fn bars(body: Value) -> ProviderResult<Vec<Value>> {
        if let Some(message) = text(&body["error"]["message"]) {
            return Err(ProviderError::no_data(PROVIDER, message));
        }
        match body {
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Array(bars)) if !bars.is_empty() => Ok(bars),
                _ => Err(ProviderError::no_data(PROVIDER, "data 为空")),
            },
            _ => Err(ProviderError::no_data(PROVIDER, "响应格式异常")),
        }
    }

    /// 数据按日期倒序返回，第一根为最新
    fn parse_quote(bars: &[Value]) -> ProviderResult<Quote> {
        let latest = bars
            .first()
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "无日线数据"))?;
        let previous = bars.get(1);

        QuoteParts {
            price: num(&latest["close"]),
            change: None,
            change_percent: None,
            prev_close: previous.and_then(|bar| num(&bar["close"])),
            open: num(&latest["open"]),
            day_high: num(&latest["high"]),
            day_low: num(&latest["low"]),
            volume: int(&latest["volume"]),
            last_trading_day: latest["date"].as_str().and_then(parse_date),
        }
        .finish(PROVIDER)
    }

    fn parse_history(bars: &[Value]) -> Vec<HistoryPoint> {
        bars.iter()
            .filter_map(|bar| {
                Some(HistoryPoint {
                    date: parse_date(bar["date"].as_str()?)?,
                    price: num(&bar["adj_close"]).or_else(|| num(&bar["close"]))?,
                    volume: int(&bar["volume"]),
                    source_name: PROVIDER.display_name().to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl MarketDataProvider for MarketstackProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            quote: true,
            history: &[Interval::Daily],
            reports_volume: true,
            ..Default::default()
        }
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get_quote(&self, symbol: &str) -> ProviderResult<Quote> {
        let bars = self.eod(&[("symbols", symbol), ("limit", "2")]).await?;
        Self::parse_quote(&bars)
    }

    async fn get_history(&self, symbol: &str, range: HistoryRange) -> ProviderResult<Vec<HistoryPoint>> {
        if range.interval != Interval::Daily {
            return Err(self.unsupported("weekly/monthly history"));
        }

        let date_from = window_start(range).map(|d| d.to_string());
        let mut params = vec![("symbols", symbol), ("limit", "1000")];
        if let Some(from) = date_from.as_deref() {
            params.push(("date_from", from));
        }

        let bars = self.eod(&params).await?;
        let points = Self::parse_history(&bars);
        if points.is_empty() {
            return Err(ProviderError::no_data(PROVIDER, "K线序列为空"));
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eod_fixture() -> Value {
        json!({
            "pagination": { "limit": 2, "offset": 0, "count": 2, "total": 250 },
            "data": [
                {
                    "open": 186.65, "high": 187.0, "low": 182.66, "close": 183.38,
                    "volume": 163_224_100.0, "adj_close": 183.38,
                    "symbol": "AAPL", "date": "2024-05-03T00:00:00+0000"
                },
                {
                    "open": 169.58, "high": 173.42, "low": 170.89, "close": 173.03,
                    "volume": 94_214_900.0, "adj_close": 172.5,
                    "symbol": "AAPL", "date": "2024-05-02T00:00:00+0000"
                }
            ]
        })
    }

    #[test]
    fn test_parse_quote_from_two_bars() {
        let bars = MarketstackProvider::bars(eod_fixture()).unwrap();
        let quote = MarketstackProvider::parse_quote(&bars).unwrap();
        assert_eq!(quote.price, 183.38);
        assert_eq!(quote.prev_close, 173.03);
        assert_eq!(quote.volume, Some(163_224_100));
        assert_eq!(quote.source_name, "Marketstack");
    }

    #[test]
    fn test_single_bar_has_no_prev_close() {
        let bars = MarketstackProvider::bars(eod_fixture()).unwrap();
        assert!(MarketstackProvider::parse_quote(&bars[..1]).is_err());
    }

    #[test]
    fn test_parse_history_prefers_adj_close() {
        let bars = MarketstackProvider::bars(eod_fixture()).unwrap();
        let points = MarketstackProvider::parse_history(&bars);
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].price, 172.5);
    }

    #[test]
    fn test_error_body() {
        let body = json!({ "error": { "code": "invalid_access_key", "message": "You have not supplied a valid API Access Key." } });
        assert!(MarketstackProvider::bars(body).is_err());
        assert!(MarketstackProvider::bars(json!({ "data": [] })).is_err());
    }

    #[tokio::test]
    async fn test_weekly_history_is_unsupported() {
        let provider = MarketstackProvider::new(Client::new(), Some("key".into()), RateGate::unlimited());
        let range = HistoryRange {
            interval: Interval::Weekly,
            ..Default::default()
        };
        assert!(!provider.supports_history(range));
        assert!(matches!(
            provider.get_history("AAPL", range).await,
            Err(ProviderError::Unsupported { .. })
        ));
    }
}
