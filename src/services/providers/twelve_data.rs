//! Twelve Data 适配器
//!
//! 出错时仍返回 200，响应体为 `{"status":"error","code":...,"message":...}`

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::common::{
    fetch_json, int, num, parse_date, parse_timestamp, require_key, text, unix_to_datetime, QuoteParts,
    TWELVE_DATA_API,
};
use super::{Capabilities, MarketDataProvider, ProviderError, ProviderId, ProviderResult, RateGate};
use crate::models::{CurrencyRate, HistoryPoint, HistoryRange, Interval, Quote};

const PROVIDER: ProviderId = ProviderId::TwelveData;

/// Twelve Data 数据源
pub struct TwelveDataProvider {
    client: Client,
    api_key: Option<String>,
    gate: RateGate,
}

impl TwelveDataProvider {
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

        let url = format!("{}{}", TWELVE_DATA_API, path);
        let mut all_params = params.to_vec();
        all_params.push(("apikey", key));

        let body = fetch_json(&self.client, PROVIDER, &url, &all_params, Some(key)).await?;
        Self::check_status(&body)?;
        Ok(body)
    }

    fn check_status(body: &Value) -> ProviderResult<()> {
        if body["status"].as_str() != Some("error") {
            return Ok(());
        }
        let message = text(&body["message"]).unwrap_or_else(|| "未知错误".to_string());
        match body["code"].as_u64() {
            Some(429) => Err(ProviderError::RateLimited { provider: PROVIDER }),
            _ => Err(ProviderError::no_data(PROVIDER, message)),
        }
    }

    fn interval_param(interval: Interval) -> &'static str {
        match interval {
            Interval::Daily => "1day",
            Interval::Weekly => "1week",
            Interval::Monthly => "1month",
        }
    }

    /// 按窗口估算需要的数据条数
    fn output_size(range: HistoryRange) -> String {
        let days = range.period.approx_days().unwrap_or(5000);
        let bars = match range.interval {
            Interval::Daily => days,
            Interval::Weekly => days / 7 + 1,
            Interval::Monthly => days / 30 + 1,
        };
        bars.clamp(1, 5000).to_string()
    }

    fn parse_quote(body: &Value) -> ProviderResult<Quote> {
        QuoteParts {
            price: num(&body["close"]),
            change: num(&body["change"]),
            change_percent: num(&body["percent_change"]),
            prev_close: num(&body["previous_close"]),
            open: num(&body["open"]),
            day_high: num(&body["high"]),
            day_low: num(&body["low"]),
            volume: int(&body["volume"]),
            last_trading_day: body["datetime"].as_str().and_then(parse_date),
        }
        .finish(PROVIDER)
    }

    fn parse_series(body: &Value) -> ProviderResult<Vec<HistoryPoint>> {
        let values = body["values"]
            .as_array()
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少 values"))?;

        let points: Vec<HistoryPoint> = values
            .iter()
            .filter_map(|bar| {
                Some(HistoryPoint {
                    date: parse_date(bar["datetime"].as_str()?)?,
                    price: num(&bar["close"])?,
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

    fn parse_currency(body: &Value, base: &str, quote: &str) -> ProviderResult<CurrencyRate> {
        let rate = num(&body["close"]).ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少汇率"))?;
        let previous = num(&body["previous_close"]).unwrap_or(rate);
        let last_update = body["timestamp"]
            .as_i64()
            .and_then(unix_to_datetime)
            .or_else(|| body["datetime"].as_str().and_then(parse_timestamp))
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少更新时间"))?;

        Ok(CurrencyRate::from_pair(base, quote, rate, previous, last_update, PROVIDER.display_name()))
    }
}

#[async_trait]
impl MarketDataProvider for TwelveDataProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            quote: true,
            history: &[Interval::Daily, Interval::Weekly, Interval::Monthly],
            overview: false,
            news: false,
            currency: true,
            reports_volume: true,
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
        let output_size = Self::output_size(range);
        let body = self
            .get(
                "/time_series",
                &[
                    ("symbol", symbol),
                    ("interval", Self::interval_param(range.interval)),
                    ("outputsize", output_size.as_str()),
                ],
            )
            .await?;
        Self::parse_series(&body)
    }

    async fn get_currency_rate(&self, base: &str, quote: &str) -> ProviderResult<CurrencyRate> {
        let pair = format!("{}/{}", base, quote);
        let body = self.get("/quote", &[("symbol", pair.as_str())]).await?;
        Self::parse_currency(&body, base, quote)
    }
}
