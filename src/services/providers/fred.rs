//! FRED 适配器
//!
//! 美联储 H.10 日度汇率序列（DEX*），只覆盖美元相关货币对。
//! 序列方向固定，反方向的货币对取倒数；缺失值以 "." 表示

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::common::{fetch_json, num, parse_timestamp, require_key, text, FRED_API};
use super::{Capabilities, MarketDataProvider, ProviderError, ProviderId, ProviderResult, RateGate};
use crate::models::CurrencyRate;

const PROVIDER: ProviderId = ProviderId::Fred;

/// (序列, 基础货币, 计价货币)：序列值表示 1 单位基础货币兑换的计价货币
const SERIES: &[(&str, &str, &str)] = &[
    ("DEXUSEU", "EUR", "USD"),
    ("DEXUSUK", "GBP", "USD"),
    ("DEXUSAL", "AUD", "USD"),
    ("DEXUSNZ", "NZD", "USD"),
    ("DEXJPUS", "USD", "JPY"),
    ("DEXCAUS", "USD", "CAD"),
    ("DEXSZUS", "USD", "CHF"),
    ("DEXCHUS", "USD", "CNY"),
    ("DEXHKUS", "USD", "HKD"),
    ("DEXINUS", "USD", "INR"),
    ("DEXKOUS", "USD", "KRW"),
    ("DEXMXUS", "USD", "MXN"),
    ("DEXBZUS", "USD", "BRL"),
    ("DEXSDUS", "USD", "SEK"),
    ("DEXNOUS", "USD", "NOK"),
    ("DEXDNUS", "USD", "DKK"),
    ("DEXSIUS", "USD", "SGD"),
    ("DEXSFUS", "USD", "ZAR"),
];

/// FRED 数据源
pub struct FredProvider {
    client: Client,
    api_key: Option<String>,
    gate: RateGate,
}

impl FredProvider {
    pub fn new(client: Client, api_key: Option<String>, gate: RateGate) -> Self {
        Self {
            client,
            api_key,
            gate,
        }
    }

    /// 查找货币对对应的序列，第二个值表示是否需要取倒数
    pub fn series_for(base: &str, quote: &str) -> Option<(&'static str, bool)> {
        SERIES.iter().find_map(|(series, b, q)| {
            if b.eq_ignore_ascii_case(base) && q.eq_ignore_ascii_case(quote) {
                Some((*series, false))
            } else if b.eq_ignore_ascii_case(quote) && q.eq_ignore_ascii_case(base) {
                Some((*series, true))
            } else {
                None
            }
        })
    }

    fn parse_observations(
        body: &Value,
        base: &str,
        quote: &str,
        inverse: bool,
    ) -> ProviderResult<CurrencyRate> {
        let observations = body["observations"]
            .as_array()
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少 observations"))?;

        // 按日期倒序请求，跳过 "." 缺失值
        let mut valid = observations
            .iter()
            .filter_map(|obs| Some((text(&obs["date"])?, num(&obs["value"]).filter(|v| *v > 0.0)?)));

        let (date, latest) = valid
            .next()
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "无有效观测值"))?;
        let previous = valid.next().map(|(_, v)| v).unwrap_or(latest);

        let last_update =
            parse_timestamp(&date).ok_or_else(|| ProviderError::no_data(PROVIDER, "日期格式异常"))?;

        let (rate, previous) = if inverse {
            (1.0 / latest, 1.0 / previous)
        } else {
            (latest, previous)
        };
        Ok(CurrencyRate::from_pair(base, quote, rate, previous, last_update, PROVIDER.display_name()))
    }
}

#[async_trait]
impl MarketDataProvider for FredProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            currency: true,
            ..Default::default()
        }
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get_currency_rate(&self, base: &str, quote: &str) -> ProviderResult<CurrencyRate> {
        let (series, inverse) = Self::series_for(base, quote)
            .ok_or_else(|| ProviderError::no_data(PROVIDER, format!("无 {}/{} 序列", base, quote)))?;
        let key = require_key(&self.api_key, PROVIDER)?;
        self.gate.acquire(PROVIDER).await?;

        let url = format!("{}/series/observations", FRED_API);
        let body = fetch_json(
            &self.client,
            PROVIDER,
            &url,
            &[
                ("series_id", series),
                ("api_key", key),
                ("file_type", "json"),
                ("sort_order", "desc"),
                ("limit", "10"),
            ],
            Some(key),
        )
        .await?;
        Self::parse_observations(&body, base, quote, inverse)
    }
}
