//! 数据源注册表
//!
//! 持有所有适配器实例和每个操作的回退链顺序。
//! 启动时由配置构建一次，测试中可直接注入模拟适配器

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::config::AppConfig;
use crate::services::providers::{
    alpha_vantage::AlphaVantageProvider, coingecko::CoinGeckoProvider, eodhd::EodhdProvider,
    finnhub::FinnhubProvider, fmp::FmpProvider, fred::FredProvider, marketstack::MarketstackProvider,
    news_api::NewsApiProvider, twelve_data::TwelveDataProvider, yahoo::YahooProvider, MarketDataProvider,
    Operation, ProviderId, RateGate,
};

use ProviderId::*;

/// 内置回退链顺序：付费/高质量数据源在前，免费数据源在后
pub fn default_chain(operation: Operation) -> Vec<ProviderId> {
    match operation {
        Operation::Quote => vec![AlphaVantage, Finnhub, TwelveData, Fmp, Eodhd, Marketstack, Yahoo, CoinGecko],
        Operation::History => vec![AlphaVantage, TwelveData, Eodhd, Fmp, Finnhub, Marketstack, Yahoo, CoinGecko],
        Operation::Overview => vec![AlphaVantage, Fmp, Eodhd, Finnhub],
        Operation::News => vec![NewsApi, AlphaVantage, Finnhub, Fmp, Eodhd, Yahoo],
        Operation::Currency => vec![AlphaVantage, TwelveData, Fmp, Eodhd, Yahoo, Fred],
    }
}

/// 每个数据源一个限速闸门，适配器与透传接口共享
///
/// 排队上限取请求超时的一半，保证预约成功后仍有时间完成请求
pub fn rate_gates(config: &AppConfig) -> HashMap<ProviderId, RateGate> {
    let max_wait = Duration::from_secs(config.api.timeout_secs) / 2;
    ProviderId::ALL
        .iter()
        .map(|id| (*id, RateGate::new(config.rate_limit(*id), max_wait)))
        .collect()
}

const OPERATIONS: [Operation; 5] = [
    Operation::Quote,
    Operation::History,
    Operation::Overview,
    Operation::News,
    Operation::Currency,
];

/// 数据源注册表
pub struct ProviderRegistry {
    providers: HashMap<ProviderId, Arc<dyn MarketDataProvider>>,
    chains: HashMap<Operation, Vec<ProviderId>>,
}

impl ProviderRegistry {
    /// 使用给定适配器和内置链顺序
    pub fn new(providers: Vec<Arc<dyn MarketDataProvider>>) -> Self {
        let chains = OPERATIONS.iter().map(|op| (*op, default_chain(*op))).collect();
        Self::with_chains(providers, chains)
    }

    pub fn with_chains(
        providers: Vec<Arc<dyn MarketDataProvider>>,
        chains: HashMap<Operation, Vec<ProviderId>>,
    ) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.id(), p)).collect(),
            chains,
        }
    }

    /// 根据配置创建全部适配器，共用同一个 HTTP 客户端和限速闸门
    pub fn from_config(config: &AppConfig, client: &Client, gates: &HashMap<ProviderId, RateGate>) -> Self {
        let key = |id: ProviderId| config.keys.get(id);
        let gate = |id: ProviderId| gates.get(&id).cloned().unwrap_or_else(RateGate::unlimited);

        let providers: Vec<Arc<dyn MarketDataProvider>> = vec![
            Arc::new(AlphaVantageProvider::new(client.clone(), key(AlphaVantage), gate(AlphaVantage))),
            Arc::new(YahooProvider::new(client.clone(), gate(Yahoo))),
            Arc::new(FinnhubProvider::new(client.clone(), key(Finnhub), gate(Finnhub))),
            Arc::new(TwelveDataProvider::new(client.clone(), key(TwelveData), gate(TwelveData))),
            Arc::new(MarketstackProvider::new(client.clone(), key(Marketstack), gate(Marketstack))),
            Arc::new(FmpProvider::new(client.clone(), key(Fmp), gate(Fmp))),
            Arc::new(CoinGeckoProvider::new(client.clone(), key(CoinGecko), gate(CoinGecko))),
            Arc::new(FredProvider::new(client.clone(), key(Fred), gate(Fred))),
            Arc::new(EodhdProvider::new(client.clone(), key(Eodhd), gate(Eodhd))),
            Arc::new(NewsApiProvider::new(
                client.clone(),
                key(NewsApi),
                config.api.news_language.clone(),
                gate(NewsApi),
            )),
        ];

        let chains = OPERATIONS
            .iter()
            .map(|op| {
                let chain = config.chains.get(*op).unwrap_or_else(|| default_chain(*op));
                (*op, chain)
            })
            .collect();

        let registry = Self::with_chains(providers, chains);
        registry.log_summary();
        registry
    }

    /// 操作对应的有序适配器列表
    pub fn chain(&self, operation: Operation) -> Vec<Arc<dyn MarketDataProvider>> {
        self.chains
            .get(&operation)
            .map(|ids| ids.iter().filter_map(|id| self.providers.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, id: ProviderId) -> Option<Arc<dyn MarketDataProvider>> {
        self.providers.get(&id).cloned()
    }

    fn log_summary(&self) {
        let mut ids: Vec<_> = self.providers.keys().copied().collect();
        ids.sort();
        for id in ids {
            if let Some(provider) = self.providers.get(&id) {
                let status = if provider.is_available() { "已启用" } else { "未配置 Key" };
                log::info!("数据源 {}: {}", provider.name(), status);
            }
        }
        for op in OPERATIONS {
            let names: Vec<&str> = self.chain(op).iter().map(|p| p.id().as_str()).collect();
            log::info!("{} 回退链: {}", op, names.join(" -> "));
        }
    }
}
