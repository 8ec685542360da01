//! 辅助透传接口
//!
//! `/api/{fmp,coingecko,fred,eodhd}/{path}` 把路径和查询参数转发给对应数据源，
//! 由服务端附加 API Key，返回上游 JSON。不经过回退链

use std::collections::HashMap;

use reqwest::Client;

use crate::config::AppConfig;
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::providers::{
    fetch_json, mask_secret, ProviderError, ProviderId, RateGate, COINGECKO_API, EODHD_API, FMP_API, FRED_API,
};

/// 支持透传的数据源
pub const PASSTHROUGH_PROVIDERS: [ProviderId; 4] =
    [ProviderId::Fmp, ProviderId::CoinGecko, ProviderId::Fred, ProviderId::Eodhd];

/// 单个数据源的转发规则
struct Target {
    base: &'static str,
    key_param: &'static str,
    key_required: bool,
    /// 固定附加的参数
    extra: &'static [(&'static str, &'static str)],
}

fn target(provider: ProviderId) -> Option<Target> {
    let target = match provider {
        ProviderId::Fmp => Target {
            base: FMP_API,
            key_param: "apikey",
            key_required: true,
            extra: &[],
        },
        ProviderId::CoinGecko => Target {
            base: COINGECKO_API,
            key_param: "x_cg_demo_api_key",
            key_required: false,
            extra: &[],
        },
        ProviderId::Fred => Target {
            base: FRED_API,
            key_param: "api_key",
            key_required: true,
            extra: &[("file_type", "json")],
        },
        ProviderId::Eodhd => Target {
            base: EODHD_API,
            key_param: "api_token",
            key_required: true,
            extra: &[("fmt", "json")],
        },
        _ => return None,
    };
    Some(target)
}

/// 校验透传路径：不允许 `..`，只允许字母、数字和 `/_.-`
pub fn validate_path(path: &str) -> ServiceResult<&str> {
    let path = path.trim_start_matches('/');
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '.' | '-');

    if path.is_empty() || path.contains("..") || !path.chars().all(allowed) {
        return Err(ServiceError::BadRequest(format!("无效的路径: {}", path)));
    }
    Ok(path)
}

/// 透传服务
pub struct PassthroughService {
    client: Client,
    keys: HashMap<ProviderId, String>,
    gates: HashMap<ProviderId, RateGate>,
}

impl PassthroughService {
    pub fn new(client: Client, keys: HashMap<ProviderId, String>, gates: HashMap<ProviderId, RateGate>) -> Self {
        Self { client, keys, gates }
    }

    /// `gates` 与注册表中的适配器共用，透传调用同样占用数据源的调用间隔
    pub fn from_config(client: Client, config: &AppConfig, gates: &HashMap<ProviderId, RateGate>) -> Self {
        let keys = PASSTHROUGH_PROVIDERS
            .iter()
            .filter_map(|id| config.keys.get(*id).map(|key| (*id, key)))
            .collect();
        let gates = PASSTHROUGH_PROVIDERS
            .iter()
            .filter_map(|id| gates.get(id).map(|gate| (*id, gate.clone())))
            .collect();
        Self::new(client, keys, gates)
    }

    /// 转发请求，返回上游 JSON 文本
    ///
    /// 调用方传入的同名 Key 参数会被服务端的 Key 替换
    pub async fn forward(&self, provider: ProviderId, path: &str, query: &[(String, String)]) -> ServiceResult<String> {
        let target = target(provider)
            .ok_or_else(|| ServiceError::BadRequest(format!("{} 不支持透传", provider.display_name())))?;
        let path = validate_path(path)?;
        let key = self.keys.get(&provider).map(String::as_str);

        if target.key_required && key.is_none() {
            return Err(ServiceError::Unavailable(format!(
                "{} 未配置 API Key，该接口不可用",
                provider.display_name()
            )));
        }

        let url = format!("{}/{}", target.base, path);
        let mut params: Vec<(&str, &str)> = query
            .iter()
            .filter(|(name, _)| name != target.key_param && !target.extra.iter().any(|(n, _)| n == name))
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        params.extend_from_slice(target.extra);
        if let Some(key) = key {
            params.push((target.key_param, key));
        }

        if let Some(gate) = self.gates.get(&provider) {
            gate.acquire(provider).await.map_err(|e| map_error(e, key))?;
        }

        let body = fetch_json(&self.client, provider, &url, &params, key)
            .await
            .map_err(|e| map_error(e, key))?;
        Ok(serde_json::to_string(&body)?)
    }
}

fn map_error(error: ProviderError, key: Option<&str>) -> ServiceError {
    let message = mask_secret(&error.to_string(), key);
    match error {
        ProviderError::NoData { .. } => {
            log::warn!("透传请求无数据: {}", message);
            ServiceError::NotFound(message)
        }
        ProviderError::Unavailable { .. } | ProviderError::RateLimited { .. } => {
            log::warn!("透传请求暂不可用: {}", message);
            ServiceError::Unavailable(message)
        }
        _ => {
            log::error!("透传请求失败: {}", message);
            ServiceError::BadGateway(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::services::providers::fmp::FmpProvider;
    use crate::services::providers::MarketDataProvider;

    fn service() -> PassthroughService {
        PassthroughService::new(Client::new(), HashMap::new(), HashMap::new())
    }

    #[test]
    fn test_validate_path() {
        assert_eq!(validate_path("v3/quote/AAPL").unwrap(), "v3/quote/AAPL");
        assert_eq!(validate_path("/coins/bitcoin").unwrap(), "coins/bitcoin");
        assert_eq!(validate_path("series/observations").unwrap(), "series/observations");
        assert_eq!(validate_path("real-time/EURUSD.FOREX").unwrap(), "real-time/EURUSD.FOREX");

        for bad in ["", "../etc/passwd", "v3/../../x", "v3/quote?x=1", "v3/quote/%2e%2e", "a b", "http://evil"] {
            assert!(
                matches!(validate_path(bad), Err(ServiceError::BadRequest(_))),
                "{} 应被拒绝",
                bad
            );
        }
    }

    #[test]
    fn test_targets() {
        for id in PASSTHROUGH_PROVIDERS {
            assert!(target(id).is_some());
        }
        assert!(target(ProviderId::Yahoo).is_none());
        assert!(!target(ProviderId::CoinGecko).unwrap().key_required);
        assert_eq!(target(ProviderId::Fred).unwrap().extra, &[("file_type", "json")]);
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let err = service().forward(ProviderId::Fmp, "v3/quote/AAPL", &[]).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));

        let err = service().forward(ProviderId::Fred, "series/observations", &[]).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_bad_path_rejected_before_key_check() {
        let err = service().forward(ProviderId::Fmp, "../secret", &[]).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_unsupported_provider() {
        let err = service().forward(ProviderId::Yahoo, "v8/finance/chart/AAPL", &[]).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_shares_gate_with_adapter() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "keys": { "fmp": "k" }, "rate_limits": { "fmp": 60000 } }"#,
        )
        .unwrap();
        let gates = crate::services::registry::rate_gates(&config);
        let service = PassthroughService::from_config(Client::new(), &config, &gates);
        let adapter = FmpProvider::new(Client::new(), config.keys.get(ProviderId::Fmp), gates[&ProviderId::Fmp].clone());

        // 透传占用 FMP 的时段后，适配器的下一次调用需排队 60 秒，立即被限速
        service.gates[&ProviderId::Fmp].acquire(ProviderId::Fmp).await.unwrap();
        let start = std::time::Instant::now();
        let result = adapter.get_quote("AAPL").await;
        assert!(matches!(result, Err(ProviderError::RateLimited { provider: ProviderId::Fmp })));

        // 反过来，透传也会因同一时段被占用而返回 503，不发出请求
        let err = service.forward(ProviderId::Fmp, "v3/quote/AAPL", &[]).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
