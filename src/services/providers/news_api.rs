//! NewsAPI 适配器（/v2/everything 全文检索，按发布时间倒序）

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::common::{fetch_json, parse_timestamp, require_key, text, NEWS_API};
use super::{Capabilities, MarketDataProvider, ProviderError, ProviderId, ProviderResult, RateGate};
use crate::models::NewsArticle;

const PROVIDER: ProviderId = ProviderId::NewsApi;
const PAGE_SIZE: &str = "20";

/// NewsAPI 数据源
pub struct NewsApiProvider {
    client: Client,
    api_key: Option<String>,
    /// 结果语言过滤（如 "en"、"sv"），为空时不限制
    language: Option<String>,
    gate: RateGate,
}

impl NewsApiProvider {
    pub fn new(client: Client, api_key: Option<String>, language: Option<String>, gate: RateGate) -> Self {
        Self {
            client,
            api_key,
            language,
            gate,
        }
    }

    fn parse_articles(body: &Value) -> ProviderResult<Vec<NewsArticle>> {
        if body["status"].as_str() == Some("error") {
            let message = text(&body["message"]).unwrap_or_else(|| "未知错误".to_string());
            return Err(match text(&body["code"]).as_deref() {
                Some("rateLimited") => ProviderError::RateLimited { provider: PROVIDER },
                _ => ProviderError::no_data(PROVIDER, message),
            });
        }

        let articles = body["articles"]
            .as_array()
            .ok_or_else(|| ProviderError::no_data(PROVIDER, "缺少 articles"))?;

        Ok(articles
            .iter()
            .filter_map(|item| {
                let title = text(&item["title"])?;
                // 被删除的文章标题为 "[Removed]"
                if title == "[Removed]" {
                    return None;
                }
                let url = text(&item["url"])?;
                let published_at = item["publishedAt"].as_str().and_then(parse_timestamp)?;
                let source = text(&item["source"]["name"]).unwrap_or_else(|| PROVIDER.display_name().to_string());
                Some(NewsArticle::new(
                    title,
                    text(&item["description"]),
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
impl MarketDataProvider for NewsApiProvider {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            news: true,
            ..Default::default()
        }
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get_news(&self, query: &str) -> ProviderResult<Vec<NewsArticle>> {
        let key = require_key(&self.api_key, PROVIDER)?;
        self.gate.acquire(PROVIDER).await?;

        let mut params = vec![
            ("q", query.trim()),
            ("sortBy", "publishedAt"),
            ("pageSize", PAGE_SIZE),
            ("apiKey", key),
        ];
        if let Some(language) = self.language.as_deref() {
            params.push(("language", language));
        }

        let body = fetch_json(&self.client, PROVIDER, NEWS_API, &params, Some(key)).await?;
        Self::parse_articles(&body)
    }
}
