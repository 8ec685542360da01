//! 新闻数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Usable;

/// 新闻条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsArticle {
    /// 由链接和发布时间拼成，同一篇报道在不同数据源之间保持一致
    pub id: String,
    pub title: String,
    pub summary: Option<String>,
    pub url: String,
    /// 发布媒体
    pub source_label: String,
    pub published_at: DateTime<Utc>,
    /// 抓取该新闻的数据源
    pub provider_tag: String,
    /// 情绪标签（仅部分数据源提供）
    pub sentiment: Option<String>,
}

impl NewsArticle {
    pub fn new(
        title: impl Into<String>,
        summary: Option<String>,
        url: impl Into<String>,
        source_label: impl Into<String>,
        published_at: DateTime<Utc>,
        provider_tag: impl Into<String>,
    ) -> Self {
        let url = url.into();
        Self {
            id: format!("{}#{}", url, published_at.timestamp()),
            title: title.into(),
            summary: summary.filter(|s| !s.trim().is_empty()),
            url,
            source_label: source_label.into(),
            published_at,
            provider_tag: provider_tag.into(),
            sentiment: None,
        }
    }

    pub fn with_sentiment(mut self, sentiment: Option<String>) -> Self {
        self.sentiment = sentiment.filter(|s| !s.trim().is_empty());
        self
    }
}

impl Usable for NewsArticle {
    fn is_usable(&self) -> bool {
        !self.title.trim().is_empty() && self.url.starts_with("http")
    }
}

/// 新闻查询参数
#[derive(Debug, Deserialize)]
pub struct NewsQuery {
    /// 搜索关键字
    pub q: Option<String>,
}
