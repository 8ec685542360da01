//! 配置模块
//!
//! 支持从 JSON 文件加载系统配置，再由 `.env` 和环境变量覆盖

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::services::providers::{Operation, ProviderId};

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 工作线程数（0 表示使用 CPU 核心数）
    #[serde(default)]
    pub workers: usize,
}

/// API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// 单个数据源调用超时时间（秒）
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// 连接超时时间（秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// 新闻合并目标条数，凑够即停止请求后续数据源
    #[serde(default = "default_news_target")]
    pub news_target: usize,
    /// 新闻最多返回条数
    #[serde(default = "default_news_max")]
    pub news_max: usize,
    /// NewsAPI 语言过滤，为空时不限制
    #[serde(default)]
    pub news_language: Option<String>,
    /// 涨跌榜每个列表的长度
    #[serde(default = "default_movers_len")]
    pub movers_len: usize,
}

/// 各数据源的 API Key，未配置或为占位符时禁用对应数据源
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeysConfig {
    #[serde(default)]
    pub alpha_vantage: Option<String>,
    #[serde(default)]
    pub finnhub: Option<String>,
    #[serde(default)]
    pub twelve_data: Option<String>,
    #[serde(default)]
    pub marketstack: Option<String>,
    #[serde(default)]
    pub fmp: Option<String>,
    #[serde(default)]
    pub coingecko: Option<String>,
    #[serde(default)]
    pub fred: Option<String>,
    #[serde(default)]
    pub eodhd: Option<String>,
    #[serde(default)]
    pub news_api: Option<String>,
}

/// 缓存配置（秒）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_quote_ttl")]
    pub quote_ttl_secs: u64,
    #[serde(default = "default_history_ttl")]
    pub history_ttl_secs: u64,
    #[serde(default = "default_overview_ttl")]
    pub overview_ttl_secs: u64,
    #[serde(default = "default_news_ttl")]
    pub news_ttl_secs: u64,
    #[serde(default = "default_currency_ttl")]
    pub currency_ttl_secs: u64,
    #[serde(default = "default_auxiliary_ttl")]
    pub auxiliary_ttl_secs: u64,
    /// 最多缓存条目数，超出时淘汰最早写入的条目
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

/// 回退链配置，未配置的操作使用内置顺序
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainsConfig {
    #[serde(default)]
    pub quote: Option<Vec<String>>,
    #[serde(default)]
    pub history: Option<Vec<String>>,
    #[serde(default)]
    pub overview: Option<Vec<String>>,
    #[serde(default)]
    pub news: Option<Vec<String>>,
    #[serde(default)]
    pub currency: Option<Vec<String>>,
}

/// 跨域配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// API 配置
    #[serde(default)]
    pub api: ApiConfig,
    /// 数据源 Key
    #[serde(default)]
    pub keys: KeysConfig,
    /// 缓存配置
    #[serde(default)]
    pub cache: CacheConfig,
    /// 每个数据源相邻两次调用的最小间隔（毫秒），键为数据源标识
    #[serde(default = "default_rate_limits")]
    pub rate_limits: HashMap<String, u64>,
    /// 回退链顺序
    #[serde(default)]
    pub chains: ChainsConfig,
    /// 跨域配置
    #[serde(default)]
    pub cors: CorsConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

// 默认值函数
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 3001 }
fn default_timeout() -> u64 { 10 }
fn default_connect_timeout() -> u64 { 5 }
fn default_news_target() -> usize { 5 }
fn default_news_max() -> usize { 50 }
fn default_movers_len() -> usize { 5 }
fn default_quote_ttl() -> u64 { 60 }
fn default_history_ttl() -> u64 { 3600 }
fn default_overview_ttl() -> u64 { 86400 }
fn default_news_ttl() -> u64 { 1800 }
fn default_currency_ttl() -> u64 { 1800 }
fn default_auxiliary_ttl() -> u64 { 300 }
fn default_max_entries() -> usize { 10_000 }
fn default_allowed_origins() -> Vec<String> { vec!["http://localhost:5173".to_string()] }
fn default_log_level() -> String { "info".to_string() }

/// 免费档位的调用间隔
fn default_rate_limits() -> HashMap<String, u64> {
    [
        ("alpha_vantage", 12_000),
        ("finnhub", 1_000),
        ("twelve_data", 8_000),
        ("marketstack", 1_000),
        ("fmp", 250),
        ("coingecko", 2_000),
        ("eodhd", 250),
        ("news_api", 1_000),
    ]
    .into_iter()
    .map(|(id, ms)| (id.to_string(), ms))
    .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: 0,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            news_target: default_news_target(),
            news_max: default_news_max(),
            news_language: None,
            movers_len: default_movers_len(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            quote_ttl_secs: default_quote_ttl(),
            history_ttl_secs: default_history_ttl(),
            overview_ttl_secs: default_overview_ttl(),
            news_ttl_secs: default_news_ttl(),
            currency_ttl_secs: default_currency_ttl(),
            auxiliary_ttl_secs: default_auxiliary_ttl(),
            max_entries: default_max_entries(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LogConfig {
    /// 解析日志级别，无法识别时使用 info
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.trim().parse().unwrap_or(log::LevelFilter::Info)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            api: ApiConfig::default(),
            keys: KeysConfig::default(),
            cache: CacheConfig::default(),
            rate_limits: default_rate_limits(),
            chains: ChainsConfig::default(),
            cors: CorsConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Key 是否为空或占位符
pub fn usable_key(raw: Option<&str>) -> Option<String> {
    let key = raw?.trim();
    let lower = key.to_ascii_lowercase();
    let placeholder = key.is_empty()
        || lower.starts_with("your_")
        || lower.starts_with("your-")
        || matches!(lower.as_str(), "changeme" | "placeholder" | "demo" | "xxx");
    if placeholder {
        None
    } else {
        Some(key.to_string())
    }
}

impl KeysConfig {
    /// 数据源对应的可用 Key
    pub fn get(&self, id: ProviderId) -> Option<String> {
        let raw = match id {
            ProviderId::AlphaVantage => &self.alpha_vantage,
            ProviderId::Finnhub => &self.finnhub,
            ProviderId::TwelveData => &self.twelve_data,
            ProviderId::Marketstack => &self.marketstack,
            ProviderId::Fmp => &self.fmp,
            ProviderId::CoinGecko => &self.coingecko,
            ProviderId::Fred => &self.fred,
            ProviderId::Eodhd => &self.eodhd,
            ProviderId::NewsApi => &self.news_api,
            ProviderId::Yahoo => return None,
        };
        usable_key(raw.as_deref())
    }

    fn slot_mut(&mut self, id: ProviderId) -> Option<&mut Option<String>> {
        match id {
            ProviderId::AlphaVantage => Some(&mut self.alpha_vantage),
            ProviderId::Finnhub => Some(&mut self.finnhub),
            ProviderId::TwelveData => Some(&mut self.twelve_data),
            ProviderId::Marketstack => Some(&mut self.marketstack),
            ProviderId::Fmp => Some(&mut self.fmp),
            ProviderId::CoinGecko => Some(&mut self.coingecko),
            ProviderId::Fred => Some(&mut self.fred),
            ProviderId::Eodhd => Some(&mut self.eodhd),
            ProviderId::NewsApi => Some(&mut self.news_api),
            ProviderId::Yahoo => None,
        }
    }
}

/// Key 对应的环境变量名
fn key_env_var(id: ProviderId) -> Option<&'static str> {
    match id {
        ProviderId::AlphaVantage => Some("ALPHA_VANTAGE_API_KEY"),
        ProviderId::Finnhub => Some("FINNHUB_API_KEY"),
        ProviderId::TwelveData => Some("TWELVE_DATA_API_KEY"),
        ProviderId::Marketstack => Some("MARKETSTACK_API_KEY"),
        ProviderId::Fmp => Some("FMP_API_KEY"),
        ProviderId::CoinGecko => Some("COINGECKO_API_KEY"),
        ProviderId::Fred => Some("FRED_API_KEY"),
        ProviderId::Eodhd => Some("EODHD_API_KEY"),
        ProviderId::NewsApi => Some("NEWS_API_KEY"),
        ProviderId::Yahoo => None,
    }
}

impl ChainsConfig {
    /// 配置中的链顺序，未知标识记录警告后忽略
    pub fn get(&self, operation: Operation) -> Option<Vec<ProviderId>> {
        let names = match operation {
            Operation::Quote => &self.quote,
            Operation::History => &self.history,
            Operation::Overview => &self.overview,
            Operation::News => &self.news,
            Operation::Currency => &self.currency,
        };

        names.as_ref().map(|names| {
            names
                .iter()
                .filter_map(|name| match name.parse::<ProviderId>() {
                    Ok(id) => Some(id),
                    Err(e) => {
                        log::warn!("{} 链配置忽略: {}", operation, e);
                        None
                    }
                })
                .collect()
        })
    }
}

impl AppConfig {
    /// 从 JSON 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 加载配置，优先从文件，失败则使用默认值，最后应用环境变量
    pub fn load() -> Self {
        let config_paths = ["config.json", "config/config.json"];

        let mut config = None;
        for path in config_paths {
            if Path::new(path).exists() {
                match Self::from_file(path) {
                    Ok(loaded) => {
                        log::info!("从 {} 加载配置成功", path);
                        config = Some(loaded);
                        break;
                    }
                    Err(e) => {
                        log::warn!("加载配置文件 {} 失败: {}", path, e);
                    }
                }
            }
        }

        let mut config = config.unwrap_or_else(|| {
            log::info!("使用默认配置");
            Self::default()
        });
        config.apply_env(|name| env::var(name).ok());
        config
    }

    /// 用环境变量覆盖文件配置
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            match port.trim().parse() {
                Ok(port) => self.server.port = port,
                Err(_) => log::warn!("PORT 环境变量无效: {}", port),
            }
        }
        if let Some(level) = lookup("LOG_LEVEL").filter(|l| !l.trim().is_empty()) {
            self.log.level = level;
        }

        for id in ProviderId::ALL {
            let (Some(var), Some(slot)) = (key_env_var(id), self.keys.slot_mut(id)) else {
                continue;
            };
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                *slot = Some(value);
            }
        }
    }

    /// 数据源最小调用间隔
    pub fn rate_limit(&self, id: ProviderId) -> Duration {
        Duration::from_millis(self.rate_limits.get(id.as_str()).copied().unwrap_or(0))
    }

    /// 获取服务器绑定地址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
