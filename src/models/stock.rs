//! 股票数据模型
//!
//! 定义与数据源无关的规范化行情结构：实时报价、历史价格、公司概况、涨跌榜

use std::fmt;
use std::str::FromStr;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use super::Usable;

/// 实时报价
///
/// 所有字段必须完整，缺任何一个价格字段整条记录视为无效
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// 最新价
    pub price: f64,
    /// 涨跌额
    pub change: f64,
    /// 涨跌幅（百分比）
    pub change_percent: f64,
    /// 成交量，数据源未提供且补全失败时为 null
    pub volume: Option<u64>,
    /// 昨收
    pub prev_close: f64,
    /// 开盘价
    pub open: f64,
    /// 最高价
    pub day_high: f64,
    /// 最低价
    pub day_low: f64,
    /// 最近交易日
    pub last_trading_day: NaiveDate,
    /// 数据来源
    pub source_name: String,
}

impl Usable for Quote {
    fn is_usable(&self) -> bool {
        self.price.is_finite()
            && self.price > 0.0
            && [
                self.change,
                self.change_percent,
                self.prev_close,
                self.open,
                self.day_high,
                self.day_low,
            ]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// 历史价格点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    /// 日期
    pub date: NaiveDate,
    /// 价格（优先使用复权收盘价）
    pub price: f64,
    /// 成交量
    pub volume: Option<u64>,
    /// 数据来源
    pub source_name: String,
}

impl Usable for HistoryPoint {
    fn is_usable(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// 历史数据时间跨度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    TwoYears,
    FiveYears,
    Max,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneMonth => "1mo",
            Period::ThreeMonths => "3mo",
            Period::SixMonths => "6mo",
            Period::OneYear => "1y",
            Period::TwoYears => "2y",
            Period::FiveYears => "5y",
            Period::Max => "max",
        }
    }

    /// 跨度对应的月数，`max` 没有上限
    pub fn months(&self) -> Option<u32> {
        match self {
            Period::OneMonth => Some(1),
            Period::ThreeMonths => Some(3),
            Period::SixMonths => Some(6),
            Period::OneYear => Some(12),
            Period::TwoYears => Some(24),
            Period::FiveYears => Some(60),
            Period::Max => None,
        }
    }

    /// 窗口起始日期（包含）
    pub fn start_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        self.months()
            .and_then(|m| today.checked_sub_months(Months::new(m)))
    }

    /// 近似天数，供按天数取数的接口使用
    pub fn approx_days(&self) -> Option<u32> {
        self.months().map(|m| m * 31)
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1mo" => Ok(Period::OneMonth),
            "3mo" => Ok(Period::ThreeMonths),
            "6mo" => Ok(Period::SixMonths),
            "1y" => Ok(Period::OneYear),
            "2y" => Ok(Period::TwoYears),
            "5y" => Ok(Period::FiveYears),
            "max" => Ok(Period::Max),
            other => Err(format!("不支持的 period: {}", other)),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// K线周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Daily,
    Weekly,
    Monthly,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "1d",
            Interval::Weekly => "1wk",
            Interval::Monthly => "1mo",
        }
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1d" => Ok(Interval::Daily),
            "1wk" => Ok(Interval::Weekly),
            "1mo" => Ok(Interval::Monthly),
            other => Err(format!("不支持的 interval: {}", other)),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 历史数据请求窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HistoryRange {
    pub period: Period,
    pub interval: Interval,
}

impl Default for HistoryRange {
    fn default() -> Self {
        Self {
            period: Period::ThreeMonths,
            interval: Interval::Daily,
        }
    }
}

/// 历史数据查询参数
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// 时间跨度（1mo/3mo/6mo/1y/2y/5y/max）
    pub period: Option<String>,
    /// K线周期（1d/1wk/1mo）
    pub interval: Option<String>,
}

impl HistoryQuery {
    /// 解析为请求窗口，缺省为 3mo / 1d
    pub fn to_range(&self) -> Result<HistoryRange, String> {
        let defaults = HistoryRange::default();
        let period = match self.period.as_deref() {
            Some(p) if !p.trim().is_empty() => p.parse()?,
            _ => defaults.period,
        };
        let interval = match self.interval.as_deref() {
            Some(i) if !i.trim().is_empty() => i.parse()?,
            _ => defaults.interval,
        };
        Ok(HistoryRange { period, interval })
    }
}

/// 公司概况
///
/// 低精度数据源无法提供的数值字段保持 null，不做推算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyOverview {
    /// 股票代码
    pub symbol: String,
    /// 公司名称
    pub name: String,
    /// 公司简介
    pub description: Option<String>,
    /// 行业板块
    pub sector: Option<String>,
    /// 细分行业
    pub industry: Option<String>,
    /// 市值（货币单位）
    pub market_cap: Option<u64>,
    /// 市盈率
    pub pe_ratio: Option<f64>,
    /// 股息率（百分比，0-100）
    pub dividend_yield: Option<f64>,
    /// 52周最高
    pub fifty_two_week_high: Option<f64>,
    /// 52周最低
    pub fifty_two_week_low: Option<f64>,
    /// Logo 地址
    pub logo: Option<String>,
    /// 官网
    pub website: Option<String>,
    /// 数据来源
    pub source_name: String,
}

impl Usable for CompanyOverview {
    fn is_usable(&self) -> bool {
        !self.name.trim().is_empty() && !self.symbol.trim().is_empty()
    }
}

/// 涨跌榜请求中的单只股票，既可以是对象也可以是纯代码字符串
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StockRef {
    Detailed {
        ticker: String,
        #[serde(default)]
        name: Option<String>,
    },
    Ticker(String),
}

impl StockRef {
    pub fn ticker(&self) -> &str {
        match self {
            StockRef::Detailed { ticker, .. } => ticker,
            StockRef::Ticker(ticker) => ticker,
        }
    }

    /// 显示名称，未提供时回退为代码
    pub fn name(&self) -> &str {
        match self {
            StockRef::Detailed {
                name: Some(name), ..
            } if !name.trim().is_empty() => name,
            _ => self.ticker(),
        }
    }
}

/// 涨跌榜请求体
#[derive(Debug, Deserialize)]
pub struct TopMoversRequest {
    #[serde(default)]
    pub stocks: Vec<StockRef>,
}

/// 涨跌榜条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoverEntry {
    pub ticker: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: Option<u64>,
    pub source_name: String,
}

/// 涨跌榜
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopMovers {
    pub gainers: Vec<MoverEntry>,
    pub losers: Vec<MoverEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_quote() -> Quote {
        Quote {
            price: 101.5,
            change: 1.5,
            change_percent: 1.5,
            volume: None,
            prev_close: 100.0,
            open: 100.2,
            day_high: 102.0,
            day_low: 99.8,
            last_trading_day: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
            source_name: "Test".to_string(),
        }
    }

    #[test]
    fn test_quote_usable() {
        let quote = sample_quote();
        assert!(quote.is_usable());

        let mut bad = quote.clone();
        bad.price = f64::NAN;
        assert!(!bad.is_usable());

        let mut zero = quote;
        zero.price = 0.0;
        assert!(!zero.is_usable());
    }

    #[test]
    fn test_quote_serializes_camel_case() {
        let value = serde_json::to_value(sample_quote()).unwrap();
        assert_eq!(value["changePercent"], 1.5);
        assert_eq!(value["prevClose"], 100.0);
        assert_eq!(value["lastTradingDay"], "2024-05-03");
        assert!(value["volume"].is_null());
    }

    #[test]
    fn test_history_query_defaults_and_errors() {
        let query = HistoryQuery {
            period: None,
            interval: None,
        };
        assert_eq!(query.to_range().unwrap(), HistoryRange::default());

        let query = HistoryQuery {
            period: Some("1y".to_string()),
            interval: Some("1wk".to_string()),
        };
        let range = query.to_range().unwrap();
        assert_eq!(range.period, Period::OneYear);
        assert_eq!(range.interval, Interval::Weekly);

        let query = HistoryQuery {
            period: Some("10y".to_string()),
            interval: None,
        };
        assert!(query.to_range().is_err());
    }

    #[test]
    fn test_period_start_date() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(
            Period::OneMonth.start_date(today),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(
            Period::OneYear.start_date(today),
            NaiveDate::from_ymd_opt(2023, 3, 31)
        );
        assert_eq!(Period::Max.start_date(today), None);
    }

    #[test]
    fn test_stock_ref_accepts_objects_and_strings() {
        let req: TopMoversRequest = serde_json::from_value(serde_json::json!({
            "stocks": [{"ticker": "AAPL", "name": "Apple"}, "MSFT", {"ticker": "TSLA"}]
        }))
        .unwrap();

        assert_eq!(req.stocks.len(), 3);
        assert_eq!(req.stocks[0].name(), "Apple");
        assert_eq!(req.stocks[1].ticker(), "MSFT");
        assert_eq!(req.stocks[1].name(), "MSFT");
        assert_eq!(req.stocks[2].name(), "TSLA");
    }
}
