//! 汇率数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Usable;

/// 汇率
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyRate {
    /// 基础货币
    pub base: String,
    /// 报价货币
    pub quote: String,
    pub rate: f64,
    pub change: f64,
    pub change_percent: f64,
    pub last_update: DateTime<Utc>,
    pub source_name: String,
}

impl CurrencyRate {
    /// 根据最新值与前值构造，涨跌由两者计算
    pub fn from_pair(
        base: &str,
        quote: &str,
        rate: f64,
        previous: f64,
        last_update: DateTime<Utc>,
        source_name: &str,
    ) -> Self {
        let change = rate - previous;
        let change_percent = if previous != 0.0 {
            change / previous * 100.0
        } else {
            0.0
        };
        Self {
            base: base.to_string(),
            quote: quote.to_string(),
            rate,
            change,
            change_percent,
            last_update,
            source_name: source_name.to_string(),
        }
    }
}

impl Usable for CurrencyRate {
    fn is_usable(&self) -> bool {
        self.rate.is_finite()
            && self.rate > 0.0
            && self.change.is_finite()
            && self.change_percent.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pair_computes_change() {
        let rate = CurrencyRate::from_pair("USD", "SEK", 10.5, 10.0, Utc::now(), "FRED");
        assert!((rate.change - 0.5).abs() < 1e-9);
        assert!((rate.change_percent - 5.0).abs() < 1e-9);
        assert!(rate.is_usable());
    }
}
