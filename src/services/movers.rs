//! 涨跌榜
//!
//! 对一组股票的报价按涨跌幅分组排序

use std::cmp::Ordering;

use crate::models::{MoverEntry, Quote, StockRef, TopMovers};

/// 由报价生成榜单条目
pub fn mover_entry(stock: &StockRef, ticker: &str, quote: &Quote) -> MoverEntry {
    MoverEntry {
        ticker: ticker.to_string(),
        name: stock.name().to_string(),
        price: quote.price,
        change: quote.change,
        change_percent: quote.change_percent,
        volume: quote.volume,
        source_name: quote.source_name.clone(),
    }
}

/// 涨幅 > 0 的按涨幅降序，跌幅 < 0 的按跌幅升序（跌得最多的在前），各取前 `len` 条
///
/// 涨跌幅为 0 或非有限值的条目不进入任何一边
pub fn rank_movers(entries: Vec<MoverEntry>, len: usize) -> TopMovers {
    let (mut gainers, mut losers): (Vec<MoverEntry>, Vec<MoverEntry>) = entries
        .into_iter()
        .filter(|e| e.change_percent.is_finite() && e.change_percent != 0.0)
        .partition(|e| e.change_percent > 0.0);

    gainers.sort_by(|a, b| b.change_percent.partial_cmp(&a.change_percent).unwrap_or(Ordering::Equal));
    losers.sort_by(|a, b| a.change_percent.partial_cmp(&b.change_percent).unwrap_or(Ordering::Equal));
    gainers.truncate(len);
    losers.truncate(len);

    TopMovers { gainers, losers }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ticker: &str, change_percent: f64) -> MoverEntry {
        MoverEntry {
            ticker: ticker.to_string(),
            name: ticker.to_string(),
            price: 100.0,
            change: change_percent,
            change_percent,
            volume: None,
            source_name: "Mock".to_string(),
        }
    }

    fn tickers(entries: &[MoverEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.ticker.as_str()).collect()
    }

    #[test]
    fn test_partition_and_order() {
        let movers = rank_movers(
            vec![
                entry("A", 1.2),
                entry("B", -3.4),
                entry("C", 0.0),
                entry("D", 5.0),
                entry("E", -0.5),
            ],
            5,
        );
        assert_eq!(tickers(&movers.gainers), vec!["D", "A"]);
        assert_eq!(tickers(&movers.losers), vec!["B", "E"]);
    }

    #[test]
    fn test_truncate_to_len() {
        let entries: Vec<MoverEntry> = (1..=8)
            .flat_map(|i| vec![entry(&format!("G{}", i), i as f64), entry(&format!("L{}", i), -(i as f64))])
            .collect();
        let movers = rank_movers(entries, 5);

        assert_eq!(movers.gainers.len(), 5);
        assert_eq!(movers.losers.len(), 5);
        assert_eq!(movers.gainers[0].ticker, "G8");
        assert_eq!(movers.losers[0].ticker, "L8");
        assert!(movers.gainers.windows(2).all(|w| w[0].change_percent >= w[1].change_percent));
        assert!(movers.losers.windows(2).all(|w| w[0].change_percent <= w[1].change_percent));
    }

    #[test]
    fn test_empty_and_non_finite() {
        assert_eq!(rank_movers(Vec::new(), 5), TopMovers::default());

        let movers = rank_movers(vec![entry("X", f64::NAN), entry("Y", 0.0)], 5);
        assert!(movers.gainers.is_empty());
        assert!(movers.losers.is_empty());
    }

    #[test]
    fn test_entry_uses_display_name() {
        let stock: StockRef = serde_json::from_str(r#"{"ticker":"aapl","name":"Apple"}"#).unwrap();
        let quote = Quote {
            price: 190.1,
            change: 2.0,
            change_percent: 1.06,
            volume: Some(10),
            prev_close: 188.1,
            open: 188.5,
            day_high: 191.0,
            day_low: 187.9,
            last_trading_day: chrono::NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
            source_name: "Yahoo Finance".to_string(),
        };
        let e = mover_entry(&stock, "AAPL", &quote);
        assert_eq!(e.ticker, "AAPL");
        assert_eq!(e.name, "Apple");
        assert_eq!(e.source_name, "Yahoo Finance");
    }
}
