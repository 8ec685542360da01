//! 业务逻辑服务模块
//!
//! 封装数据获取、回退链编排和缓存逻辑

pub mod cache;          // 响应缓存
pub mod error;          // 服务层错误
pub mod market_service; // 行情服务入口
pub mod movers;         // 涨跌榜
pub mod orchestrator;   // 回退链编排
pub mod passthrough;    // 辅助透传接口
pub mod providers;      // 数据源适配器
pub mod registry;       // 数据源注册表

pub use error::{ServiceError, ServiceResult};
pub use market_service::MarketService;
