//! 行情看板代理服务
//!
//! 为前端看板提供统一的行情 RESTful API：
//! 按回退链依次调用多个行情数据源，把各自的响应规范化为同一种格式，并在服务端缓存
//! 数据来源：Alpha Vantage、Yahoo Finance、Finnhub、Twelve Data、Marketstack、FMP、CoinGecko、FRED、EODHD、NewsAPI

mod config;     // 配置
mod handlers;   // HTTP 请求处理器
mod models;     // 数据模型定义
mod services;   // 业务逻辑服务

use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpServer};
use env_logger::Env;

use crate::config::AppConfig;
use crate::services::MarketService;

/// 应用程序入口
///
/// 启动 HTTP 服务器，默认监听 0.0.0.0:3001
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    // 先初始化日志系统，加载配置时的日志才能输出。
    // RUST_LOG 优先；未设置时先按 info 输出，配置加载后再切换到配置中的级别
    let from_env = std::env::var_os("RUST_LOG").is_some();
    env_logger::init_from_env(Env::default().default_filter_or("trace"));
    if !from_env {
        log::set_max_level(log::LevelFilter::Info);
    }

    let config = AppConfig::load();
    if !from_env {
        log::set_max_level(config.log.level_filter());
    }

    log::info!("启动行情代理服务");

    let service = MarketService::from_config(&config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("初始化行情服务失败: {}", e)))?;
    let service = web::Data::new(service);
    let origins = config.cors.allowed_origins.clone();

    let addr = config.bind_addr();
    log::info!("监听 {}", addr);

    let mut server = HttpServer::new(move || {
        let mut cors = Cors::default();
        for origin in &origins {
            cors = cors.allowed_origin(origin);
        }
        let cors = cors
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
            .expose_headers(vec![handlers::STALE_HEADER])
            .max_age(3600);

        App::new()
            .wrap(Logger::default())  // 添加请求日志中间件
            .wrap(cors)
            .app_data(service.clone())
            .configure(handlers::config)  // 配置路由
    });

    if config.server.workers > 0 {
        server = server.workers(config.server.workers);
    }

    server.bind(addr)?.run().await
}
