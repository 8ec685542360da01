//! 股票接口处理器
//!
//! ## API 列表
//! - GET /quote/{ticker} - 实时报价
//! - GET /history/{ticker}?period=&interval= - 历史价格
//! - GET /overview/{ticker} - 公司概况
//! - POST /topmovers - 涨跌榜

use actix_web::{web, HttpResponse, Result};

use super::{error_response, respond};
use crate::models::{HistoryQuery, TopMoversRequest};
use crate::services::market_service::normalize_ticker;
use crate::services::{MarketService, ServiceError};

/// 获取实时报价
///
/// GET /api/quote/{ticker}
pub async fn get_quote(service: web::Data<MarketService>, path: web::Path<String>) -> Result<HttpResponse> {
    let ticker = match normalize_ticker(&path.into_inner()) {
        Ok(ticker) => ticker,
        Err(e) => return Ok(error_response(&e)),
    };
    Ok(respond(service.get_quote(&ticker).await))
}

/// 获取历史价格
///
/// GET /api/history/{ticker}
///
/// # 参数
/// - period: 1mo/3mo/6mo/1y/2y/5y/max，默认 3mo
/// - interval: 1d/1wk/1mo，默认 1d
pub async fn get_history(
    service: web::Data<MarketService>,
    path: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse> {
    let ticker = match normalize_ticker(&path.into_inner()) {
        Ok(ticker) => ticker,
        Err(e) => return Ok(error_response(&e)),
    };
    let range = match query.to_range() {
        Ok(range) => range,
        Err(message) => return Ok(error_response(&ServiceError::BadRequest(message))),
    };
    Ok(respond(service.get_history(&ticker, range).await))
}

/// 获取公司概况
///
/// GET /api/overview/{ticker}
pub async fn get_overview(service: web::Data<MarketService>, path: web::Path<String>) -> Result<HttpResponse> {
    let ticker = match normalize_ticker(&path.into_inner()) {
        Ok(ticker) => ticker,
        Err(e) => return Ok(error_response(&e)),
    };
    Ok(respond(service.get_overview(&ticker).await))
}

/// 涨跌榜
///
/// POST /api/topmovers
///
/// 请求体 `{ "stocks": [{ "ticker": "AAPL", "name": "Apple" }, "MSFT"] }`
pub async fn top_movers(
    service: web::Data<MarketService>,
    body: web::Json<TopMoversRequest>,
) -> Result<HttpResponse> {
    let movers = service.get_top_movers(&body.stocks).await;
    Ok(HttpResponse::Ok().json(movers))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/quote/{ticker}", web::get().to(get_quote))
        .route("/history/{ticker}", web::get().to(get_history))
        .route("/overview/{ticker}", web::get().to(get_overview))
        .route("/topmovers", web::post().to(top_movers));
}
