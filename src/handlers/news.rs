use actix_web::{web, HttpResponse, Result};

use super::{error_response, respond};
use crate::models::NewsQuery;
use crate::services::{MarketService, ServiceError};

/// 新闻搜索
///
/// GET /api/news?q={keyword}
///
/// 没有任何数据源返回结果时为 200 + 空数组
pub async fn get_news(service: web::Data<MarketService>, query: web::Query<NewsQuery>) -> Result<HttpResponse> {
    let keyword = match query.q.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => return Ok(error_response(&ServiceError::BadRequest("缺少查询参数 q".to_string()))),
    };
    Ok(respond(service.get_news(&keyword).await))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/news", web::get().to(get_news));
}
