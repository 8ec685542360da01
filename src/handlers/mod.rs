pub mod auxiliary;
pub mod currency;
pub mod health;
pub mod news;
pub mod stock;

use actix_web::http::header::ContentType;
use actix_web::{web, HttpResponse};

use crate::models::ErrorResponse;
use crate::services::cache::CachedPayload;
use crate::services::{ServiceError, ServiceResult};

/// 返回过期缓存时附加的响应头
pub const STALE_HEADER: &str = "X-Data-Stale";

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(health::config)
            .configure(stock::config)
            .configure(news::config)
            .configure(currency::config)
            .configure(auxiliary::config),
    );
}

/// 缓存中的 JSON 原样写入响应体
pub fn json_payload(payload: CachedPayload) -> HttpResponse {
    let mut builder = HttpResponse::Ok();
    builder.content_type(ContentType::json());
    if payload.stale {
        builder.insert_header((STALE_HEADER, "true"));
    }
    builder.body(payload.body)
}

/// 服务错误转换为 `{ "error": "..." }` 响应
pub fn error_response(error: &ServiceError) -> HttpResponse {
    let body = ErrorResponse::new(error.to_string());
    match error {
        ServiceError::NotFound(_) => HttpResponse::NotFound().json(body),
        ServiceError::BadRequest(_) => HttpResponse::BadRequest().json(body),
        ServiceError::Unavailable(_) => HttpResponse::ServiceUnavailable().json(body),
        ServiceError::BadGateway(_) => HttpResponse::BadGateway().json(body),
        ServiceError::Internal(_) => {
            log::error!("内部错误: {}", error);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

pub fn respond(result: ServiceResult<CachedPayload>) -> HttpResponse {
    match result {
        Ok(payload) => json_payload(payload),
        Err(e) => error_response(&e),
    }
}
