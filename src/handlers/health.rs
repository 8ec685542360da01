use actix_web::{web, HttpResponse, Result};

use crate::models::PingResponse;

/// 存活检查
///
/// GET /api/ping
pub async fn ping() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(PingResponse::pong()))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/ping", web::get().to(ping));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_ping() {
        let app = test::init_service(App::new().service(web::scope("/api").configure(config))).await;
        let req = test::TestRequest::get().uri("/api/ping").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, serde_json::json!({ "message": "pong" }));
    }
}
