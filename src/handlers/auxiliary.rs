//! 辅助数据源透传接口
//!
//! ## API 列表
//! - GET /fmp/{path} - FMP
//! - GET /coingecko/{path} - CoinGecko
//! - GET /fred/{path} - FRED
//! - GET /eodhd/{path} - EODHD

use actix_web::{web, HttpResponse, Result};

use super::respond;
use crate::services::providers::ProviderId;
use crate::services::MarketService;

type Query = web::Query<Vec<(String, String)>>;

async fn forward(
    service: web::Data<MarketService>,
    provider: ProviderId,
    path: String,
    query: Query,
) -> Result<HttpResponse> {
    Ok(respond(service.forward(provider, &path, query.into_inner()).await))
}

pub async fn fmp(service: web::Data<MarketService>, path: web::Path<String>, query: Query) -> Result<HttpResponse> {
    forward(service, ProviderId::Fmp, path.into_inner(), query).await
}

pub async fn coingecko(
    service: web::Data<MarketService>,
    path: web::Path<String>,
    query: Query,
) -> Result<HttpResponse> {
    forward(service, ProviderId::CoinGecko, path.into_inner(), query).await
}

pub async fn fred(service: web::Data<MarketService>, path: web::Path<String>, query: Query) -> Result<HttpResponse> {
    forward(service, ProviderId::Fred, path.into_inner(), query).await
}

pub async fn eodhd(service: web::Data<MarketService>, path: web::Path<String>, query: Query) -> Result<HttpResponse> {
    forward(service, ProviderId::Eodhd, path.into_inner(), query).await
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/fmp/{path:.*}", web::get().to(fmp))
        .route("/coingecko/{path:.*}", web::get().to(coingecko))
        .route("/fred/{path:.*}", web::get().to(fred))
        .route("/eodhd/{path:.*}", web::get().to(eodhd));
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, web, App};

    use crate::handlers;
    use crate::services::market_service::tests::market_service;

    #[actix_web::test]
    async fn test_missing_key_is_503() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(market_service(Vec::new())))
                .configure(handlers::config),
        )
        .await;

        for uri in ["/api/fmp/v3/quote/AAPL", "/api/fred/series/observations?series_id=DEXUSEU"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn test_bad_path_is_400() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(market_service(Vec::new())))
                .configure(handlers::config),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/eodhd/eod/a%20b").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
