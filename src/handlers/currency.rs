use actix_web::{web, HttpResponse, Result};

use super::{error_response, respond};
use crate::services::market_service::normalize_currency;
use crate::services::MarketService;

/// 汇率
///
/// GET /api/currency/{from}/{to}
pub async fn get_currency(
    service: web::Data<MarketService>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (from, to) = path.into_inner();
    let pair = normalize_currency(&from).and_then(|base| Ok((base, normalize_currency(&to)?)));
    match pair {
        Ok((base, quote)) => Ok(respond(service.get_currency(&base, &quote).await)),
        Err(e) => Ok(error_response(&e)),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/currency/{from}/{to}", web::get().to(get_currency));
}
