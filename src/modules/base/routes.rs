use actix_web::{web, HttpRequest, HttpResponse};
use sa_token_plugin_actix_web::SaTokenState;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppResult;
use crate::modules::accounts::{csrf::CsrfToken, pages, session::current_user, AccountsState};

/// 健康检查响应
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
}

/// 首页
#[actix_web::get("/")]
pub async fn home(
    req: HttpRequest,
    accounts: web::Data<AccountsState>,
    sa_token: web::Data<SaTokenState>,
) -> AppResult<HttpResponse> {
    let user = current_user(&req, &sa_token, &accounts).await?;
    let csrf = CsrfToken::from_request(&req);
    let body = pages::home_page(user.as_ref(), csrf.value());
    Ok(pages::html_response(body, &csrf, accounts.secure_cookies))
}

/// 健康检查
#[utoipa::path(
    get,
    path = "/health",
    tag = "base",
    responses((status = 200, description = "服务运行中", body = HealthStatus))
)]
#[actix_web::get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthStatus {
        status: "ok".to_string(),
    })
}

pub fn configure_base_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(home).service(health);
}
