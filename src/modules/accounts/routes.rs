use actix_web::web;

use super::controller::{login, login_form, logout, me, profile, signup, signup_form};

/// 账户模块路由
pub fn configure_accounts_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(signup_form)
        .service(signup)
        .service(login_form)
        .service(login)
        .service(logout)
        .service(profile)
        .service(me);
}
