//! 账户模块：注册、登录、注销与个人资料

pub mod controller;
pub mod csrf;
pub mod forms;
pub mod models;
pub mod pages;
pub mod password;
pub mod routes;
pub mod session;
pub mod store;

use std::sync::Arc;

use crate::comm::settings::AuthSettings;
use password::Passwords;
use store::UserStore;

/// 账户处理器共享状态
pub struct AccountsState {
    pub users: Arc<dyn UserStore>,
    pub passwords: Arc<Passwords>,
    pub auth: AuthSettings,
    /// cookie 是否带 Secure 标志（非调试模式）
    pub secure_cookies: bool,
}

/// 注册账户模块的路由
pub fn register_accounts_routes() {
    crate::register_route!(
        "accounts",
        "注册、登录、注销与个人资料",
        "accounts",
        routes::configure_accounts_routes
    );
}
