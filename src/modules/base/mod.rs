//! 基础模块：首页与健康检查

pub mod routes;

/// 注册基础模块的路由
pub fn register_base_routes() {
    crate::register_route!(
        "base",
        "首页与健康检查",
        "base",
        routes::configure_base_routes
    );
}
