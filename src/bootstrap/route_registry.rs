use actix_web::web;
use lazy_static::lazy_static;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

/// 路由配置函数类型
pub type RouteConfigFn = fn(&mut web::ServiceConfig);

/// 路由信息结构
#[derive(Debug, Clone)]
pub struct RouteInfo {
    pub name: String,
    pub description: String,
    pub module: String,
    pub config_fn: RouteConfigFn,
}

/// 路由注册器
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: BTreeMap<String, RouteInfo>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册路由，同名覆盖
    pub fn register_route(&mut self, route_info: RouteInfo) {
        self.routes.insert(route_info.name.clone(), route_info);
    }

    pub fn get_routes_by_module(&self, module: &str) -> Vec<&RouteInfo> {
        self.routes
            .values()
            .filter(|route| route.module == module)
            .collect()
    }

    /// 配置所有路由到 ServiceConfig
    pub fn configure_all_routes(&self, cfg: &mut web::ServiceConfig) {
        for route_info in self.routes.values() {
            (route_info.config_fn)(cfg);
        }
    }

    /// 路由数量与模块列表
    pub fn get_stats(&self) -> (usize, Vec<String>) {
        let modules: BTreeSet<String> = self
            .routes
            .values()
            .map(|route| route.module.clone())
            .collect();
        (self.routes.len(), modules.into_iter().collect())
    }

    pub fn log_routes_info(&self) {
        let (total, modules) = self.get_stats();
        for module in &modules {
            for route in self.get_routes_by_module(module) {
                info!("路由 [{}] {}: {}", module, route.name, route.description);
            }
        }
        info!("共注册 {} 组路由", total);
    }
}

lazy_static! {
    static ref GLOBAL_ROUTE_REGISTRY: RwLock<RouteRegistry> = RwLock::new(RouteRegistry::new());
}

fn read_registry() -> RwLockReadGuard<'static, RouteRegistry> {
    GLOBAL_ROUTE_REGISTRY
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_registry() -> RwLockWriteGuard<'static, RouteRegistry> {
    GLOBAL_ROUTE_REGISTRY
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 注册路由到全局注册器
pub fn register_global_route(route_info: RouteInfo) {
    write_registry().register_route(route_info);
}

/// 配置所有全局路由
pub fn configure_global_routes(cfg: &mut web::ServiceConfig) {
    read_registry().configure_all_routes(cfg);
}

pub fn log_global_routes_info() {
    read_registry().log_routes_info();
}

pub fn get_global_routes_stats() -> (usize, Vec<String>) {
    read_registry().get_stats()
}

/// 便捷宏：注册路由
#[macro_export]
macro_rules! register_route {
    ($name:expr, $description:expr, $module:expr, $config_fn:expr) => {
        $crate::route_registry::register_global_route(
            $crate::route_registry::RouteInfo {
                name: $name.to_string(),
                description: $description.to_string(),
                module: $module.to_string(),
                config_fn: $config_fn,
            },
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App, HttpResponse};

    fn ping_routes(cfg: &mut web::ServiceConfig) {
        cfg.route("/ping", web::get().to(|| async { HttpResponse::Ok().body("pong") }));
    }

    fn pong_routes(cfg: &mut web::ServiceConfig) {
        cfg.route("/pong", web::get().to(|| async { HttpResponse::Ok().body("ping") }));
    }

    fn registry() -> RouteRegistry {
        let mut registry = RouteRegistry::new();
        registry.register_route(RouteInfo {
            name: "ping".to_string(),
            description: "ping".to_string(),
            module: "a".to_string(),
            config_fn: ping_routes,
        });
        registry.register_route(RouteInfo {
            name: "pong".to_string(),
            description: "pong".to_string(),
            module: "b".to_string(),
            config_fn: pong_routes,
        });
        registry
    }

    #[::core::prelude::v1::test]
    fn test_stats() {
        let (total, modules) = registry().get_stats();
        assert_eq!(total, 2);
        assert_eq!(modules, vec!["a", "b"]);
    }

    #[actix_web::test]
    async fn test_configure_all_routes() {
        let registry = registry();
        let app = test::init_service(App::new().configure(|cfg| registry.configure_all_routes(cfg))).await;

        for uri in ["/ping", "/pong"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert!(resp.status().is_success());
        }
    }
}
