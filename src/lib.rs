pub mod api;
#[path = "bootstrap/app_bootstrap.rs"]
pub mod app_bootstrap;
#[path = "bootstrap/command_registry.rs"]
pub mod command_registry;
pub mod comm;
pub mod conf;
pub mod error;
pub mod middleware;
#[path = "bootstrap/route_registry.rs"]
pub mod route_registry;

// Modules
pub mod modules;

/// 初始化所有模块的命令
pub fn init_commands() {
    modules::deploy::register_deploy_commands();
}

/// 初始化所有模块的路由
pub fn init_routes() {
    modules::base::register_base_routes();
    modules::accounts::register_accounts_routes();
}

// Re-export bootstrap modules
pub use app_bootstrap::{init_tracing, AppBootstrap, ServerOverrides};
pub use command_registry::{build_app, handle_command, CommandModule};
pub use route_registry::configure_global_routes;
