//! HTTP 中间件
//!
//! 中间件按 `Settings::middleware` 中的标识启用。
pub mod security;
pub mod static_files;

/// 安全响应头
pub const SECURITY: &str = "security";
/// 静态文件服务
pub const STATIC_FILES: &str = "static_files";
/// Sa-Token 会话
pub const SESSION: &str = "session";
/// 访问日志
pub const LOGGER: &str = "logger";

pub use security::{SecurityConfig, SecurityMiddleware};
pub use static_files::{StaticFiles, StaticFilesConfig};
