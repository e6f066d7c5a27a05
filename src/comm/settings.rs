//! 应用配置快照
//!
//! `Settings` 在每次调用时由 [`ConfigManager`] 与少量约定俗成的环境变量
//! 构建，之后只读。缺失的配置项一律回退到默认值。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::comm::config::{get_global_config_manager, split_list, ConfigManager};
use crate::error::{AppError, AppResult};
use crate::middleware;

/// 开发用密钥前缀，以此开头的密钥不应出现在生产环境
pub const INSECURE_SECRET_KEY_PREFIX: &str = "insecure-";
/// 默认开发密钥
pub const DEFAULT_SECRET_KEY: &str = "insecure-dev-key-2f1c9e4b7a3d-change-me-before-deploying";
/// 启用长缓存与指纹文件名的静态文件存储后端
pub const MANIFEST_STATIC_STORAGE: &str = "static_files.CompressedManifestStorage";

/// 数据库引擎名称
pub const ENGINE_MEMORY: &str = "memory";
pub const ENGINE_POSTGRESQL: &str = "postgresql";
pub const ENGINE_SQLITE: &str = "sqlite";

/// 读取进程环境变量的抽象，便于测试注入
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// 真实进程环境
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            workers: Some(4),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub engine: String,
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: ENGINE_MEMORY.to_string(),
            url: None,
            max_connections: 5,
        }
    }
}

impl DatabaseSettings {
    /// 屏蔽连接串中的密码，用于日志输出
    pub fn masked_url(&self) -> Option<String> {
        self.url.as_deref().map(mask_sensitive_info)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticFilesSettings {
    pub url: String,
    pub root: Option<String>,
    pub storage: String,
}

impl Default for StaticFilesSettings {
    fn default() -> Self {
        Self {
            url: "/static/".to_string(),
            root: None,
            storage: "default".to_string(),
        }
    }
}

impl StaticFilesSettings {
    /// 是否使用压缩+指纹的存储后端
    pub fn uses_manifest_storage(&self) -> bool {
        self.storage.to_lowercase().contains(middleware::STATIC_FILES)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestApiSettings {
    pub docs_path: String,
}

impl Default for RestApiSettings {
    fn default() -> Self {
        Self {
            docs_path: "/api/docs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    pub euron_api_key: Option<String>,
    /// 存在即表示 REST/OpenAPI 接口已配置
    pub rest: Option<RestApiSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSettings {
    /// 会话 cookie / 请求头名称
    pub token_name: String,
    pub timeout_seconds: i64,
    pub login_url: String,
    pub login_redirect_url: String,
    /// 会话存储: memory | redis
    pub storage: String,
    pub redis_url: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_name: "genai_session".to_string(),
            timeout_seconds: 1_209_600, // 两周
            login_url: "/accounts/login/".to_string(),
            login_redirect_url: "/".to_string(),
            storage: "memory".to_string(),
            redis_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// 配置快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub secret_key: String,
    pub debug: bool,
    pub allowed_hosts: Vec<String>,
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub static_files: StaticFilesSettings,
    pub middleware: Vec<String>,
    pub api: ApiSettings,
    pub auth: AuthSettings,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            debug: true,
            allowed_hosts: Vec::new(),
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            static_files: StaticFilesSettings::default(),
            middleware: vec![
                middleware::SECURITY.to_string(),
                middleware::SESSION.to_string(),
                middleware::LOGGER.to_string(),
            ],
            api: ApiSettings::default(),
            auth: AuthSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Settings {
    /// 从全局配置管理器与进程环境加载
    pub fn from_global() -> AppResult<Self> {
        let manager = get_global_config_manager().map_err(|e| {
            AppError::Config(crate::comm::config::ConfigError::InitializationError {
                message: e.to_string(),
            })
        })?;
        manager.log_sources_info();
        Ok(Self::load(&manager, &ProcessEnv))
    }

    /// 构建配置快照：先读配置源，再应用约定的环境变量
    pub fn load(manager: &ConfigManager, env: &dyn EnvSource) -> Self {
        let defaults = Settings::default();

        let mut settings = Settings {
            secret_key: manager.get_or("secret_key", defaults.secret_key),
            debug: manager.get_or("debug", defaults.debug),
            allowed_hosts: manager
                .get_list("allowed_hosts")
                .unwrap_or(defaults.allowed_hosts),
            server: ServerSettings {
                host: manager.get_or("server.host", defaults.server.host),
                port: manager.get_or("server.port", defaults.server.port),
                workers: manager
                    .get::<usize>("server.workers")
                    .ok()
                    .or(defaults.server.workers),
            },
            database: DatabaseSettings {
                engine: manager.get_or("database.engine", defaults.database.engine),
                url: manager.get_string("database.url").ok(),
                max_connections: manager
                    .get_or("database.max_connections", defaults.database.max_connections),
            },
            static_files: StaticFilesSettings {
                url: manager.get_or("static_files.url", defaults.static_files.url),
                root: manager.get_string("static_files.root").ok(),
                storage: manager.get_or("static_files.storage", defaults.static_files.storage),
            },
            middleware: manager
                .get_list("middleware")
                .unwrap_or(defaults.middleware),
            api: ApiSettings {
                euron_api_key: manager.get_string("api.euron_api_key").ok(),
                rest: manager.exists("api.rest").then(|| RestApiSettings {
                    docs_path: manager.get_or("api.rest.docs_path", RestApiSettings::default().docs_path),
                }),
            },
            auth: AuthSettings {
                token_name: manager.get_or("auth.token_name", defaults.auth.token_name),
                timeout_seconds: manager.get_or("auth.timeout_seconds", defaults.auth.timeout_seconds),
                login_url: manager.get_or("auth.login_url", defaults.auth.login_url),
                login_redirect_url: manager
                    .get_or("auth.login_redirect_url", defaults.auth.login_redirect_url),
                storage: manager.get_or("auth.storage", defaults.auth.storage),
                redis_url: manager.get_string("auth.redis_url").ok(),
            },
            logging: LoggingSettings {
                level: manager.get_or("logging.level", defaults.logging.level),
                json_format: manager.get_or("logging.json_format", defaults.logging.json_format),
            },
        };

        settings.apply_env_overrides(env);
        settings.derive_database_engine();
        settings
    }

    fn apply_env_overrides(&mut self, env: &dyn EnvSource) {
        if let Some(secret_key) = non_empty(env.var("SECRET_KEY")) {
            self.secret_key = secret_key;
        }

        if let Some(raw) = non_empty(env.var("DEBUG")) {
            match parse_bool(&raw) {
                Some(debug) => self.debug = debug,
                None => warn!("无法解析 DEBUG={}，保留配置值 {}", raw, self.debug),
            }
        }

        if let Some(raw) = env.var("ALLOWED_HOSTS") {
            self.allowed_hosts = split_list(&raw);
        }

        if let Some(url) = non_empty(env.var("DATABASE_URL")) {
            self.database.url = Some(url);
        }

        if let Some(api_key) = non_empty(env.var("EURON_API_KEY")) {
            self.api.euron_api_key = Some(api_key);
        }
    }

    /// 有连接串时由其 scheme 决定数据库引擎
    fn derive_database_engine(&mut self) {
        if let Some(engine) = self.database.url.as_deref().and_then(engine_from_url) {
            self.database.engine = engine.to_string();
        }
    }

    /// 指定中间件是否启用
    pub fn uses_middleware(&self, id: &str) -> bool {
        self.middleware.iter().any(|m| m == id)
    }

    /// 记录配置摘要
    pub fn log_summary(&self) {
        info!("=== 配置摘要 ===");
        info!("服务器: {}:{}", self.server.host, self.server.port);
        info!("工作线程: {:?}", self.server.workers);
        info!("调试模式: {}", self.debug);
        info!("允许的主机: {:?}", self.allowed_hosts);
        info!("数据库引擎: {}", self.database.engine);
        if let Some(db_url) = self.database.masked_url() {
            info!("数据库: {}", db_url);
        }
        info!("中间件: {:?}", self.middleware);
        info!("会话存储: {}", self.auth.storage);
        info!("日志级别: {}", self.logging.level);
    }
}

/// 由连接串推导数据库引擎
pub fn engine_from_url(url: &str) -> Option<&'static str> {
    let scheme = url.split(':').next()?.to_lowercase();
    match scheme.as_str() {
        "postgres" | "postgresql" => Some(ENGINE_POSTGRESQL),
        "sqlite" => Some(ENGINE_SQLITE),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// 屏蔽敏感信息，查找 :// 与 @ 之间的密码部分
fn mask_sensitive_info(url: &str) -> String {
    let Some(start) = url.find("://") else {
        return url.to_string();
    };
    let credentials_start = start + 3;
    let Some(at_pos) = url[credentials_start..].find('@') else {
        return url.to_string();
    };
    let credentials_end = credentials_start + at_pos;

    match url[credentials_start..credentials_end].find(':') {
        Some(colon_pos) => {
            let mut result = url.to_string();
            result.replace_range(credentials_start + colon_pos + 1..credentials_end, "***");
            result
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::config::ConfigSource;
    use config::FileFormat;

    fn manager_from(toml: &str) -> ConfigManager {
        ConfigManager::with_sources(vec![ConfigSource::String {
            content: toml.to_string(),
            format: FileFormat::Toml,
        }])
        .unwrap()
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let settings = Settings::load(&manager_from(""), &env(&[]));
        assert_eq!(settings, Settings::default());
        assert!(settings.secret_key.starts_with(INSECURE_SECRET_KEY_PREFIX));
        assert!(settings.debug);
        assert_eq!(settings.database.engine, ENGINE_MEMORY);
    }

    #[test]
    fn test_file_values_are_read() {
        let settings = Settings::load(
            &manager_from(
                r#"
                secret_key = "prod-key"
                debug = false
                allowed_hosts = ["example.com"]
                middleware = ["security", "static_files"]

                [static_files]
                root = "/srv/static"
                storage = "static_files.CompressedManifestStorage"

                [api]
                euron_api_key = "euri-123"

                [api.rest]
                docs_path = "/docs"
                "#,
            ),
            &env(&[]),
        );

        assert_eq!(settings.secret_key, "prod-key");
        assert!(!settings.debug);
        assert_eq!(settings.allowed_hosts, vec!["example.com"]);
        assert_eq!(settings.static_files.root.as_deref(), Some("/srv/static"));
        assert!(settings.static_files.uses_manifest_storage());
        assert!(settings.uses_middleware(middleware::STATIC_FILES));
        assert_eq!(settings.api.euron_api_key.as_deref(), Some("euri-123"));
        assert_eq!(settings.api.rest.unwrap().docs_path, "/docs");
    }

    #[test]
    fn test_env_overrides_win() {
        let settings = Settings::load(
            &manager_from("secret_key = \"from-file\"\ndebug = true"),
            &env(&[
                ("SECRET_KEY", "from-env"),
                ("DEBUG", "False"),
                ("ALLOWED_HOSTS", "a.com, b.com"),
                ("EURON_API_KEY", "euri-abc"),
            ]),
        );

        assert_eq!(settings.secret_key, "from-env");
        assert!(!settings.debug);
        assert_eq!(settings.allowed_hosts, vec!["a.com", "b.com"]);
        assert_eq!(settings.api.euron_api_key.as_deref(), Some("euri-abc"));
    }

    #[test]
    fn test_unparseable_debug_keeps_configured_value() {
        let settings = Settings::load(&manager_from("debug = false"), &env(&[("DEBUG", "maybe")]));
        assert!(!settings.debug);
    }

    #[test]
    fn test_database_url_sets_engine() {
        let settings = Settings::load(
            &manager_from(""),
            &env(&[("DATABASE_URL", "postgres://app:secret@db:5432/app")]),
        );
        assert_eq!(settings.database.engine, ENGINE_POSTGRESQL);
        assert_eq!(
            settings.database.masked_url().unwrap(),
            "postgres://app:***@db:5432/app"
        );
    }

    #[test]
    fn test_engine_from_url() {
        assert_eq!(engine_from_url("postgresql://x"), Some(ENGINE_POSTGRESQL));
        assert_eq!(engine_from_url("sqlite:db.sqlite3"), Some(ENGINE_SQLITE));
        assert_eq!(engine_from_url("mysql://x"), None);
    }

    #[test]
    fn test_rest_absent_by_default() {
        let settings = Settings::load(&manager_from("[api]\neuron_api_key = \"k\""), &env(&[]));
        assert!(settings.api.rest.is_none());
    }
}
