use tracing::debug;

use crate::comm::settings::{Settings, ENGINE_MEMORY, ENGINE_POSTGRESQL, INSECURE_SECRET_KEY_PREFIX};
use crate::error::{AppError, AppResult};

/// 允许的日志级别
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// 配置验证器
///
/// 只在启动 Web 服务器前执行；部署检查命令只报告、不校验。
#[derive(Debug)]
pub struct SettingsValidator {
    environment: EnvironmentConfigLoader,
}

impl SettingsValidator {
    /// 按 `APP_ENV` 确定运行环境
    pub fn new() -> Self {
        Self::for_environment(EnvironmentConfigLoader::new())
    }

    pub fn for_environment(environment: EnvironmentConfigLoader) -> Self {
        Self { environment }
    }

    /// 验证整个配置
    pub fn validate(&self, settings: &Settings) -> AppResult<()> {
        if settings.server.host.trim().is_empty() {
            return Err(AppError::validation("server.host", "服务器主机不能为空"));
        }

        if settings.server.port < 1024 {
            return Err(AppError::validation(
                "server.port",
                "端口必须在1024-65535范围内",
            ));
        }

        if let Some(workers) = settings.server.workers {
            if workers == 0 || workers > 32 {
                return Err(AppError::validation(
                    "server.workers",
                    "工作线程数必须在1-32范围内",
                ));
            }
        }

        let max_conn = settings.database.max_connections;
        if max_conn == 0 || max_conn > 100 {
            return Err(AppError::validation(
                "database.max_connections",
                "数据库连接池大小必须在1-100范围内",
            ));
        }

        let level = settings.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(AppError::validation(
                "logging.level",
                format!("值必须是以下之一: {}", LOG_LEVELS.join(", ")),
            ));
        }

        let timeout = settings.auth.timeout_seconds;
        if !(300..=31_536_000).contains(&timeout) {
            return Err(AppError::validation(
                "auth.timeout_seconds",
                "会话有效期必须在300-31536000秒范围内",
            ));
        }

        if settings.auth.token_name.trim().is_empty() {
            return Err(AppError::validation("auth.token_name", "会话名称不能为空"));
        }

        self.validate_database(settings)?;

        if self.environment.is_production() {
            self.validate_production(settings)?;
        }

        debug!("配置验证通过 (环境: {})", self.environment.get_environment());
        Ok(())
    }

    fn validate_database(&self, settings: &Settings) -> AppResult<()> {
        let engine = settings.database.engine.to_lowercase();
        if engine.contains(ENGINE_POSTGRESQL) {
            if settings.database.url.as_deref().map_or(true, |url| url.trim().is_empty()) {
                return Err(AppError::validation(
                    "database.url",
                    "postgresql 引擎需要 DATABASE_URL",
                ));
            }
            return Ok(());
        }
        if engine.contains(ENGINE_MEMORY) {
            return Ok(());
        }
        Err(AppError::validation(
            "database.engine",
            format!("不支持的数据库引擎: {}", settings.database.engine),
        ))
    }

    /// 生产环境不接受开发密钥
    fn validate_production(&self, settings: &Settings) -> AppResult<()> {
        let secret_key = settings.secret_key.trim();
        if secret_key.is_empty() || secret_key.starts_with(INSECURE_SECRET_KEY_PREFIX) {
            return Err(AppError::validation(
                "secret_key",
                format!("{} 环境必须设置 SECRET_KEY", self.environment.get_environment()),
            ));
        }
        Ok(())
    }
}

impl Default for SettingsValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// 环境特定配置加载器
#[derive(Debug, Clone)]
pub struct EnvironmentConfigLoader {
    environment: String,
}

impl EnvironmentConfigLoader {
    /// 从 `APP_ENV` 读取当前环境，默认 development
    pub fn new() -> Self {
        let environment = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        Self::with_environment(environment)
    }

    pub fn with_environment(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }

    /// 获取当前环境
    pub fn get_environment(&self) -> &str {
        &self.environment
    }

    /// 获取环境特定的配置文件路径（按优先级从低到高）
    pub fn get_config_paths(&self) -> Vec<String> {
        vec![
            "config/default.toml".to_string(),
            format!("config/{}.toml", self.environment),
            "config/local.toml".to_string(),
        ]
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for EnvironmentConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let validator = SettingsValidator::new();
        assert!(validator.validate(&Settings::default()).is_ok());
    }

    #[test]
    fn test_invalid_port() {
        let mut settings = Settings::default();
        settings.server.port = 80;
        assert!(SettingsValidator::new().validate(&settings).is_err());
    }

    #[test]
    fn test_invalid_workers() {
        let mut settings = Settings::default();
        settings.server.workers = Some(0);
        assert!(SettingsValidator::new().validate(&settings).is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut settings = Settings::default();
        settings.logging.level = "verbose".to_string();
        let err = SettingsValidator::new().validate(&settings).unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_session_timeout_bounds() {
        let mut settings = Settings::default();
        settings.auth.timeout_seconds = 10;
        assert!(SettingsValidator::new().validate(&settings).is_err());
    }

    #[test]
    fn test_unknown_engine_rejected() {
        let mut settings = Settings::default();
        settings.database.engine = "sqlite".to_string();
        let err = SettingsValidator::new().validate(&settings).unwrap_err();
        assert!(err.to_string().contains("database.engine"));
    }

    #[test]
    fn test_postgresql_requires_url() {
        let mut settings = Settings::default();
        settings.database.engine = "postgresql".to_string();
        let err = SettingsValidator::new().validate(&settings).unwrap_err();
        assert!(err.to_string().contains("database.url"));

        settings.database.url = Some("postgresql://app:pw@db:5432/genai".to_string());
        assert!(SettingsValidator::new().validate(&settings).is_ok());
    }

    #[test]
    fn test_production_rejects_development_key() {
        let production =
            || SettingsValidator::for_environment(EnvironmentConfigLoader::with_environment("production"));
        let mut settings = Settings::default();

        let err = production().validate(&settings).unwrap_err();
        assert!(err.to_string().contains("secret_key"));

        settings.secret_key = "b7e1-production-secret".to_string();
        assert!(production().validate(&settings).is_ok());

        let staging = SettingsValidator::for_environment(EnvironmentConfigLoader::with_environment("staging"));
        assert!(staging.validate(&Settings::default()).is_ok());
    }

    #[test]
    fn test_environment_loader() {
        let loader = EnvironmentConfigLoader::with_environment("production");
        let paths = loader.get_config_paths();

        assert_eq!(paths.len(), 3);
        assert_eq!(paths[1], "config/production.toml");
        assert!(loader.is_production());
        assert_eq!(loader.get_environment(), "production");
    }
}
