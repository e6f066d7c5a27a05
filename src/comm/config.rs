use anyhow::{anyhow, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::comm::config_validator::EnvironmentConfigLoader;

lazy_static! {
    static ref GLOBAL_CONFIG_MANAGER: RwLock<Option<Arc<ConfigManager>>> = RwLock::new(None);
}

/// 环境变量配置前缀，例如 `APP_SERVER__PORT=9000` 对应 `server.port`
pub const ENV_PREFIX: &str = "APP";
/// 环境变量层级分隔符
pub const ENV_SEPARATOR: &str = "__";

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },
    #[error("配置初始化失败: {message}")]
    InitializationError { message: String },
}

/// 配置数据源信息
#[derive(Debug, Clone)]
pub struct ConfigSourceInfo {
    pub source_type: String,
    pub description: String,
    pub priority: u8,
    pub loaded: bool,
}

/// 配置管理器
///
/// 按添加顺序叠加配置源，后添加者优先生效。
pub struct ConfigManager {
    config: Config,
    sources_info: Vec<ConfigSourceInfo>,
}

impl ConfigManager {
    /// 按当前运行环境构建标准配置源：
    /// `config/default.toml` -> `config/{env}.toml` -> `config/local.toml` -> `APP_*` 环境变量
    pub fn from_environment(env_loader: &EnvironmentConfigLoader) -> Result<Self> {
        let mut sources: Vec<ConfigSource> = env_loader
            .get_config_paths()
            .into_iter()
            .map(|path| ConfigSource::File {
                path,
                format: Some(FileFormat::Toml),
                required: false,
            })
            .collect();

        sources.push(ConfigSource::Env {
            prefix: ENV_PREFIX.to_string(),
            separator: ENV_SEPARATOR,
        });

        Self::with_sources(sources)
    }

    /// 使用指定的配置源创建配置管理器
    pub fn with_sources(sources: Vec<ConfigSource>) -> Result<Self> {
        let mut builder = Config::builder();
        let mut sources_info = Vec::new();

        for (index, source) in sources.into_iter().enumerate() {
            let priority = u8::try_from(index + 1).unwrap_or(u8::MAX);
            let source_info = source.get_source_info(priority);

            // 可选文件不存在时只记录，不加入构建器
            if let ConfigSource::File { path, required, .. } = &source {
                let file_exists = std::path::Path::new(path).exists();
                if !file_exists {
                    if *required {
                        return Err(ConfigError::FileNotFound { path: path.clone() }.into());
                    }
                    debug!("可选配置文件不存在，跳过: {}", path);
                    sources_info.push(source_info);
                    continue;
                }
            }

            builder = source
                .add_to_builder(builder)
                .map_err(|e| anyhow!("添加配置源失败: {}", e))?;
            sources_info.push(ConfigSourceInfo {
                loaded: true,
                ..source_info
            });
        }

        let config = builder
            .build()
            .map_err(|e| anyhow!("构建配置失败: {}", e))?;

        Ok(Self {
            config,
            sources_info,
        })
    }

    /// 获取指定 key 的配置值
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.config
            .get(key)
            .map_err(|e| anyhow!("获取配置 '{}' 失败: {}", key, e))
    }

    /// 获取指定 key 的配置值，如果不存在返回默认值
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// 获取字符串配置值
    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    /// 获取字符串列表。
    /// 既接受 TOML 数组，也接受逗号分隔的字符串（来自环境变量时）。
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        if let Ok(list) = self.config.get::<Vec<String>>(key) {
            return Some(list);
        }
        self.config
            .get::<String>(key)
            .ok()
            .map(|raw| split_list(&raw))
    }

    /// 检查配置项是否存在
    pub fn exists(&self, key: &str) -> bool {
        self.config.get::<serde_json::Value>(key).is_ok()
    }

    /// 获取配置源统计信息 (总数, 已加载, 未加载)
    pub fn get_sources_stats(&self) -> (usize, usize, usize) {
        let total = self.sources_info.len();
        let loaded = self.sources_info.iter().filter(|info| info.loaded).count();
        (total, loaded, total - loaded)
    }

    /// 记录配置源详细信息
    pub fn log_sources_info(&self) {
        for info in &self.sources_info {
            debug!(
                source_type = %info.source_type,
                priority = info.priority,
                loaded = info.loaded,
                "{}",
                info.description
            );
        }
        let (total, loaded, skipped) = self.get_sources_stats();
        debug!("配置源统计: 总计 {} 个，加载 {} 个，跳过 {} 个", total, loaded, skipped);
    }
}

/// 将逗号分隔的字符串拆分为去空白、非空的列表
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// 配置源类型
pub enum ConfigSource {
    /// 文件配置源
    File {
        path: String,
        format: Option<FileFormat>,
        required: bool,
    },
    /// 环境变量配置源
    Env {
        prefix: String,
        separator: &'static str,
    },
    /// 字符串配置源
    String { content: String, format: FileFormat },
}

impl ConfigSource {
    /// 获取配置源信息
    pub fn get_source_info(&self, priority: u8) -> ConfigSourceInfo {
        let (source_type, description) = match self {
            ConfigSource::File {
                path,
                format,
                required,
            } => (
                "File",
                format!(
                    "文件配置源: {} (格式: {}, 必需: {})",
                    path,
                    format.map(format_name).unwrap_or("Auto-detect"),
                    required
                ),
            ),
            ConfigSource::Env { prefix, separator } => (
                "Environment",
                format!("环境变量配置源: 前缀={}, 分隔符={}", prefix, separator),
            ),
            ConfigSource::String { format, .. } => (
                "String",
                format!("字符串配置源: 格式={}", format_name(*format)),
            ),
        };

        ConfigSourceInfo {
            source_type: source_type.to_string(),
            description,
            priority,
            loaded: false,
        }
    }

    pub fn add_to_builder(
        self,
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<ConfigBuilder<config::builder::DefaultState>> {
        match self {
            ConfigSource::File {
                path,
                format,
                required,
            } => {
                let file_source = match format {
                    Some(format) => File::with_name(&path).format(format),
                    None => File::with_name(&path),
                };
                Ok(builder.add_source(file_source.required(required)))
            }
            ConfigSource::Env { prefix, separator } => Ok(builder.add_source(
                Environment::with_prefix(&prefix)
                    .prefix_separator("_")
                    .separator(separator)
                    .try_parsing(true)
                    .ignore_empty(true),
            )),
            ConfigSource::String { content, format } => {
                Ok(builder.add_source(File::from_str(&content, format)))
            }
        }
    }
}

fn format_name(format: FileFormat) -> &'static str {
    match format {
        FileFormat::Toml => "TOML",
        FileFormat::Json => "JSON",
        FileFormat::Yaml => "YAML",
        FileFormat::Ini => "INI",
        FileFormat::Ron => "RON",
        FileFormat::Json5 => "JSON5",
        _ => "Unknown",
    }
}

/// 获取全局配置管理器实例（单例模式）
pub fn get_global_config_manager() -> Result<Arc<ConfigManager>> {
    {
        let manager = GLOBAL_CONFIG_MANAGER
            .read()
            .map_err(|e| anyhow!("读取全局配置管理器锁失败: {}", e))?;
        if let Some(config_manager) = manager.as_ref() {
            return Ok(Arc::clone(config_manager));
        }
    }

    let mut manager = GLOBAL_CONFIG_MANAGER
        .write()
        .map_err(|e| anyhow!("获取全局配置管理器写锁失败: {}", e))?;
    if let Some(config_manager) = manager.as_ref() {
        return Ok(Arc::clone(config_manager));
    }

    let env_loader = EnvironmentConfigLoader::new();
    let config_manager = Arc::new(
        ConfigManager::from_environment(&env_loader)
            .map_err(|e| anyhow!("创建配置管理器失败: {}", e))?,
    );
    *manager = Some(Arc::clone(&config_manager));
    Ok(config_manager)
}
