use actix_web::middleware::{Condition, Logger};
use actix_web::{web, App, HttpServer};
use sa_token_plugin_actix_web::{SaTokenMiddleware, SaTokenState};
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{error, info, instrument, warn};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::swagger::{ApiDoc, OPENAPI_JSON};
use crate::comm::config_validator::SettingsValidator;
use crate::comm::settings::{LoggingSettings, Settings};
use crate::conf::init_sa_token;
use crate::error::{AppError, AppResult};
use crate::middleware::{self as mw, SecurityConfig, SecurityMiddleware, StaticFiles, StaticFilesConfig};
use crate::modules::accounts::{password::Passwords, store::connect_user_store, AccountsState};
use crate::route_registry::{configure_global_routes, log_global_routes_info};

/// 初始化日志
///
/// `RUST_LOG` 优先于 `logging.level`；`to_stderr` 为 true 时日志写到 stderr，
/// 保证命令的 stdout 输出干净
pub fn init_tracing(logging: &LoggingSettings, to_stderr: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match (logging.json_format, to_stderr) {
        (true, false) => tracing::subscriber::set_global_default(
            Registry::default()
                .with(env_filter)
                .with(JsonStorageLayer)
                .with(BunyanFormattingLayer::new(crate::command_registry::APP_NAME.into(), std::io::stdout)),
        ),
        (true, true) => tracing::subscriber::set_global_default(
            Registry::default()
                .with(env_filter)
                .with(JsonStorageLayer)
                .with(BunyanFormattingLayer::new(crate::command_registry::APP_NAME.into(), std::io::stderr)),
        ),
        (false, false) => tracing::subscriber::set_global_default(
            Registry::default()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_target(false).compact()),
        ),
        (false, true) => tracing::subscriber::set_global_default(
            Registry::default().with(env_filter).with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .compact()
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    result.map_err(|e| anyhow::anyhow!("设置日志订阅器失败: {}", e))
}

/// 命令行对服务器配置的覆盖
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub workers: Option<usize>,
    pub debug: bool,
}

impl ServerOverrides {
    pub fn apply(self, settings: &mut Settings) {
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(workers) = self.workers {
            settings.server.workers = Some(workers);
        }
        if self.debug {
            settings.debug = true;
        }
    }
}

/// 应用启动器
pub struct AppBootstrap {
    settings: Settings,
}

impl AppBootstrap {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// 运行应用服务器
    #[instrument(skip(self))]
    pub async fn run(self) -> AppResult<()> {
        SettingsValidator::new().validate(&self.settings)?;
        self.settings.log_summary();

        // 初始化 Sa-Token（带超时和重试）
        let sa_token_manager = self.init_sa_token_with_retry().await?;
        let sa_token_data = web::Data::new(SaTokenState {
            manager: sa_token_manager,
        });

        let users = connect_user_store(&self.settings.database).await?;
        let accounts_data = web::Data::new(AccountsState {
            users,
            passwords: Arc::new(Passwords::new()),
            auth: self.settings.auth.clone(),
            secure_cookies: !self.settings.debug,
        });

        log_global_routes_info();

        match self.start_http_server(sa_token_data, accounts_data).await {
            Ok(()) => {
                info!("服务器已停止");
                Ok(())
            }
            Err(e) => {
                error!("服务器运行失败: {}", e);
                Err(e)
            }
        }
    }

    /// 带重试机制的 Sa-Token 初始化
    async fn init_sa_token_with_retry(&self) -> AppResult<Arc<sa_token_core::SaTokenManager>> {
        const MAX_RETRIES: u32 = 3;
        const TIMEOUT_DURATION: Duration = Duration::from_secs(30);

        let mut attempt = 1;
        loop {
            info!("Sa-Token初始化尝试 {}/{}", attempt, MAX_RETRIES);

            match timeout(TIMEOUT_DURATION, init_sa_token(&self.settings.auth)).await {
                Ok(Ok(manager)) => {
                    info!("Sa-Token初始化成功");
                    return Ok(manager);
                }
                Ok(Err(e)) => {
                    warn!("Sa-Token初始化失败 (尝试 {}): {}", attempt, e);
                    if attempt == MAX_RETRIES {
                        return Err(AppError::external_service("sa-token", e.to_string()));
                    }
                }
                Err(_) => {
                    warn!("Sa-Token初始化超时 (尝试 {})", attempt);
                    if attempt == MAX_RETRIES {
                        return Err(AppError::timeout("sa-token initialization"));
                    }
                }
            }

            // 指数退避
            let delay = Duration::from_millis(1000 * 2_u64.pow(attempt - 1));
            info!("等待 {:?} 后重试", delay);
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// 启动 HTTP 服务器
    async fn start_http_server(
        &self,
        sa_token_data: web::Data<SaTokenState>,
        accounts_data: web::Data<AccountsState>,
    ) -> AppResult<()> {
        let settings = self.settings.clone();
        let security = SecurityConfig::from_settings(&settings);
        let static_files = StaticFilesConfig::from_settings(&settings)
            .filter(|_| settings.uses_middleware(mw::STATIC_FILES));
        let docs_path = settings.api.rest.as_ref().map(|rest| rest.docs_path.clone());

        if settings.uses_middleware(mw::STATIC_FILES) && static_files.is_none() {
            warn!("已启用 static_files 中间件，但未配置 static_files.root");
        }
        if let Some(docs_path) = &docs_path {
            info!("REST 文档: {} ({})", docs_path, OPENAPI_JSON);
        }

        let use_security = settings.uses_middleware(mw::SECURITY);
        if !settings.debug && !use_security {
            warn!("未启用 security 中间件，allowed_hosts 不会生效");
        } else if !settings.debug && settings.allowed_hosts.is_empty() {
            warn!("allowed_hosts 为空，非调试模式下所有请求都会被拒绝");
        }
        let use_session = settings.uses_middleware(mw::SESSION);
        let use_logger = settings.uses_middleware(mw::LOGGER);

        let mut server = HttpServer::new(move || {
            let static_enabled = static_files.is_some();
            let static_config = static_files
                .clone()
                .unwrap_or_else(StaticFilesConfig::disabled);
            let docs_path = docs_path.clone();

            App::new()
                .app_data(sa_token_data.clone())
                .app_data(accounts_data.clone())
                .wrap(Condition::new(
                    use_session,
                    SaTokenMiddleware::new(sa_token_data.get_ref().clone()),
                ))
                .wrap(Condition::new(static_enabled, StaticFiles::new(static_config)))
                .wrap(Condition::new(use_security, SecurityMiddleware::new(security.clone())))
                .wrap(Condition::new(use_logger, Logger::default()))
                .configure(move |cfg| {
                    if let Some(docs_path) = docs_path {
                        let docs_path = docs_path.trim_end_matches('/').to_string();
                        cfg.service(
                            SwaggerUi::new(format!("{}/{{_:.*}}", docs_path))
                                .url(OPENAPI_JSON, ApiDoc::openapi()),
                        );
                    }
                })
                .configure(configure_global_routes)
        });
        if let Some(workers) = settings.server.workers {
            server = server.workers(workers);
        }

        let address = format!("{}:{}", settings.server.host, settings.server.port);
        info!("服务器监听 http://{}", address);

        server
            .bind(&address)
            .map_err(|e| AppError::Internal(anyhow::Error::new(e).context(format!("无法绑定 {}", address))))?
            .run()
            .await
            .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?;

        Ok(())
    }
}
