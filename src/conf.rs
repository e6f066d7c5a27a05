//! Sa-Token 配置初始化

use crate::comm::session_listener::SessionListener;
use crate::comm::settings::AuthSettings;
use anyhow::Result;
use sa_token_core::config::TokenStyle;
use sa_token_core::{SaTokenConfig, SaTokenManager};
use sa_token_storage_memory::MemoryStorage;
use std::sync::Arc;

/// Redis 中会话键的前缀
pub const REDIS_KEY_PREFIX: &str = "genai:session:";

/// 初始化 Sa-Token
///
/// `auth.storage` 为 `redis` 且配置了 `auth.redis_url` 时使用 Redis 存储，
/// 否则使用内存存储
pub async fn init_sa_token(auth: &AuthSettings) -> Result<Arc<SaTokenManager>> {
    let mut config_builder = SaTokenConfig::builder()
        .token_name(auth.token_name.clone())
        .timeout(auth.timeout_seconds)
        .register_listener(Arc::new(SessionListener))
        .token_style(TokenStyle::Random64)
        .auto_renew(true);

    let redis_url = auth
        .redis_url
        .as_deref()
        .filter(|_| auth.storage.eq_ignore_ascii_case("redis"));

    if let Some(_redis_url) = redis_url {
        #[cfg(feature = "redis")]
        {
            use sa_token_storage_redis::{RedisConfig, RedisStorage};

            let redis_storage = RedisStorage::new(RedisConfig {
                url: _redis_url.to_string(),
                prefix: REDIS_KEY_PREFIX.to_string(),
            })
            .await?;

            config_builder = config_builder.storage(Arc::new(redis_storage));
            tracing::info!("会话存储: Redis");
        }

        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!("未启用 redis 特性，会话回退到内存存储");
            config_builder = config_builder.storage(Arc::new(MemoryStorage::new()));
        }
    } else {
        config_builder = config_builder.storage(Arc::new(MemoryStorage::new()));
        tracing::debug!("会话存储: 内存");
    }

    let manager = config_builder.build();

    Ok(Arc::new(manager))
}
