//! 用户持久化
//!
//! `memory` 引擎用于开发与测试，`postgresql` 引擎用于生产。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::models::{NewUser, User};
use crate::comm::settings::{DatabaseSettings, ENGINE_MEMORY, ENGINE_POSTGRESQL};
use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("用户名已存在: {0}")]
    DuplicateUsername(String),
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::database(err.to_string())
    }
}

/// 用户存储
#[async_trait]
pub trait UserStore: Send + Sync {
    /// 创建用户；用户名已存在时返回 `DuplicateUsername`
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.find_by_username(username).await?.is_some())
    }
}

/// 按配置的数据库引擎创建用户存储
pub async fn connect_user_store(database: &DatabaseSettings) -> Result<Arc<dyn UserStore>, AppError> {
    let engine = database.engine.to_lowercase();

    if engine.contains(ENGINE_POSTGRESQL) {
        let url = database.url.as_deref().ok_or_else(|| {
            AppError::validation("database.url", "postgresql 引擎需要 DATABASE_URL")
        })?;
        let store = PgUserStore::connect(url, database.max_connections).await?;
        store.migrate().await?;
        info!("用户存储: PostgreSQL ({})", database.masked_url().unwrap_or_default());
        return Ok(Arc::new(store));
    }

    if engine.contains(ENGINE_MEMORY) {
        info!("用户存储: 内存（仅用于开发）");
        return Ok(Arc::new(MemoryUserStore::new()));
    }

    Err(AppError::validation(
        "database.engine",
        format!("不支持的数据库引擎: {}", database.engine),
    ))
}

/// 内存用户存储
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == new_user.username) {
            return Err(StoreError::DuplicateUsername(new_user.username));
        }

        let user = User::from_new(new_user);
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.users.read().await.len())
    }
}

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    username VARCHAR(150) NOT NULL UNIQUE,
    email VARCHAR(254) NOT NULL,
    first_name VARCHAR(150) NOT NULL DEFAULT '',
    last_name VARCHAR(150) NOT NULL DEFAULT '',
    password_hash TEXT NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    date_joined TIMESTAMPTZ NOT NULL,
    last_login TIMESTAMPTZ NULL
)
"#;

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, password_hash, is_active, date_joined, last_login";

/// PostgreSQL 用户存储
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 建表（幂等）
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_USERS_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let user = User::from_new(new_user);
        let result = sqlx::query(
            "INSERT INTO users (id, username, email, first_name, last_name, password_hash, is_active, date_joined, last_login) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.date_joined)
        .bind(user.last_login)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(user),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateUsername(user.username))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: "$argon2id$stub".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = MemoryUserStore::new();
        let user = store.create_user(new_user("ada")).await.unwrap();

        let by_name = store.find_by_username("ada").await.unwrap().unwrap();
        let by_id = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(by_name, user);
        assert_eq!(by_id, user);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = MemoryUserStore::new();
        store.create_user(new_user("ada")).await.unwrap();

        let err = store.create_user(new_user("ada")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername(name) if name == "ada"));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_usernames_are_case_sensitive() {
        let store = MemoryUserStore::new();
        store.create_user(new_user("ada")).await.unwrap();
        assert!(store.create_user(new_user("Ada")).await.is_ok());
        assert!(!store.username_exists("ADA").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_last_login() {
        let store = MemoryUserStore::new();
        let user = store.create_user(new_user("ada")).await.unwrap();
        let now = Utc::now();

        store.update_last_login(user.id, now).await.unwrap();
        let user = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.last_login, Some(now));
    }

    #[tokio::test]
    async fn test_connect_memory_engine() {
        let store = connect_user_store(&DatabaseSettings::default()).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_postgres_engine_requires_url() {
        let settings = DatabaseSettings {
            engine: ENGINE_POSTGRESQL.to_string(),
            url: None,
            max_connections: 5,
        };
        let err = connect_user_store(&settings).await.err().unwrap();
        assert!(err.to_string().contains("database.url"));
    }

    #[tokio::test]
    async fn test_unknown_engine_rejected() {
        let settings = DatabaseSettings {
            engine: "sqlite".to_string(),
            url: None,
            max_connections: 5,
        };
        assert!(connect_user_store(&settings).await.is_err());
    }
}
