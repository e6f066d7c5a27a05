use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// 用户
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// 由注册数据创建新用户
    pub fn from_new(new_user: NewUser) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            first_name: String::new(),
            last_name: String::new(),
            password_hash: new_user.password_hash,
            is_active: true,
            date_joined: Utc::now(),
            last_login: None,
        }
    }

    /// 全名，未填写时使用用户名
    pub fn display_name(&self) -> String {
        let full_name = format!("{} {}", self.first_name, self.last_name);
        let full_name = full_name.trim();
        if full_name.is_empty() {
            self.username.clone()
        } else {
            full_name.to_string()
        }
    }
}

/// 待持久化的新用户（密码已哈希）
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// 对外暴露的用户资料，不含密码哈希
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            display_name: user.display_name(),
            date_joined: user.date_joined,
            last_login: user.last_login,
        }
    }
}
