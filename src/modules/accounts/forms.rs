//! 注册与登录表单
//!
//! 校验失败以 [`FormErrors`] 作为值返回，只有存储层故障才是 `Err`。

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::models::{NewUser, User};
use super::password::{validate_password, Passwords};
use super::store::{StoreError, UserStore};

/// 用户名最大长度
pub const USERNAME_MAX_LENGTH: usize = 150;
/// 邮箱最大长度
pub const EMAIL_MAX_LENGTH: usize = 254;

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_USERNAME: &str = "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
pub const DUPLICATE_USERNAME: &str = "A user with that username already exists.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const PASSWORD_MISMATCH: &str = "The two password fields didn’t match.";
pub const INVALID_LOGIN: &str = "Please enter a correct username and password. Note that both fields may be case-sensitive.";

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]+$").expect("static regex");
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$").expect("static regex");
}

/// 字段错误与非字段错误
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormErrors {
    fields: BTreeMap<String, Vec<String>>,
    non_field: Vec<String>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.non_field.push(message.into());
    }

    pub fn field(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_field(&self, field: &str) -> bool {
        !self.field(field).is_empty()
    }

    pub fn non_field(&self) -> &[String] {
        &self.non_field
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.non_field.is_empty()
    }

    /// 所有错误信息，先非字段错误
    pub fn messages(&self) -> impl Iterator<Item = &String> {
        self.non_field.iter().chain(self.fields.values().flatten())
    }
}

/// 注册表单
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignUpForm {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
    #[serde(rename = "csrfmiddlewaretoken")]
    pub csrf_token: Option<String>,
}

impl SignUpForm {
    /// 校验并生成待持久化的用户（含密码哈希）
    pub async fn validate(
        &self,
        users: &dyn UserStore,
        passwords: &Passwords,
    ) -> Result<Result<NewUser, FormErrors>, StoreError> {
        let mut errors = FormErrors::new();

        let username = self.username.trim();
        if username.is_empty() {
            errors.add("username", REQUIRED);
        } else {
            let length = username.chars().count();
            if length > USERNAME_MAX_LENGTH {
                errors.add(
                    "username",
                    format!(
                        "Ensure this value has at most {} characters (it has {}).",
                        USERNAME_MAX_LENGTH, length
                    ),
                );
            }
            if !USERNAME_RE.is_match(username) {
                errors.add("username", INVALID_USERNAME);
            }
            if !errors.has_field("username") && users.username_exists(username).await? {
                errors.add("username", DUPLICATE_USERNAME);
            }
        }

        let email = normalize_email(self.email.trim());
        if email.is_empty() {
            errors.add("email", REQUIRED);
        } else if email.chars().count() > EMAIL_MAX_LENGTH || !EMAIL_RE.is_match(&email) {
            errors.add("email", INVALID_EMAIL);
        }

        if self.password1.is_empty() {
            errors.add("password1", REQUIRED);
        }
        if self.password2.is_empty() {
            errors.add("password2", REQUIRED);
        }

        if !self.password1.is_empty() && !self.password2.is_empty() {
            if self.password1 != self.password2 {
                errors.add("password2", PASSWORD_MISMATCH);
            } else {
                for message in validate_password(&self.password2, username, &email) {
                    errors.add("password2", message);
                }
            }
        }

        if !errors.is_empty() {
            return Ok(Err(errors));
        }

        match passwords.hash_async(&self.password1).await {
            Ok(password_hash) => Ok(Ok(NewUser {
                username: username.to_string(),
                email,
                password_hash,
            })),
            Err(e) => {
                tracing::error!("密码哈希失败: {}", e);
                errors.add_non_field("Unable to create the account right now. Please try again.");
                Ok(Err(errors))
            }
        }
    }
}

/// 登录表单
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    /// 登录后跳转地址
    pub next: Option<String>,
    #[serde(rename = "csrfmiddlewaretoken")]
    pub csrf_token: Option<String>,
}

impl LoginForm {
    /// 校验凭据，成功时返回对应的启用用户
    pub async fn authenticate(
        &self,
        users: &dyn UserStore,
        passwords: &Passwords,
    ) -> Result<Result<User, FormErrors>, StoreError> {
        let mut errors = FormErrors::new();

        let username = self.username.trim();
        if username.is_empty() {
            errors.add("username", REQUIRED);
        }
        if self.password.is_empty() {
            errors.add("password", REQUIRED);
        }
        if !errors.is_empty() {
            return Ok(Err(errors));
        }

        let user = match users.find_by_username(username).await? {
            Some(user) => user,
            None => {
                passwords.burn_time(&self.password).await;
                errors.add_non_field(INVALID_LOGIN);
                return Ok(Err(errors));
            }
        };

        if !passwords.verify_async(&self.password, &user.password_hash).await || !user.is_active {
            errors.add_non_field(INVALID_LOGIN);
            return Ok(Err(errors));
        }

        Ok(Ok(user))
    }
}

/// 邮箱域名部分转小写
pub fn normalize_email(email: &str) -> String {
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}
