//! 密码哈希与强度校验
//!
//! 哈希使用 Argon2id，结果以 PHC 字符串保存。请求处理中使用 `*_async`
//! 版本，计算放到阻塞线程池，不占用 actix 工作线程。

use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash, PasswordHasher,
    PasswordVerifier, Version,
};
use lazy_static::lazy_static;
use regex::Regex;

/// 密码最小长度
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// 常见弱密码（小写）
const COMMON_PASSWORDS: &[&str] = &[
    "123456", "12345678", "123456789", "1234567890", "password", "password1", "password123",
    "qwerty", "qwerty123", "qwertyuiop", "abc123", "111111", "000000", "iloveyou", "admin",
    "admin123", "welcome", "welcome1", "letmein", "monkey", "dragon", "football", "baseball",
    "sunshine", "princess", "starwars", "whatever", "trustno1", "passw0rd", "changeme",
    "1q2w3e4r", "zaq12wsx", "superman", "master", "hello123",
];

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"\W+").expect("static regex");
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("密码哈希参数无效: {0}")]
    Params(String),
    #[error("密码哈希失败: {0}")]
    Hash(String),
    #[error("密码哈希任务失败: {0}")]
    Task(String),
}

/// 密码哈希器
#[derive(Clone)]
pub struct Passwords {
    argon2: Argon2<'static>,
}

impl Passwords {
    /// 使用 Argon2 推荐参数
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// 自定义代价参数（内存 KiB、迭代次数）
    pub fn with_cost(memory_kib: u32, iterations: u32) -> Result<Self, PasswordError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| PasswordError::Params(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// 生成 PHC 格式哈希
    pub fn hash(&self, raw: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut rand_core::OsRng);
        self.argon2
            .hash_password(raw.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::Hash(e.to_string()))
    }

    /// 校验密码；哈希无法解析时视为不匹配
    pub fn verify(&self, raw: &str, stored_hash: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => self.argon2.verify_password(raw.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }

    /// 在阻塞线程池中生成哈希
    pub async fn hash_async(&self, raw: &str) -> Result<String, PasswordError> {
        let passwords = self.clone();
        let raw = raw.to_string();
        tokio::task::spawn_blocking(move || passwords.hash(&raw))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }

    /// 在阻塞线程池中校验密码
    pub async fn verify_async(&self, raw: &str, stored_hash: &str) -> bool {
        let passwords = self.clone();
        let raw = raw.to_string();
        let stored_hash = stored_hash.to_string();
        match tokio::task::spawn_blocking(move || passwords.verify(&raw, &stored_hash)).await {
            Ok(matched) => matched,
            Err(e) => {
                tracing::error!("密码校验任务失败: {}", e);
                false
            }
        }
    }

    /// 用户不存在时也做一次哈希，使耗时与存在时相近
    pub async fn burn_time(&self, raw: &str) {
        let _ = self.hash_async(raw).await;
    }
}

impl Default for Passwords {
    fn default() -> Self {
        Self::new()
    }
}

/// 按顺序执行全部强度规则，返回所有不满足的提示
pub fn validate_password(password: &str, username: &str, email: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(message) = check_similarity(password, username, email) {
        errors.push(message);
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(format!(
            "This password is too short. It must contain at least {} characters.",
            MIN_PASSWORD_LENGTH
        ));
    }

    if COMMON_PASSWORDS.contains(&password.trim().to_lowercase().as_str()) {
        errors.push("This password is too common.".to_string());
    }

    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.push("This password is entirely numeric.".to_string());
    }

    errors
}

/// 与用户名或邮箱（及其拆分片段）过于相似
fn check_similarity(password: &str, username: &str, email: &str) -> Option<String> {
    let password = password.to_lowercase();
    if password.is_empty() {
        return None;
    }

    let attributes = [("username", username), ("email address", email)];
    for (label, value) in attributes {
        let value = value.to_lowercase();
        // 整体至少 3 个字符，拆分片段至少 4 个字符（跳过 com、org 之类）
        let whole = Some(value.as_str()).filter(|v| v.chars().count() >= 3);
        let parts = NON_WORD.split(&value).filter(|p| p.chars().count() >= 4);
        for part in whole.into_iter().chain(parts) {
            if password.contains(part) || part.contains(password.as_str()) {
                return Some(format!("The password is too similar to the {}.", label));
            }
        }
    }
    None
}
