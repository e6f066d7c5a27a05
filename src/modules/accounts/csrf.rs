//! 表单 CSRF 防护（双重提交 cookie）
//!
//! 渲染表单时把令牌同时写入 cookie 与隐藏字段，提交时两者必须一致。

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::HttpRequest;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// CSRF cookie 名称
pub const CSRF_COOKIE: &str = "csrftoken";
/// 表单隐藏字段名称
pub const CSRF_FIELD: &str = "csrfmiddlewaretoken";
/// 非表单提交时使用的请求头
pub const CSRF_HEADER: &str = "x-csrftoken";

const TOKEN_LENGTH: usize = 32;
const COOKIE_MAX_AGE_DAYS: i64 = 365;

pub const REASON_NO_COOKIE: &str = "CSRF cookie not set.";
pub const REASON_BAD_TOKEN: &str = "CSRF token missing or incorrect.";

/// 只携带 CSRF 字段的表单（注销）
#[derive(Debug, Default, Deserialize)]
pub struct CsrfForm {
    #[serde(rename = "csrfmiddlewaretoken", default)]
    pub csrf_token: Option<String>,
}

/// 当前请求使用的 CSRF 令牌
#[derive(Debug, Clone)]
pub struct CsrfToken {
    value: String,
    /// 新生成、尚未写入 cookie
    fresh: bool,
}

impl CsrfToken {
    pub fn generate() -> Self {
        Self {
            value: Uuid::new_v4().simple().to_string(),
            fresh: true,
        }
    }

    /// 沿用请求 cookie 中的令牌，缺失或格式不对时重新生成
    pub fn from_request(req: &HttpRequest) -> Self {
        match cookie_token(req) {
            Some(value) => Self {
                value,
                fresh: false,
            },
            None => Self::generate(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// 新令牌需要下发的 cookie
    pub fn cookie(&self, secure: bool) -> Option<Cookie<'static>> {
        self.fresh.then(|| {
            Cookie::build(CSRF_COOKIE, self.value.clone())
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .secure(secure)
                .max_age(Duration::days(COOKIE_MAX_AGE_DAYS))
                .finish()
        })
    }
}

fn cookie_token(req: &HttpRequest) -> Option<String> {
    req.cookie(CSRF_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| is_well_formed(value))
}

fn is_well_formed(value: &str) -> bool {
    value.len() == TOKEN_LENGTH && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// 校验提交的令牌；表单字段缺失时读取 `X-CSRFToken` 请求头
pub fn verify_csrf(req: &HttpRequest, submitted: Option<&str>) -> AppResult<()> {
    let Some(expected) = cookie_token(req) else {
        warn!("CSRF 校验失败 ({}): {}", req.path(), REASON_NO_COOKIE);
        return Err(AppError::forbidden(REASON_NO_COOKIE));
    };

    let submitted = submitted
        .filter(|value| !value.is_empty())
        .or_else(|| {
            req.headers()
                .get(CSRF_HEADER)
                .and_then(|value| value.to_str().ok())
        })
        .unwrap_or_default();

    if !constant_time_eq(expected.as_bytes(), submitted.as_bytes()) {
        warn!("CSRF 校验失败 ({}): {}", req.path(), REASON_BAD_TOKEN);
        return Err(AppError::forbidden(REASON_BAD_TOKEN));
    }
    Ok(())
}
