//! 会话：sa-token 令牌 + cookie

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::HttpRequest;
use sa_token_core::TokenValue;
use sa_token_plugin_actix_web::SaTokenState;
use tracing::{debug, info};
use uuid::Uuid;

use super::models::User;
use super::AccountsState;
use crate::error::{AppError, AppResult};

/// 从 cookie 读取令牌，缺失时回退到同名请求头（允许 `Bearer ` 前缀）
pub fn request_token(req: &HttpRequest, token_name: &str) -> Option<String> {
    if let Some(cookie) = req.cookie(token_name) {
        let value = cookie.value().trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    req.headers()
        .get(token_name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// 为用户签发令牌
pub async fn start_session(sa_token: &SaTokenState, user: &User) -> AppResult<String> {
    let token = sa_token
        .manager
        .login(user.id.to_string())
        .await
        .map_err(|e| AppError::auth(format!("登录失败: {}", e)))?;

    info!("用户 {} 登录成功", user.username);
    Ok(token.to_string())
}

/// 使令牌失效；令牌本身已失效时忽略
pub async fn end_session(sa_token: &SaTokenState, token: &str) {
    let token = TokenValue::new(token.to_string());
    if let Err(e) = sa_token.manager.logout(&token).await {
        debug!("注销令牌失败（可能已过期）: {}", e);
    }
}

/// 当前请求的登录用户；令牌无效、过期或用户已停用时视为匿名
pub async fn current_user(
    req: &HttpRequest,
    sa_token: &SaTokenState,
    accounts: &AccountsState,
) -> AppResult<Option<User>> {
    let Some(raw) = request_token(req, &accounts.auth.token_name) else {
        return Ok(None);
    };

    let token = TokenValue::new(raw);
    if !sa_token.manager.is_valid(&token).await {
        return Ok(None);
    }

    let Ok(info) = sa_token.manager.get_token_info(&token).await else {
        return Ok(None);
    };
    let Ok(user_id) = Uuid::parse_str(&info.login_id) else {
        return Ok(None);
    };

    let user = accounts.users.find_by_id(user_id).await?;
    Ok(user.filter(|u| u.is_active))
}

/// 会话 cookie
pub fn session_cookie(accounts: &AccountsState, token: String) -> Cookie<'static> {
    Cookie::build(accounts.auth.token_name.clone(), token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(accounts.secure_cookies)
        .max_age(Duration::seconds(accounts.auth.timeout_seconds))
        .finish()
}

/// 清除会话 cookie
pub fn removal_cookie(accounts: &AccountsState) -> Cookie<'static> {
    let mut cookie = Cookie::build(accounts.auth.token_name.clone(), "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(accounts.secure_cookies)
        .finish();
    cookie.make_removal();
    cookie
}
