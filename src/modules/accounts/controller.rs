use actix_web::{cookie::Cookie, http::header, web, HttpRequest, HttpResponse};
use chrono::Utc;
use sa_token_plugin_actix_web::SaTokenState;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::csrf::{verify_csrf, CsrfForm, CsrfToken};
use super::forms::{FormErrors, LoginForm, SignUpForm};
use super::models::UserProfile;
use super::pages::{self, html_response};
use super::session::{current_user, end_session, removal_cookie, request_token, session_cookie, start_session};
use super::store::StoreError;
use super::AccountsState;
use crate::error::AppResult;

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

/// 站内相对路径才允许作为跳转目标
pub fn is_safe_redirect(target: &str) -> bool {
    target.starts_with('/')
        && !target.starts_with("//")
        && !target.contains('\\')
        && !target.chars().any(char::is_control)
}

fn redirect(location: &str, cookies: Vec<Cookie<'static>>) -> HttpResponse {
    let mut builder = HttpResponse::Found();
    builder.insert_header((header::LOCATION, location));
    for cookie in cookies {
        builder.cookie(cookie);
    }
    builder.finish()
}

/// 登录成功：下发会话 cookie，并轮换 CSRF 令牌
fn login_redirect(location: &str, accounts: &AccountsState, token: String) -> HttpResponse {
    let mut cookies = vec![session_cookie(accounts, token)];
    cookies.extend(CsrfToken::generate().cookie(accounts.secure_cookies));
    redirect(location, cookies)
}

/// 注册页
#[actix_web::get("/accounts/signup/")]
pub async fn signup_form(req: HttpRequest, accounts: web::Data<AccountsState>) -> HttpResponse {
    let csrf = CsrfToken::from_request(&req);
    let body = pages::signup_page("", "", &FormErrors::new(), csrf.value());
    html_response(body, &csrf, accounts.secure_cookies)
}

/// 提交注册
#[actix_web::post("/accounts/signup/")]
pub async fn signup(
    req: HttpRequest,
    form: web::Form<SignUpForm>,
    accounts: web::Data<AccountsState>,
    sa_token: web::Data<SaTokenState>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    verify_csrf(&req, form.csrf_token.as_deref())?;
    let csrf = CsrfToken::from_request(&req);

    let new_user = match form.validate(accounts.users.as_ref(), &accounts.passwords).await? {
        Ok(new_user) => new_user,
        Err(errors) => {
            debug!("注册校验失败: {:?}", errors.messages().collect::<Vec<_>>());
            let body = pages::signup_page(&form.username, &form.email, &errors, csrf.value());
            return Ok(html_response(body, &csrf, accounts.secure_cookies));
        }
    };

    // 校验与写入之间可能被并发注册抢先
    let user = match accounts.users.create_user(new_user).await {
        Ok(user) => user,
        Err(StoreError::DuplicateUsername(_)) => {
            let mut errors = FormErrors::new();
            errors.add("username", super::forms::DUPLICATE_USERNAME);
            let body = pages::signup_page(&form.username, &form.email, &errors, csrf.value());
            return Ok(html_response(body, &csrf, accounts.secure_cookies));
        }
        Err(e) => return Err(e.into()),
    };
    info!("新用户注册: {}", user.username);

    let token = start_session(&sa_token, &user).await?;
    accounts.users.update_last_login(user.id, Utc::now()).await?;

    Ok(login_redirect(&accounts.auth.login_redirect_url, &accounts, token))
}

/// 登录页
#[actix_web::get("/accounts/login/")]
pub async fn login_form(
    req: HttpRequest,
    query: web::Query<NextQuery>,
    accounts: web::Data<AccountsState>,
) -> HttpResponse {
    let csrf = CsrfToken::from_request(&req);
    let next = query.next.as_deref().filter(|next| is_safe_redirect(next));
    let body = pages::login_page("", next, &FormErrors::new(), csrf.value());
    html_response(body, &csrf, accounts.secure_cookies)
}

/// 提交登录
#[actix_web::post("/accounts/login/")]
pub async fn login(
    req: HttpRequest,
    form: web::Form<LoginForm>,
    accounts: web::Data<AccountsState>,
    sa_token: web::Data<SaTokenState>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    verify_csrf(&req, form.csrf_token.as_deref())?;
    let next = form.next.as_deref().filter(|next| is_safe_redirect(next));

    let user = match form.authenticate(accounts.users.as_ref(), &accounts.passwords).await? {
        Ok(user) => user,
        Err(errors) => {
            warn!("登录失败: {}", form.username.trim());
            let csrf = CsrfToken::from_request(&req);
            let body = pages::login_page(&form.username, next, &errors, csrf.value());
            return Ok(html_response(body, &csrf, accounts.secure_cookies));
        }
    };

    accounts.users.update_last_login(user.id, Utc::now()).await?;
    let token = start_session(&sa_token, &user).await?;

    let target = next.unwrap_or(&accounts.auth.login_redirect_url);
    Ok(login_redirect(target, &accounts, token))
}

/// 注销
#[actix_web::post("/accounts/logout/")]
pub async fn logout(
    req: HttpRequest,
    form: Option<web::Form<CsrfForm>>,
    accounts: web::Data<AccountsState>,
    sa_token: web::Data<SaTokenState>,
) -> AppResult<HttpResponse> {
    let submitted = form.as_ref().and_then(|form| form.csrf_token.as_deref());
    verify_csrf(&req, submitted)?;

    if let Some(token) = request_token(&req, &accounts.auth.token_name) {
        end_session(&sa_token, &token).await;
    }
    Ok(redirect(&accounts.auth.login_url, vec![removal_cookie(&accounts)]))
}

/// 个人资料，未登录时跳转到登录页
#[actix_web::get("/accounts/profile/")]
pub async fn profile(
    req: HttpRequest,
    accounts: web::Data<AccountsState>,
    sa_token: web::Data<SaTokenState>,
) -> AppResult<HttpResponse> {
    match current_user(&req, &sa_token, &accounts).await? {
        Some(user) => {
            let csrf = CsrfToken::from_request(&req);
            let body = pages::profile_page(&user, csrf.value());
            Ok(html_response(body, &csrf, accounts.secure_cookies))
        }
        None => {
            let path = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or_else(|| req.path());
            let location = format!("{}?next={}", accounts.auth.login_url, urlencoding::encode(path));
            Ok(redirect(&location, Vec::new()))
        }
    }
}

/// 当前用户资料（JSON）
#[utoipa::path(
    get,
    path = "/api/me",
    tag = "accounts",
    responses(
        (status = 200, description = "当前登录用户", body = UserProfile),
        (status = 401, description = "未登录")
    )
)]
#[actix_web::get("/api/me")]
pub async fn me(
    req: HttpRequest,
    accounts: web::Data<AccountsState>,
    sa_token: web::Data<SaTokenState>,
) -> AppResult<HttpResponse> {
    match current_user(&req, &sa_token, &accounts).await? {
        Some(user) => Ok(HttpResponse::Ok().json(UserProfile::from(&user))),
        None => Ok(HttpResponse::Unauthorized()
            .json(json!({ "detail": "Authentication credentials were not provided." }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::settings::AuthSettings;
    use crate::conf::init_sa_token;
    use crate::modules::accounts::csrf::{CSRF_COOKIE, CSRF_FIELD};
    use crate::modules::accounts::forms::{INVALID_LOGIN, PASSWORD_MISMATCH};
    use crate::modules::accounts::models::NewUser;
    use crate::modules::accounts::password::Passwords;
    use crate::modules::accounts::routes::configure_accounts_routes;
    use crate::modules::accounts::store::{MemoryUserStore, UserStore};
    use actix_web::{dev::ServiceResponse, test, App};
    use std::sync::Arc;

    const PASSWORD: &str = "tangerine-Orbit-42";
    const CSRF: &str = "0123456789abcdef0123456789abcdef";

    /// 带 CSRF cookie 的 POST 请求
    fn post(uri: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .cookie(Cookie::new(CSRF_COOKIE, CSRF))
    }

    struct Fixture {
        accounts: web::Data<AccountsState>,
        sa_token: web::Data<SaTokenState>,
    }

    async fn fixture() -> Fixture {
        let auth = AuthSettings::default();
        let manager = init_sa_token(&auth).await.unwrap();
        Fixture {
            accounts: web::Data::new(AccountsState {
                users: Arc::new(MemoryUserStore::new()),
                passwords: Arc::new(Passwords::with_cost(8, 1).unwrap()),
                auth,
                secure_cookies: false,
            }),
            sa_token: web::Data::new(SaTokenState { manager }),
        }
    }

    impl Fixture {
        async fn add_user(&self, username: &str) {
            let password_hash = self.accounts.passwords.hash(PASSWORD).unwrap();
            self.accounts
                .users
                .create_user(NewUser {
                    username: username.to_string(),
                    email: format!("{}@example.com", username),
                    password_hash,
                })
                .await
                .unwrap();
        }
    }

    macro_rules! app {
        ($fixture:expr) => {
            test::init_service(
                App::new()
                    .app_data($fixture.accounts.clone())
                    .app_data($fixture.sa_token.clone())
                    .configure(configure_accounts_routes),
            )
            .await
        };
    }

    fn session_token<B>(resp: &ServiceResponse<B>) -> Option<String> {
        resp.response()
            .cookies()
            .find(|c| c.name() == "genai_session")
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }

    fn location<B>(resp: &ServiceResponse<B>) -> String {
        resp.headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[::core::prelude::v1::test]
    fn test_safe_redirects() {
        assert!(is_safe_redirect("/accounts/profile/"));
        assert!(is_safe_redirect("/?tab=1"));
        assert!(!is_safe_redirect("//evil.example.com/"));
        assert!(!is_safe_redirect("https://evil.example.com/"));
        assert!(!is_safe_redirect("/\\evil.example.com"));
        assert!(!is_safe_redirect(""));
    }

    #[actix_web::test]
    async fn test_signup_creates_user_and_logs_in() {
        let fx = fixture().await;
        let app = app!(fx);

        let req = post("/accounts/signup/")
            .set_form([
                (CSRF_FIELD, CSRF),
                ("username", "ada"),
                ("email", "ada@example.com"),
                ("password1", PASSWORD),
                ("password2", PASSWORD),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 302);
        assert_eq!(location(&resp), "/");
        let token = session_token(&resp).unwrap();
        assert!(fx
            .sa_token
            .manager
            .is_valid(&sa_token_core::TokenValue::new(token))
            .await);
        assert_eq!(fx.accounts.users.count().await.unwrap(), 1);
    }

    #[actix_web::test]
    async fn test_signup_password_mismatch_creates_nothing() {
        let fx = fixture().await;
        let app = app!(fx);

        let req = post("/accounts/signup/")
            .set_form([
                (CSRF_FIELD, CSRF),
                ("username", "ada"),
                ("email", "ada@example.com"),
                ("password1", PASSWORD),
                ("password2", "something-else-99"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 200);
        assert!(session_token(&resp).is_none());
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains(PASSWORD_MISMATCH));
        assert_eq!(fx.accounts.users.count().await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn test_signup_duplicate_username() {
        let fx = fixture().await;
        fx.add_user("ada").await;
        let app = app!(fx);

        let req = post("/accounts/signup/")
            .set_form([
                (CSRF_FIELD, CSRF),
                ("username", "ada"),
                ("email", "other@example.com"),
                ("password1", PASSWORD),
                ("password2", PASSWORD),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 200);
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains("A user with that username already exists."));
        assert_eq!(fx.accounts.users.count().await.unwrap(), 1);
    }

    #[actix_web::test]
    async fn test_login_wrong_password() {
        let fx = fixture().await;
        fx.add_user("ada").await;
        let app = app!(fx);

        let req = post("/accounts/login/")
            .set_form([(CSRF_FIELD, CSRF), ("username", "ada"), ("password", "wrong-password")])
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 200);
        assert!(session_token(&resp).is_none());
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains(INVALID_LOGIN));
    }

    #[actix_web::test]
    async fn test_login_honours_safe_next_only() {
        let fx = fixture().await;
        fx.add_user("ada").await;
        let app = app!(fx);

        let req = post("/accounts/login/")
            .set_form([
                (CSRF_FIELD, CSRF),
                ("username", "ada"),
                ("password", PASSWORD),
                ("next", "/accounts/profile/"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 302);
        assert_eq!(location(&resp), "/accounts/profile/");

        let req = post("/accounts/login/")
            .set_form([
                (CSRF_FIELD, CSRF),
                ("username", "ada"),
                ("password", PASSWORD),
                ("next", "https://evil.example.com/"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 302);
        assert_eq!(location(&resp), "/");

        let user = fx.accounts.users.find_by_username("ada").await.unwrap().unwrap();
        assert!(user.last_login.is_some());
    }

    #[actix_web::test]
    async fn test_profile_requires_login() {
        let fx = fixture().await;
        let app = app!(fx);

        let req = test::TestRequest::get().uri("/accounts/profile/").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 302);
        assert_eq!(
            location(&resp),
            "/accounts/login/?next=%2Faccounts%2Fprofile%2F"
        );
    }

    #[actix_web::test]
    async fn test_profile_with_session_and_logout() {
        let fx = fixture().await;
        fx.add_user("ada").await;
        let app = app!(fx);

        let req = post("/accounts/login/")
            .set_form([(CSRF_FIELD, CSRF), ("username", "ada"), ("password", PASSWORD)])
            .to_request();
        let resp = test::call_service(&app, req).await;
        let token = session_token(&resp).unwrap();

        let req = test::TestRequest::get()
            .uri("/accounts/profile/")
            .cookie(Cookie::new("genai_session", token.clone()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains("ada@example.com"));

        let req = post("/accounts/logout/")
            .cookie(Cookie::new("genai_session", token.clone()))
            .set_form([(CSRF_FIELD, CSRF)])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 302);
        assert_eq!(location(&resp), "/accounts/login/");

        let req = test::TestRequest::get()
            .uri("/accounts/profile/")
            .cookie(Cookie::new("genai_session", token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 302);
    }

    #[actix_web::test]
    async fn test_form_pages_issue_csrf_cookie() {
        let fx = fixture().await;
        let app = app!(fx);

        let req = test::TestRequest::get().uri("/accounts/login/").to_request();
        let resp = test::call_service(&app, req).await;
        let issued = resp
            .response()
            .cookies()
            .find(|c| c.name() == CSRF_COOKIE)
            .map(|c| c.value().to_string())
            .unwrap();
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains(&issued));

        // 已有令牌时沿用，不再下发
        let req = test::TestRequest::get()
            .uri("/accounts/signup/")
            .cookie(Cookie::new(CSRF_COOKIE, CSRF))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.response().cookies().all(|c| c.name() != CSRF_COOKIE));
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains(CSRF));
    }

    #[actix_web::test]
    async fn test_signup_without_csrf_token_is_rejected() {
        let fx = fixture().await;
        let app = app!(fx);

        let req = test::TestRequest::post()
            .uri("/accounts/signup/")
            .set_form([
                ("username", "ada"),
                ("email", "ada@example.com"),
                ("password1", PASSWORD),
                ("password2", PASSWORD),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 403);
        assert!(session_token(&resp).is_none());
        assert_eq!(fx.accounts.users.count().await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn test_login_with_foreign_csrf_token_is_rejected() {
        let fx = fixture().await;
        fx.add_user("ada").await;
        let app = app!(fx);

        let req = post("/accounts/login/")
            .set_form([
                (CSRF_FIELD, "fedcba9876543210fedcba9876543210"),
                ("username", "ada"),
                ("password", PASSWORD),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 403);
        assert!(session_token(&resp).is_none());
    }

    #[actix_web::test]
    async fn test_login_rotates_csrf_token() {
        let fx = fixture().await;
        fx.add_user("ada").await;
        let app = app!(fx);

        let req = post("/accounts/login/")
            .set_form([(CSRF_FIELD, CSRF), ("username", "ada"), ("password", PASSWORD)])
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 302);
        let rotated = resp
            .response()
            .cookies()
            .find(|c| c.name() == CSRF_COOKIE)
            .map(|c| c.value().to_string())
            .unwrap();
        assert_ne!(rotated, CSRF);
    }

    #[actix_web::test]
    async fn test_api_me() {
        let fx = fixture().await;
        let app = app!(fx);

        let req = test::TestRequest::get().uri("/api/me").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);

        fx.add_user("ada").await;
        let user = fx.accounts.users.find_by_username("ada").await.unwrap().unwrap();
        let token = start_session(&fx.sa_token, &user).await.unwrap();

        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("genai_session", token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["username"], "ada");
        assert!(body.get("password_hash").is_none());
    }
}
