//! HTML 页面渲染
//!
//! 文本内容用 `encode_text` 转义，属性值用 `encode_double_quoted_attribute`。

use actix_web::HttpResponse;
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use super::csrf::{CsrfToken, CSRF_FIELD};
use super::forms::FormErrors;
use super::models::User;

/// 200 HTML 响应，新生成的 CSRF 令牌同时下发 cookie
pub fn html_response(body: String, csrf: &CsrfToken, secure: bool) -> HttpResponse {
    let mut builder = HttpResponse::Ok();
    builder.content_type("text/html; charset=utf-8");
    if let Some(cookie) = csrf.cookie(secure) {
        builder.cookie(cookie);
    }
    builder.body(body)
}

fn csrf_input(csrf: &str) -> String {
    format!(
        r#"<input type="hidden" name="{}" value="{}">"#,
        CSRF_FIELD,
        attr(csrf)
    )
}

fn layout(title: &str, user: Option<&User>, csrf: &str, content: &str) -> String {
    let nav = match user {
        Some(user) => format!(
            r#"<span>Hello, {}</span> <a href="/accounts/profile/">Profile</a>
      <form method="post" action="/accounts/logout/" class="inline">{}<button type="submit">Log out</button></form>"#,
            text(&user.username),
            csrf_input(csrf)
        ),
        None => r#"<a href="/accounts/login/">Log in</a> <a href="/accounts/signup/">Sign up</a>"#
            .to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title} | GenAI</title>
</head>
<body>
  <header>
    <a href="/">GenAI</a>
    <nav>{nav}</nav>
  </header>
  <main>
{content}
  </main>
</body>
</html>
"#,
        title = text(title),
        nav = nav,
        content = content,
    )
}

fn error_list(messages: &[String]) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let items: String = messages
        .iter()
        .map(|m| format!("<li>{}</li>", text(m)))
        .collect();
    format!(r#"<ul class="errorlist">{}</ul>"#, items)
}

fn input(name: &str, label: &str, kind: &str, value: &str, errors: &FormErrors) -> String {
    format!(
        r#"    <p>
      <label for="id_{name}">{label}</label>
      <input type="{kind}" name="{name}" id="id_{name}" value="{value}">
      {errors}
    </p>
"#,
        name = name,
        label = label,
        kind = kind,
        value = attr(value),
        errors = error_list(errors.field(name)),
    )
}

pub fn home_page(user: Option<&User>, csrf: &str) -> String {
    let content = match user {
        Some(user) => format!(
            "    <h1>Welcome back, {}!</h1>\n",
            text(&user.display_name())
        ),
        None => r#"    <h1>Welcome to GenAI</h1>
    <p><a href="/accounts/login/">Log in</a> or <a href="/accounts/signup/">create an account</a>.</p>
"#
        .to_string(),
    };
    layout("Home", user, csrf, &content)
}

pub fn signup_page(username: &str, email: &str, errors: &FormErrors, csrf: &str) -> String {
    let content = format!(
        r#"    <h1>Sign up</h1>
    {non_field}
    <form method="post" action="/accounts/signup/">
    {csrf}
{username}{email}{password1}{password2}    <button type="submit">Sign up</button>
    </form>
    <p>Already have an account? <a href="/accounts/login/">Log in</a></p>
"#,
        non_field = error_list(errors.non_field()),
        csrf = csrf_input(csrf),
        username = input("username", "Username", "text", username, errors),
        email = input("email", "Email", "email", email, errors),
        password1 = input("password1", "Password", "password", "", errors),
        password2 = input("password2", "Password confirmation", "password", "", errors),
    );
    layout("Sign up", None, csrf, &content)
}

pub fn login_page(username: &str, next: Option<&str>, errors: &FormErrors, csrf: &str) -> String {
    let next_field = next
        .map(|next| {
            format!(
                r#"    <input type="hidden" name="next" value="{}">
"#,
                attr(next)
            )
        })
        .unwrap_or_default();

    let content = format!(
        r#"    <h1>Log in</h1>
    {non_field}
    <form method="post" action="/accounts/login/">
    {csrf}
{username}{password}{next_field}    <button type="submit">Log in</button>
    </form>
    <p>No account yet? <a href="/accounts/signup/">Sign up</a></p>
"#,
        non_field = error_list(errors.non_field()),
        csrf = csrf_input(csrf),
        username = input("username", "Username", "text", username, errors),
        password = input("password", "Password", "password", "", errors),
        next_field = next_field,
    );
    layout("Log in", None, csrf, &content)
}

pub fn profile_page(user: &User, csrf: &str) -> String {
    let last_login = user
        .last_login
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "Never".to_string());

    let content = format!(
        r#"    <h1>{display_name}</h1>
    <dl>
      <dt>Username</dt><dd>{username}</dd>
      <dt>Email</dt><dd>{email}</dd>
      <dt>Member since</dt><dd>{joined}</dd>
      <dt>Last login</dt><dd>{last_login}</dd>
    </dl>
"#,
        display_name = text(&user.display_name()),
        username = text(&user.username),
        email = text(&user.email),
        joined = user.date_joined.format("%Y-%m-%d"),
        last_login = last_login,
    );
    layout("Profile", Some(user), csrf, &content)
}

pub fn error_page(status: u16, reason: &str, message: &str) -> String {
    let content = format!(
        "    <h1>{} {}</h1>\n    <p>{}</p>\n",
        status,
        text(reason),
        text(message)
    );
    layout(reason, None, "", &content)
}
