use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{self, HeaderName, HeaderValue},
    Error, HttpResponse,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use tracing::{debug, warn};

use crate::comm::settings::Settings;
use crate::modules::accounts::pages::error_page;

/// 安全配置
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// X-Frame-Options 取值
    pub frame_options: &'static str,
    /// Referrer-Policy 取值
    pub referrer_policy: &'static str,
    /// HSTS 有效期（秒），None 表示不发送
    pub hsts_seconds: Option<u64>,
    /// 允许的 Host（已转小写），None 表示不校验
    pub allowed_hosts: Option<Vec<String>>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            frame_options: "DENY",
            referrer_policy: "same-origin",
            hsts_seconds: Some(31_536_000),
            allowed_hosts: None,
        }
    }
}

impl SecurityConfig {
    /// 调试模式下不发送 HSTS，也不校验 Host；`allowed_hosts = ["*"]` 时放行所有 Host
    pub fn from_settings(settings: &Settings) -> Self {
        let any_host = settings.allowed_hosts.iter().any(|host| host == "*");
        let allowed_hosts = (!settings.debug && !any_host).then(|| {
            settings
                .allowed_hosts
                .iter()
                .map(|host| host.trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect()
        });

        Self {
            hsts_seconds: (!settings.debug).then_some(31_536_000),
            allowed_hosts,
            ..Self::default()
        }
    }

    /// 请求 Host 是否被允许
    pub fn host_allowed(&self, host: Option<&str>) -> bool {
        let Some(allowed) = &self.allowed_hosts else {
            return true;
        };
        let Some(domain) = host.and_then(host_domain) else {
            return false;
        };

        allowed.iter().any(|pattern| match pattern.strip_prefix('.') {
            // `.example.com` 匹配 example.com 及其所有子域名
            Some(parent) => domain == parent || domain.ends_with(pattern.as_str()),
            None => domain == *pattern,
        })
    }
}

/// 去掉端口与末尾的点，返回小写域名；端口不是数字时视为非法
fn host_domain(host: &str) -> Option<String> {
    let host = host.trim().to_ascii_lowercase();

    let domain = if host.starts_with('[') {
        let end = host.find(']')?;
        &host[..=end]
    } else {
        match host.rsplit_once(':') {
            Some((domain, port)) if port.bytes().all(|b| b.is_ascii_digit()) => domain,
            Some(_) => return None,
            None => host.as_str(),
        }
    };

    let domain = domain.trim_end_matches('.');
    (!domain.is_empty()).then(|| domain.to_string())
}

fn request_host(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|authority| authority.to_string()))
}

/// 安全中间件
pub struct SecurityMiddleware {
    config: SecurityConfig,
}

impl SecurityMiddleware {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    /// 添加安全头，已由处理器设置的头不覆盖
    fn add_security_headers<B>(config: &SecurityConfig, response: &mut ServiceResponse<B>) {
        let headers = response.headers_mut();
        let mut insert = |name: &'static str, value: HeaderValue| {
            let name = HeaderName::from_static(name);
            if !headers.contains_key(&name) {
                headers.insert(name, value);
            }
        };

        insert("x-content-type-options", HeaderValue::from_static("nosniff"));
        insert("x-frame-options", HeaderValue::from_static(config.frame_options));
        insert("referrer-policy", HeaderValue::from_static(config.referrer_policy));
        insert(
            "cross-origin-opener-policy",
            HeaderValue::from_static("same-origin"),
        );
        if let Some(seconds) = config.hsts_seconds {
            if let Ok(value) = HeaderValue::from_str(&format!("max-age={}", seconds)) {
                insert("strict-transport-security", value);
            }
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SecurityMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = SecurityMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SecurityMiddlewareService {
            service: Rc::new(service),
            config: self.config.clone(),
        }))
    }
}

pub struct SecurityMiddlewareService<S> {
    service: Rc<S>,
    config: SecurityConfig,
}

impl<S, B> Service<ServiceRequest> for SecurityMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let config = self.config.clone();

        Box::pin(async move {
            let host = request_host(&req);
            if !config.host_allowed(host.as_deref()) {
                warn!("拒绝请求 {}: Host {:?} 不在 allowed_hosts 中", req.path(), host);
                let body = error_page(400, "Bad Request", "Invalid HTTP_HOST header.");
                let response = HttpResponse::BadRequest()
                    .content_type("text/html; charset=utf-8")
                    .body(body);
                let mut response = req.into_response(response).map_into_right_body();
                SecurityMiddleware::add_security_headers(&config, &mut response);
                return Ok(response);
            }

            debug!("安全头: {} {}", req.method(), req.path());
            let mut response = service.call(req).await?.map_into_left_body();
            SecurityMiddleware::add_security_headers(&config, &mut response);
            Ok(response)
        })
    }
}
