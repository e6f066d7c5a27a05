use actix_files::NamedFile;
use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{
        header::{self, HeaderValue},
        Method,
    },
    Error,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, warn};
use urlencoding::decode;

use crate::comm::settings::Settings;

const IMMUTABLE_CACHE: &str = "max-age=31536000, public, immutable";
const SHORT_CACHE: &str = "max-age=60, public";

/// 静态文件服务配置
#[derive(Debug, Clone)]
pub struct StaticFilesConfig {
    /// URL 前缀，如 `/static/`
    pub url_prefix: String,
    /// 文件根目录
    pub root: PathBuf,
    /// 是否发送长期缓存头
    pub immutable: bool,
}

impl StaticFilesConfig {
    /// 未配置 root 时返回 None，中间件不会被挂载
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        let root = settings
            .static_files
            .root
            .as_deref()
            .filter(|root| !root.trim().is_empty())?;

        let mut url_prefix = settings.static_files.url.clone();
        if !url_prefix.starts_with('/') {
            url_prefix.insert(0, '/');
        }
        if !url_prefix.ends_with('/') {
            url_prefix.push('/');
        }

        Some(Self {
            url_prefix,
            root: PathBuf::from(root),
            immutable: settings.static_files.uses_manifest_storage(),
        })
    }

    /// 中间件关闭时的占位配置
    pub fn disabled() -> Self {
        Self {
            url_prefix: "/static/".to_string(),
            root: PathBuf::new(),
            immutable: false,
        }
    }

    /// 把请求路径映射到根目录下的文件，拒绝目录穿越
    pub fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let relative = request_path.strip_prefix(&self.url_prefix)?;
        let relative = decode(relative).ok()?;
        if relative.is_empty() || relative.contains('\\') || relative.contains('\0') {
            return None;
        }

        let relative = Path::new(&*relative);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            return None;
        }

        Some(self.root.join(relative))
    }
}

/// 解析符号链接后仍位于根目录内的普通文件
async fn open_within_root(root: &Path, file_path: &Path) -> std::io::Result<Option<NamedFile>> {
    let root = tokio::fs::canonicalize(root).await?;
    let real_path = match tokio::fs::canonicalize(file_path).await {
        Ok(path) => path,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    if !real_path.starts_with(&root) {
        warn!("静态文件指向根目录之外: {}", file_path.display());
        return Ok(None);
    }
    if !tokio::fs::metadata(&real_path).await?.is_file() {
        return Ok(None);
    }

    NamedFile::open_async(&real_path).await.map(Some)
}

/// 静态文件中间件，未命中的请求交给后续服务
pub struct StaticFiles {
    config: Rc<StaticFilesConfig>,
}

impl StaticFiles {
    pub fn new(config: StaticFilesConfig) -> Self {
        Self {
            config: Rc::new(config),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for StaticFiles
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = StaticFilesService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(StaticFilesService {
            service: Rc::new(service),
            config: self.config.clone(),
        }))
    }
}

pub struct StaticFilesService<S> {
    service: Rc<S>,
    config: Rc<StaticFilesConfig>,
}

impl<S, B> Service<ServiceRequest> for StaticFilesService<S>
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
            let servable = req.method() == Method::GET || req.method() == Method::HEAD;
            let file_path = if servable {
                config.resolve(req.path())
            } else {
                None
            };

            if let Some(file_path) = file_path {
                match open_within_root(&config.root, &file_path).await {
                    Ok(Some(file)) => {
                        debug!("静态文件: {}", file_path.display());
                        let cache_control = if config.immutable {
                            IMMUTABLE_CACHE
                        } else {
                            SHORT_CACHE
                        };
                        // NamedFile 负责 Content-Type、ETag、Last-Modified、条件请求与 Range
                        let mut response = file.into_response(req.request());
                        response
                            .headers_mut()
                            .insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));
                        return Ok(req.into_response(response).map_into_right_body());
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("读取静态文件失败 {}: {}", file_path.display(), e);
                    }
                }
            }

            let response = service.call(req).await?;
            Ok(response.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "genai-web-static-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(dir.join("css")).unwrap();
        std::fs::write(dir.join("css/site.css"), "body { margin: 0 }").unwrap();
        dir
    }

    fn config(root: PathBuf, immutable: bool) -> StaticFilesConfig {
        StaticFilesConfig {
            url_prefix: "/static/".to_string(),
            root,
            immutable,
        }
    }

    async fn fallback() -> HttpResponse {
        HttpResponse::NotFound().body("app 404")
    }

    #[actix_web::test]
    async fn test_resolve_rejects_traversal() {
        let cfg = config(PathBuf::from("/srv/static"), false);
        assert_eq!(
            cfg.resolve("/static/css/site.css"),
            Some(PathBuf::from("/srv/static/css/site.css"))
        );
        assert!(cfg.resolve("/static/../etc/passwd").is_none());
        assert!(cfg.resolve("/static/%2e%2e/etc/passwd").is_none());
        assert!(cfg.resolve("/static/").is_none());
        assert!(cfg.resolve("/other/site.css").is_none());
    }

    #[actix_web::test]
    async fn test_from_settings_requires_root() {
        let mut settings = Settings::default();
        assert!(StaticFilesConfig::from_settings(&settings).is_none());

        settings.static_files.root = Some("/srv/static".to_string());
        settings.static_files.url = "assets".to_string();
        settings.static_files.storage = crate::comm::settings::MANIFEST_STATIC_STORAGE.to_string();
        let cfg = StaticFilesConfig::from_settings(&settings).unwrap();
        assert_eq!(cfg.url_prefix, "/assets/");
        assert!(cfg.immutable);
    }

    #[actix_web::test]
    async fn test_serves_existing_file() {
        let root = temp_root("serve");
        let app = test::init_service(
            App::new()
                .wrap(StaticFiles::new(config(root, true)))
                .default_service(web::to(fallback)),
        )
        .await;

        let req = test::TestRequest::get().uri("/static/css/site.css").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.starts_with("text/css"));
        assert_eq!(resp.headers().get("cache-control").unwrap(), IMMUTABLE_CACHE);
        assert!(resp.headers().contains_key("last-modified"));
        let etag = resp.headers().get("etag").unwrap().clone();

        let body = test::read_body(resp).await;
        assert_eq!(body, "body { margin: 0 }");

        // 条件请求
        let req = test::TestRequest::get()
            .uri("/static/css/site.css")
            .insert_header(("if-none-match", etag))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 304);

        // 范围请求
        let req = test::TestRequest::get()
            .uri("/static/css/site.css")
            .insert_header(("range", "bytes=0-3"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 206);
        let body = test::read_body(resp).await;
        assert_eq!(body, "body");
    }

    #[cfg(unix)]
    #[actix_web::test]
    async fn test_symlink_outside_root_falls_through() {
        let root = temp_root("symlink");
        let outside = std::env::temp_dir().join(format!("genai-web-outside-{}.txt", std::process::id()));
        std::fs::write(&outside, "secret").unwrap();
        let link = root.join("leak.txt");
        let _ = std::fs::remove_file(&link);
        std::os::unix::fs::symlink(&outside, &link).unwrap();

        let app = test::init_service(
            App::new()
                .wrap(StaticFiles::new(config(root, false)))
                .default_service(web::to(fallback)),
        )
        .await;

        let req = test::TestRequest::get().uri("/static/leak.txt").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
        let body = test::read_body(resp).await;
        assert_eq!(body, "app 404");
    }

    #[actix_web::test]
    async fn test_directory_falls_through() {
        let root = temp_root("directory");
        let app = test::init_service(
            App::new()
                .wrap(StaticFiles::new(config(root, false)))
                .default_service(web::to(fallback)),
        )
        .await;

        let req = test::TestRequest::get().uri("/static/css").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn test_missing_file_falls_through() {
        let root = temp_root("missing");
        let app = test::init_service(
            App::new()
                .wrap(StaticFiles::new(config(root, false)))
                .default_service(web::to(fallback)),
        )
        .await;

        let req = test::TestRequest::get().uri("/static/nope.js").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
        let body = test::read_body(resp).await;
        assert_eq!(body, "app 404");
    }
}
