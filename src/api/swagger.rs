use utoipa::OpenApi;

/// OpenAPI 文档聚合
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::base::routes::health,
        crate::modules::accounts::controller::me,
    ),
    components(
        schemas(
            crate::modules::base::routes::HealthStatus,
            crate::modules::accounts::models::UserProfile,
        )
    ),
    tags(
        (name = "base", description = "健康检查"),
        (name = "accounts", description = "当前用户信息")
    )
)]
pub struct ApiDoc;

/// OpenAPI 文档地址
pub const OPENAPI_JSON: &str = "/api-doc/openapi.json";
