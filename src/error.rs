use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

/// 统一的应用错误类型
#[derive(Error, Debug)]
pub enum AppError {
    #[error("配置错误: {0}")]
    Config(#[from] crate::comm::config::ConfigError),

    #[error("认证错误: {message}")]
    Auth { message: String },

    #[error("拒绝访问: {message}")]
    Forbidden { message: String },

    #[error("验证错误: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("数据库错误: {message}")]
    Database { message: String },

    #[error("外部服务错误: {service}: {message}")]
    ExternalService { service: String, message: String },

    #[error("超时错误: {operation}")]
    Timeout { operation: String },

    #[error("资源未找到: {resource}")]
    NotFound { resource: String },

    #[error("内部错误: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// 创建认证错误
    pub fn auth<T: Into<String>>(message: T) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// 创建拒绝访问错误
    pub fn forbidden<T: Into<String>>(message: T) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// 创建验证错误
    pub fn validation<T: Into<String>, U: Into<String>>(field: T, message: U) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建数据库错误
    pub fn database<T: Into<String>>(message: T) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// 创建外部服务错误
    pub fn external_service<T: Into<String>, U: Into<String>>(service: T, message: U) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// 创建超时错误
    pub fn timeout<T: Into<String>>(operation: T) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// 创建资源未找到错误
    pub fn not_found<T: Into<String>>(resource: T) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// 获取错误代码
    pub fn error_code(&self) -> i32 {
        match self {
            AppError::Internal(_) => 1000,
            AppError::Config(_) => 1001,
            AppError::Auth { .. } => 1002,
            AppError::Forbidden { .. } => 1003,
            AppError::Validation { .. } => 1004,
            AppError::Database { .. } => 1006,
            AppError::ExternalService { .. } => 1007,
            AppError::Timeout { .. } => 1008,
            AppError::NotFound { .. } => 1009,
        }
    }

    /// 对外展示的信息，不泄露内部细节
    fn public_message(&self) -> String {
        match self {
            AppError::Forbidden { message } => message.clone(),
            AppError::Auth { .. } | AppError::Validation { .. } | AppError::NotFound { .. } => {
                self.to_string()
            }
            _ => "服务器内部错误，请稍后重试".to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Auth { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            AppError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // 记录错误日志
        match self {
            AppError::Internal(_) | AppError::Database { .. } | AppError::Config(_) => {
                tracing::error!(code = self.error_code(), "Internal error: {}", self);
            }
            AppError::ExternalService { .. } | AppError::Timeout { .. } => {
                tracing::warn!(code = self.error_code(), "External service error: {}", self);
            }
            _ => {
                tracing::info!(code = self.error_code(), "Client error: {}", self);
            }
        }

        let body = crate::modules::accounts::pages::error_page(
            status.as_u16(),
            status.canonical_reason().unwrap_or("Error"),
            &self.public_message(),
        );
        HttpResponse::build(status)
            .content_type("text/html; charset=utf-8")
            .body(body)
    }
}

/// 应用结果类型
pub type AppResult<T> = Result<T, AppError>;
