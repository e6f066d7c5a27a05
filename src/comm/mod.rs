//! 通用模块：配置、校验与会话事件

pub mod config;
pub mod config_validator;
pub mod session_listener;
pub mod settings;
