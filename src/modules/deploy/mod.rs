//! 部署模块：`check_deployment` 就绪检查命令

pub mod checks;
pub mod cmd;

/// 注册部署模块的命令
pub fn register_deploy_commands() {
    crate::command_registry::register_module(Box::new(cmd::DeployCommands));
}
