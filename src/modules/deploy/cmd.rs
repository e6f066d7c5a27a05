use clap::{ArgMatches, Command};
use std::io::{IsTerminal, Write};
use tracing::info;

use super::checks::{run_checks, CheckStatus};
use crate::command_registry::{CommandModule, CommandResult};
use crate::comm::settings::{ProcessEnv, Settings};

pub const CHECK_DEPLOYMENT: &str = "check_deployment";

/// 部署模块的命令处理器
pub struct DeployCommands;

impl CommandModule for DeployCommands {
    fn module_name(&self) -> &'static str {
        "deploy"
    }

    fn register_commands(&self) -> Vec<Command> {
        vec![Command::new(CHECK_DEPLOYMENT).about("检查应用是否已准备好部署")]
    }

    fn handle_command(
        &self,
        command_name: &str,
        _matches: &ArgMatches,
    ) -> CommandResult {
        match command_name {
            CHECK_DEPLOYMENT => handle_check_deployment(),
            _ => Err(format!("未知命令: {}", command_name).into()),
        }
    }
}

/// 运行就绪检查并输出到 stdout；检查结果不影响退出码
pub fn handle_check_deployment() -> CommandResult {
    let settings = Settings::from_global()?;
    let report = run_checks(&settings, &ProcessEnv);

    let stdout = std::io::stdout();
    let color = stdout.is_terminal();
    let mut out = stdout.lock();
    out.write_all(report.render(color).as_bytes())?;
    out.flush()?;

    info!(
        success = report.count(CheckStatus::Success),
        warning = report.count(CheckStatus::Warning),
        error = report.count(CheckStatus::Error),
        "部署就绪检查完成"
    );
    Ok(())
}
