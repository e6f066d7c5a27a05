use clap::{Arg, ArgMatches, Command};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

pub const APP_NAME: &str = "genai-web";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub type CommandResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// 各模块实现此 trait 来注册子命令
pub trait CommandModule {
    /// 获取模块名称
    fn module_name(&self) -> &'static str;

    /// 注册模块的子命令
    fn register_commands(&self) -> Vec<Command>;

    /// 处理模块命令
    fn handle_command(&self, command_name: &str, matches: &ArgMatches) -> CommandResult;
}

/// 命令注册器，使用单例模式
pub struct CommandRegistry {
    modules: BTreeMap<String, Box<dyn CommandModule + Send + Sync>>,
}

impl CommandRegistry {
    fn new() -> Self {
        Self {
            modules: BTreeMap::new(),
        }
    }

    /// 获取全局单例实例
    pub fn instance() -> &'static Arc<Mutex<CommandRegistry>> {
        static INSTANCE: OnceLock<Arc<Mutex<CommandRegistry>>> = OnceLock::new();
        INSTANCE.get_or_init(|| Arc::new(Mutex::new(CommandRegistry::new())))
    }

    /// 注册模块
    pub fn register_module(&mut self, module: Box<dyn CommandModule + Send + Sync>) {
        let module_name = module.module_name().to_string();
        self.modules.insert(module_name, module);
    }

    /// 构建完整的命令行应用
    pub fn build_app(&self) -> Command {
        let mut app = Command::new(APP_NAME)
            .version(APP_VERSION)
            .about("GenAI 账户与部署工具")
            .subcommand_required(true)
            .arg_required_else_help(true);

        // 内置的 server 命令，未指定的参数沿用配置
        app = app.subcommand(
            Command::new("server")
                .about("启动 Web 服务器")
                .arg(
                    Arg::new("host")
                        .long("host")
                        .value_name("HOST")
                        .help("服务器主机地址"),
                )
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .help("服务器端口")
                        .value_parser(clap::value_parser!(u16)),
                )
                .arg(
                    Arg::new("workers")
                        .short('w')
                        .long("workers")
                        .value_name("WORKERS")
                        .help("工作线程数")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("debug")
                        .short('d')
                        .long("debug")
                        .help("启用调试模式")
                        .action(clap::ArgAction::SetTrue),
                ),
        );

        app = app.subcommand(Command::new("version").about("显示版本信息"));

        for module in self.modules.values() {
            for command in module.register_commands() {
                app = app.subcommand(command);
            }
        }

        app
    }

    /// 把命令交给注册了它的模块处理
    pub fn handle_command(&self, command_name: &str, matches: &ArgMatches) -> CommandResult {
        for module in self.modules.values() {
            let owns_command = module
                .register_commands()
                .iter()
                .any(|command| command.get_name() == command_name);
            if owns_command {
                return module.handle_command(command_name, matches);
            }
        }

        Err(format!("未找到处理命令 '{}' 的模块", command_name).into())
    }

    /// 获取所有注册的模块名称
    pub fn get_registered_modules(&self) -> Vec<&str> {
        self.modules.keys().map(|s| s.as_str()).collect()
    }
}

fn registry() -> MutexGuard<'static, CommandRegistry> {
    CommandRegistry::instance()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 便捷函数：注册模块
pub fn register_module(module: Box<dyn CommandModule + Send + Sync>) {
    registry().register_module(module);
}

pub fn build_app() -> Command {
    registry().build_app()
}

pub fn handle_command(command_name: &str, matches: &ArgMatches) -> CommandResult {
    registry().handle_command(command_name, matches)
}
