use clap::ArgMatches;
use std::error::Error;

use genai_web::comm::settings::Settings;
use genai_web::command_registry::{APP_NAME, APP_VERSION};
use genai_web::{build_app, handle_command, init_commands, init_routes, init_tracing};
use genai_web::{AppBootstrap, ServerOverrides};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // 初始化所有模块的命令
    init_commands();

    // 构建命令行应用
    let matches: ArgMatches = build_app().get_matches();

    match matches.subcommand() {
        Some(("server", sub_matches)) => {
            handle_server_command(sub_matches).await?;
        }
        Some(("version", _)) => {
            println!("{} {}", APP_NAME, APP_VERSION);
        }
        Some((command_name, sub_matches)) => {
            let settings = load_settings();
            // 命令的日志写到 stderr
            if let Err(e) = init_tracing(&settings.logging, true) {
                eprintln!("{}", e);
            }

            if let Err(e) = handle_command(command_name, sub_matches) {
                eprintln!("处理命令 '{}' 时出错: {}", command_name, e);
                std::process::exit(1);
            }
        }
        _ => {
            // 这种情况不应该发生，因为我们设置了 subcommand_required(true)
            eprintln!("未知命令，请使用 --help 查看可用命令");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// 加载配置，配置文件格式错误时退出
fn load_settings() -> Settings {
    match Settings::from_global() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("加载配置失败: {}", e);
            std::process::exit(1);
        }
    }
}

async fn handle_server_command(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let mut settings = load_settings();
    ServerOverrides {
        host: matches.get_one::<String>("host").cloned(),
        port: matches.get_one::<u16>("port").copied(),
        workers: matches.get_one::<usize>("workers").copied(),
        debug: matches.get_flag("debug"),
    }
    .apply(&mut settings);

    init_tracing(&settings.logging, false)?;

    // 初始化路由
    init_routes();

    // 启动应用
    AppBootstrap::new(settings).run().await?;

    Ok(())
}
