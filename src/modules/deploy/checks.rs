//! 部署就绪检查
//!
//! 四组检查互不影响，只决定输出哪一条状态行，整体没有通过/失败结论。

use std::fmt::Write as _;

use crate::comm::settings::{
    EnvSource, Settings, ENGINE_MEMORY, ENGINE_POSTGRESQL, ENGINE_SQLITE,
    INSECURE_SECRET_KEY_PREFIX,
};
use crate::middleware;

/// 有效 Euron API key 的前缀
pub const EURON_API_KEY_PREFIX: &str = "euri-";

pub const BANNER: &str = "🚀 GenAI Deployment Readiness Check";
pub const COMPLETED: &str = "✅ Deployment readiness check completed!";
pub const REMINDERS: [&str; 3] = [
    "1. Set environment variables in your hosting dashboard",
    "2. Connect a PostgreSQL database",
    "3. Push your code and deploy",
];

const GREEN: &str = "\x1b[32;1m";
const YELLOW: &str = "\x1b[33;1m";
const RED: &str = "\x1b[31;1m";
const CYAN: &str = "\x1b[36;1m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Success,
    Warning,
    Error,
}

impl CheckStatus {
    /// 状态符号（含其后的空格）
    pub fn glyph(&self) -> &'static str {
        match self {
            CheckStatus::Success => "✅ ",
            CheckStatus::Warning => "⚠️  ",
            CheckStatus::Error => "❌ ",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            CheckStatus::Success => GREEN,
            CheckStatus::Warning => YELLOW,
            CheckStatus::Error => RED,
        }
    }
}

/// 单条检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckLine {
    pub status: CheckStatus,
    pub message: String,
}

impl CheckLine {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Success,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Error,
            message: message.into(),
        }
    }

    /// 不带颜色的输出行
    pub fn plain(&self) -> String {
        format!("  {}{}", self.status.glyph(), self.message)
    }
}

/// 一组检查
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSection {
    pub heading: &'static str,
    pub lines: Vec<CheckLine>,
}

/// 完整报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessReport {
    pub sections: Vec<CheckSection>,
}

impl ReadinessReport {
    pub fn lines(&self) -> impl Iterator<Item = &CheckLine> {
        self.sections.iter().flat_map(|section| section.lines.iter())
    }

    pub fn count(&self, status: CheckStatus) -> usize {
        self.lines().filter(|line| line.status == status).count()
    }

    pub fn find(&self, prefix: &str) -> Option<&CheckLine> {
        self.lines().find(|line| line.message.starts_with(prefix))
    }

    /// 渲染为文本；`color` 为 true 时使用 ANSI 颜色
    pub fn render(&self, color: bool) -> String {
        let paint = |code: &str, text: &str| {
            if color {
                format!("{}{}{}", code, text, RESET)
            } else {
                text.to_string()
            }
        };

        let mut out = String::new();
        let _ = writeln!(out, "{}", paint(GREEN, BANNER));
        let _ = writeln!(out, "{}", "=".repeat(50));

        for section in &self.sections {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", paint(CYAN, section.heading));
            for line in &section.lines {
                let _ = writeln!(out, "{}", paint(line.status.color(), &line.plain()));
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "{}", paint(GREEN, COMPLETED));
        let _ = writeln!(out, "{}", paint(YELLOW, "Remember to:"));
        for reminder in REMINDERS {
            let _ = writeln!(out, "{}", reminder);
        }
        out
    }
}

/// 依次运行四组检查
pub fn run_checks(settings: &Settings, env: &dyn EnvSource) -> ReadinessReport {
    ReadinessReport {
        sections: vec![
            check_environment_variables(settings),
            check_database(settings, env),
            check_static_files(settings),
            check_api_config(settings),
        ],
    }
}

pub fn check_environment_variables(settings: &Settings) -> CheckSection {
    let mut lines = Vec::with_capacity(3);

    let secret_key = settings.secret_key.as_str();
    if !secret_key.is_empty() && !secret_key.starts_with(INSECURE_SECRET_KEY_PREFIX) {
        lines.push(CheckLine::success("SECRET_KEY: Configured"));
    } else {
        lines.push(CheckLine::warning("SECRET_KEY: Using development key"));
    }

    if !settings.debug {
        lines.push(CheckLine::success("DEBUG: False (production ready)"));
    } else {
        lines.push(CheckLine::warning("DEBUG: True (development mode)"));
    }

    let hosts = &settings.allowed_hosts;
    if !hosts.is_empty() && !(hosts.len() == 1 && hosts[0] == "*") {
        lines.push(CheckLine::success(format!("ALLOWED_HOSTS: {:?}", hosts)));
    } else {
        lines.push(CheckLine::warning("ALLOWED_HOSTS: Not properly configured"));
    }

    CheckSection {
        heading: "🔧 Environment Variables:",
        lines,
    }
}

pub fn check_database(settings: &Settings, env: &dyn EnvSource) -> CheckSection {
    let mut lines = Vec::with_capacity(2);

    let engine = settings.database.engine.as_str();
    if engine.contains(ENGINE_POSTGRESQL) {
        lines.push(CheckLine::success("Using PostgreSQL (production ready)"));
    } else if engine.contains(ENGINE_SQLITE) {
        lines.push(CheckLine::warning("Using SQLite (development only)"));
    } else if engine.contains(ENGINE_MEMORY) {
        lines.push(CheckLine::warning("Using in-memory store (development only)"));
    }

    let database_url = env.var("DATABASE_URL").filter(|url| !url.is_empty());
    if database_url.is_some() {
        lines.push(CheckLine::success("DATABASE_URL: Configured"));
    } else if engine.contains(ENGINE_MEMORY) {
        lines.push(CheckLine::warning(
            "DATABASE_URL: Not set (will use in-memory store)",
        ));
    } else if engine.contains(ENGINE_POSTGRESQL) {
        // postgresql 引擎缺少连接串时服务器拒绝启动
        lines.push(CheckLine::warning(
            "DATABASE_URL: Not set (required by the PostgreSQL engine)",
        ));
    } else {
        lines.push(CheckLine::warning("DATABASE_URL: Not set"));
    }

    CheckSection {
        heading: "💾 Database Configuration:",
        lines,
    }
}

pub fn check_static_files(settings: &Settings) -> CheckSection {
    let mut lines = Vec::with_capacity(3);

    match settings.static_files.root.as_deref().filter(|root| !root.is_empty()) {
        Some(root) => lines.push(CheckLine::success(format!("STATIC_ROOT: {}", root))),
        None => lines.push(CheckLine::error("STATIC_ROOT: Not configured")),
    }

    if settings.uses_middleware(middleware::STATIC_FILES) {
        lines.push(CheckLine::success("Static file middleware: Configured"));
    } else {
        lines.push(CheckLine::warning("Static file middleware: Not configured"));
    }

    if settings.static_files.uses_manifest_storage() {
        lines.push(CheckLine::success("Static storage: Compressed manifest"));
    } else {
        lines.push(CheckLine::warning("Static storage: Default"));
    }

    CheckSection {
        heading: "📁 Static Files Configuration:",
        lines,
    }
}

pub fn check_api_config(settings: &Settings) -> CheckSection {
    let mut lines = Vec::with_capacity(2);

    let api_key = settings.api.euron_api_key.as_deref().unwrap_or_default();
    if api_key.starts_with(EURON_API_KEY_PREFIX) {
        lines.push(CheckLine::success("EURON_API_KEY: Configured"));
    } else {
        lines.push(CheckLine::warning("EURON_API_KEY: Not properly configured"));
    }

    if settings.api.rest.is_some() {
        lines.push(CheckLine::success("REST API: Configured"));
    } else {
        lines.push(CheckLine::warning("REST API: Not configured"));
    }

    CheckSection {
        heading: "🔌 API Configuration:",
        lines,
    }
}
