use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use stamp_config::{AppConfig, ConfigError};
use stamp_frontend::FrontendError;
use stamp_frontend::cli::{ApplyOptions, parse_field, run_apply, run_inspect};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// 批量替换 DXF 图框属性。
#[derive(Debug, Parser)]
#[command(name = "dxfstamp", version, about)]
struct Cli {
    /// 配置文件路径，默认读取 `DXFSTAMP_CONFIG` 或 `./config/default.toml`。
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 替换图框属性并写出修改后的文件。
    Apply {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// 替换字段，可重复：`-s JOB_LOC1=SITE-7`。
        #[arg(short = 's', long = "set", value_name = "KEY=VALUE", value_parser = parse_field_arg)]
        fields: Vec<(String, String)>,
        #[arg(long)]
        layout: Option<String>,
        #[arg(long)]
        block: Option<String>,
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
        /// 关闭并行处理。
        #[arg(long)]
        sequential: bool,
    },
    /// 列出布局、块参照与属性。
    Inspect {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn parse_field_arg(raw: &str) -> Result<(String, String), FrontendError> {
    parse_field(raw)
}

fn main() {
    let cli = Cli::parse();
    let (config, load_error) = match load_configuration(cli.config.as_deref()) {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err)),
    };
    // 日志按最终生效的配置初始化，之后才能输出加载失败的告警
    init_logging(&config);
    if let Some(err) = load_error {
        warn_config_fallback(&err);
    }
    info!("启动 dxfstamp");

    if let Err(err) = run(cli.command, &config) {
        error!(error = %err, "执行失败");
        eprintln!("错误：{err:#}");
        std::process::exit(1);
    }
}

fn run(command: Command, config: &AppConfig) -> anyhow::Result<()> {
    match command {
        Command::Apply {
            files,
            fields,
            layout,
            block,
            output,
            sequential,
        } => {
            let options = ApplyOptions {
                files,
                fields,
                layout,
                block,
                output,
                sequential,
            };
            run_apply(&options, config).context("处理 DXF 文件失败")?;
        }
        Command::Inspect { file, json } => {
            run_inspect(&file, json)
                .with_context(|| format!("检查 {} 失败", file.display()))?;
        }
    }
    Ok(())
}

fn load_configuration(override_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match override_path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::discover(),
    }
}

fn warn_config_fallback(err: &ConfigError) {
    match err {
        ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
            warn!(path = %path.display(), error = %err, "加载配置失败，使用内建默认值");
        }
        ConfigError::Context { .. } => {
            warn!(error = %err, "加载配置失败，使用内建默认值");
        }
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
