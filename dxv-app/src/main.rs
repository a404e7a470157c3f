use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dxv_config::{AppConfig, ConfigError};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// DXV 二维 CAD 编辑器核心的命令行演示。
#[derive(Debug, Parser)]
#[command(name = "dxv", version)]
struct Cli {
    /// 配置文件路径，缺省时按 `DXV_CONFIG` 与 `./config/default.toml` 查找。
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// 启动时加载的场景快照（JSON），优先于 `DXV_SCENE` 与 `frontend.scene_path`。
    #[arg(long, value_name = "PATH")]
    scene: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, fallback) = load_configuration(cli.config);
    init_logging(&config);
    info!("启动 DXV 编辑器核心");
    if let Some(err) = fallback {
        warn!(error = %err, "加载配置失败，使用内建默认值");
    }

    dxv_frontend::run_cli_demo(&config, cli.scene).context("执行 CLI 演示失败")?;
    Ok(())
}

/// 日志尚未初始化，失败原因交给调用方在初始化后记录。
fn load_configuration(override_path: Option<PathBuf>) -> (AppConfig, Option<ConfigError>) {
    let loaded = match override_path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::discover(),
    };
    match loaded {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err)),
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    // 重复初始化时保留已有订阅者。
    let _ = fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_are_optional() {
        let cli = Cli::try_parse_from(["dxv", "--scene", "plan.json"]).unwrap();
        assert!(cli.config.is_none());
        assert_eq!(cli.scene, Some(PathBuf::from("plan.json")));
        assert!(Cli::try_parse_from(["dxv", "--bogus"]).is_err());
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let (config, fallback) =
            load_configuration(Some(PathBuf::from("/definitely/missing/dxv.toml")));
        assert!(matches!(fallback, Some(ConfigError::Io { .. })));
        assert_eq!(config.history.depth, AppConfig::default().history.depth);
    }
}
