pub mod cli;
pub mod errors;
pub mod loader;

use std::path::PathBuf;

use dxv_config::AppConfig;
use errors::FrontendError;
use tracing::info;

/// 按配置运行 CLI 演示，`scene` 为命令行指定的快照。
pub fn run_cli_demo(config: &AppConfig, scene: Option<PathBuf>) -> Result<(), FrontendError> {
    info!("启动 CLI 演示前端");
    let report = cli::run_demo(config, scene)?;
    cli::print_report(&report);
    Ok(())
}
