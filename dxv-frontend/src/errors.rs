use dxv_core::document::SceneError;
use dxv_engine::{CommandError, TransformError};
use dxv_io::ExportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("示例场景构建失败: {0}")]
    DemoScene(#[from] SceneError),
    #[error("视口不可用: {0}")]
    Viewport(#[from] TransformError),
    #[error("编辑命令失败: {0}")]
    Command(#[from] CommandError),
    #[error("导出失败: {0}")]
    Export(#[from] ExportError),
}
