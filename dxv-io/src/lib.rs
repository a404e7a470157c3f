//! 场景的持久化、导入与导出边界。
//!
//! 核心只接收完整的 `Scene` 值：解析在后台线程完成，结果一次性交付；
//! 本地格式为 JSON 快照，CAD 文件编解码不在本 crate 范围内。

use std::path::{Path, PathBuf};

use dxv_core::document::Scene;
use thiserror::Error;

pub mod export;
pub mod import;
pub mod snapshot;

pub use export::{
    ExportError, ExportOutcome, ExportProfile, ExportSelection, ExportSettings, ExportStats,
    ExportStatus, IssueSeverity, ValidationReport, export_scene, prepare_export,
    suggested_filename, validate_scene,
};
pub use import::{ImportTask, JsonSceneParser, ParseError, SceneParser};
pub use snapshot::{JsonSceneEncoder, JsonSnapshotStore, SceneEncoder};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scene snapshot {path:?}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub trait SceneLoader {
    fn load(&self, path: &Path) -> Result<Scene, IoError>;
}

pub trait SceneSaver {
    fn save(&self, scene: &Scene, path: &Path) -> Result<(), IoError>;
}

/// 按扩展名选择加载器。仅支持 `.json` 快照。
pub fn load_scene(path: &Path) -> Result<Scene, IoError> {
    match extension(path).as_deref() {
        Some("json") => JsonSnapshotStore::new().load(path),
        Some(other) => Err(IoError::UnsupportedFeature(format!(
            "无法识别的场景格式 .{other}（{}）",
            path.display()
        ))),
        None => Err(IoError::UnsupportedFeature(format!(
            "场景文件缺少扩展名：{}",
            path.display()
        ))),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
