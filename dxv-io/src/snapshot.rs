use std::fs;
use std::path::Path;

use dxv_core::document::Scene;
use tracing::{debug, info, warn};

use crate::export::ExportError;
use crate::{IoError, SceneLoader, SceneSaver};

/// 导出契约：场景快照进，字节出。
pub trait SceneEncoder {
    /// 建议文件名使用的扩展名（不含点）。
    fn extension(&self) -> &'static str;
    fn encode(&self, scene: &Scene) -> Result<Vec<u8>, ExportError>;
}

/// 原生 JSON 快照编码。图层与块表有序，结构相同的场景编码结果逐字节一致。
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSceneEncoder {
    pub pretty: bool,
}

impl SceneEncoder for JsonSceneEncoder {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn encode(&self, scene: &Scene) -> Result<Vec<u8>, ExportError> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(scene)?
        } else {
            serde_json::to_vec(scene)?
        };
        Ok(bytes)
    }
}

/// 基于文件路径的 JSON 快照存储。
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSnapshotStore;

impl JsonSnapshotStore {
    pub fn new() -> Self {
        Self
    }
}

impl SceneLoader for JsonSnapshotStore {
    fn load(&self, path: &Path) -> Result<Scene, IoError> {
        let data = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let scene: Scene =
            serde_json::from_slice(&data).map_err(|source| IoError::Serialization {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), entities = scene.len(), "场景快照已加载");
        Ok(scene)
    }
}

impl SceneSaver for JsonSnapshotStore {
    /// 先写临时文件再改名，避免中途失败留下半个快照。
    fn save(&self, scene: &Scene, path: &Path) -> Result<(), IoError> {
        let bytes = serde_json::to_vec_pretty(scene).map_err(|source| IoError::Serialization {
            path: path.to_path_buf(),
            source,
        })?;
        let staging = path.with_extension("json.partial");
        let write_error = |source: std::io::Error| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        };
        fs::write(&staging, &bytes).map_err(write_error)?;
        if let Err(source) = fs::rename(&staging, path) {
            if let Err(cleanup) = fs::remove_file(&staging) {
                warn!(path = %staging.display(), error = %cleanup, "清理临时快照失败");
            }
            return Err(write_error(source));
        }
        debug!(path = %path.display(), bytes = bytes.len(), "场景快照已保存");
        Ok(())
    }
}
