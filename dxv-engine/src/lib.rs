pub mod commands;
pub mod dispatch;
pub mod grips;
pub mod render;
pub mod scheduler;
pub mod selection;
pub mod session;
pub mod snap;
pub mod tools;
pub mod transform;

pub mod errors {
    use dxv_core::document::SceneError;
    use dxv_core::geometry::GeometryError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("level {0} does not exist")]
        LevelNotFound(usize),
        #[error("entity with id {0} not found")]
        EntityNotFound(u64),
    }

    /// 视口尚未完成布局时，坐标换算一律拒绝，而不是给出偏移后的结果。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum TransformError {
        #[error("viewport is not ready")]
        ViewportNotReady,
        #[error("viewport drawing area is empty ({width}x{height})")]
        ZeroAreaViewport { width: f64, height: f64 },
    }

    #[derive(Debug, Error)]
    pub enum CommandError {
        #[error("entity with id {0} not found")]
        EntityNotFound(u64),
        #[error("layer `{0}` is locked")]
        LayerLocked(String),
        #[error(transparent)]
        Scene(#[from] SceneError),
        #[error(transparent)]
        Geometry(#[from] GeometryError),
        #[error("entity {0} changed since the edit started")]
        StaleState(u64),
        #[error("batch contains no commands")]
        EmptyBatch,
        #[error("command has not been executed yet")]
        NotExecuted,
        #[error("command serialization failed: {0}")]
        Serialization(#[from] serde_json::Error),
    }

    /// 工具状态机捕获的错误，出现即回到 `Idle`。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum ToolError {
        #[error(transparent)]
        Geometry(#[from] GeometryError),
        #[error(transparent)]
        Transform(#[from] TransformError),
    }

    #[derive(Debug, Error)]
    pub enum ReplayError {
        #[error("journal line {line} is malformed: {source}")]
        Decode {
            line: usize,
            #[source]
            source: serde_json::Error,
        },
        #[error("journal entry {entry} failed: {source}")]
        Command {
            entry: u64,
            #[source]
            source: CommandError,
        },
    }
}

pub use commands::{Command, CommandManager, SceneCommand};
pub use errors::{CommandError, EngineError, ReplayError, ToolError, TransformError};
pub use session::{EditorEvent, EditorSession};
pub use transform::{Margins, ViewTransform, Viewport};
