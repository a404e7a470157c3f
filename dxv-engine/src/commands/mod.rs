//! 场景的所有修改都经由命令完成。
//!
//! 每条命令先做完整的前置校验，再修改场景；校验失败时场景保持不变。
//! 执行过程中捕获撤销所需的状态，因此同一个命令值可以反复 `execute`/`undo`。

mod batch;
mod entity;
pub mod journal;
mod layer;
mod manager;

use dxv_core::document::{EntityId, Scene};
use serde::{Deserialize, Serialize};

use crate::errors::CommandError;

pub use batch::Batch;
pub use entity::{
    AddEntity, InsertEntity, MoveEntities, RemoveEntity, ReplaceGeometry, SetEntityLayer,
    SetEntityStyle,
};
pub use journal::{Journal, JournalAction, JournalEntry, decode_jsonl, encode_jsonl, replay};
pub use layer::{AddLayer, RemoveLayer, UpdateLayer};
pub use manager::CommandManager;

pub trait Command {
    /// 日志与界面使用的简短名称。
    fn label(&self) -> &'static str;

    fn execute(&mut self, scene: &mut Scene) -> Result<(), CommandError>;

    fn undo(&mut self, scene: &mut Scene) -> Result<(), CommandError>;

    /// 抵消本命令效果的命令；尚未执行、缺少捕获状态时返回 `None`。
    fn inverse(&self) -> Option<SceneCommand>;

    /// 受影响的实体，供选择集与界面刷新使用。
    fn affected_entities(&self) -> Vec<EntityId>;
}

/// 可序列化的命令集合。日志、回放和撤销栈都保存这个类型。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SceneCommand {
    AddEntity(AddEntity),
    InsertEntity(InsertEntity),
    RemoveEntity(RemoveEntity),
    ReplaceGeometry(ReplaceGeometry),
    MoveEntities(MoveEntities),
    SetEntityLayer(SetEntityLayer),
    SetEntityStyle(SetEntityStyle),
    AddLayer(AddLayer),
    UpdateLayer(UpdateLayer),
    RemoveLayer(RemoveLayer),
    Batch(Batch),
}

impl SceneCommand {
    fn as_command(&self) -> &dyn Command {
        match self {
            SceneCommand::AddEntity(c) => c,
            SceneCommand::InsertEntity(c) => c,
            SceneCommand::RemoveEntity(c) => c,
            SceneCommand::ReplaceGeometry(c) => c,
            SceneCommand::MoveEntities(c) => c,
            SceneCommand::SetEntityLayer(c) => c,
            SceneCommand::SetEntityStyle(c) => c,
            SceneCommand::AddLayer(c) => c,
            SceneCommand::UpdateLayer(c) => c,
            SceneCommand::RemoveLayer(c) => c,
            SceneCommand::Batch(c) => c,
        }
    }

    fn as_command_mut(&mut self) -> &mut dyn Command {
        match self {
            SceneCommand::AddEntity(c) => c,
            SceneCommand::InsertEntity(c) => c,
            SceneCommand::RemoveEntity(c) => c,
            SceneCommand::ReplaceGeometry(c) => c,
            SceneCommand::MoveEntities(c) => c,
            SceneCommand::SetEntityLayer(c) => c,
            SceneCommand::SetEntityStyle(c) => c,
            SceneCommand::AddLayer(c) => c,
            SceneCommand::UpdateLayer(c) => c,
            SceneCommand::RemoveLayer(c) => c,
            SceneCommand::Batch(c) => c,
        }
    }

    /// 命令的序列化形式（JSON 字节），用于持久化、审计与外部回放。
    pub fn to_bytes(&self) -> Result<Vec<u8>, CommandError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CommandError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, CommandError> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Command for SceneCommand {
    fn label(&self) -> &'static str {
        self.as_command().label()
    }

    fn execute(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        self.as_command_mut().execute(scene)
    }

    fn undo(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        self.as_command_mut().undo(scene)
    }

    fn inverse(&self) -> Option<SceneCommand> {
        self.as_command().inverse()
    }

    fn affected_entities(&self) -> Vec<EntityId> {
        self.as_command().affected_entities()
    }
}

macro_rules! impl_from_command {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for SceneCommand {
                fn from(command: $variant) -> Self {
                    SceneCommand::$variant(command)
                }
            }
        )*
    };
}

impl_from_command!(
    AddEntity,
    InsertEntity,
    RemoveEntity,
    ReplaceGeometry,
    MoveEntities,
    SetEntityLayer,
    SetEntityStyle,
    AddLayer,
    UpdateLayer,
    RemoveLayer,
    Batch,
);

/// 修改已有实体前的共同校验：实体存在且所在图层未锁定。
pub(crate) fn ensure_editable(scene: &Scene, id: EntityId) -> Result<(), CommandError> {
    let entity = scene
        .entity(id)
        .ok_or(CommandError::EntityNotFound(id.get()))?;
    let layer = scene.resolve_layer(&entity.layer)?;
    if layer.is_locked {
        return Err(CommandError::LayerLocked(layer.name.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxv_core::document::{EntityDraft, Geometry, Line};
    use dxv_core::geometry::Point2;

    #[test]
    fn serialized_form_is_tagged_and_round_trips() {
        let command = SceneCommand::from(AddEntity::new(EntityDraft::new(
            "0",
            Geometry::Line(Line {
                start: Point2::new(0.0, 0.0),
                end: Point2::new(10.0, 0.0),
            }),
        )));
        let bytes = command.to_bytes().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"kind\":\"add_entity\""), "{text}");
        assert_eq!(SceneCommand::from_bytes(&bytes).unwrap(), command);
    }

    #[test]
    fn inverse_is_available_only_after_execute() {
        let mut scene = Scene::new();
        let mut command = SceneCommand::from(AddEntity::new(EntityDraft::new(
            "0",
            Geometry::Line(Line {
                start: Point2::new(0.0, 0.0),
                end: Point2::new(1.0, 1.0),
            }),
        )));
        assert!(command.inverse().is_none());
        command.execute(&mut scene).unwrap();
        let Some(SceneCommand::RemoveEntity(inverse)) = command.inverse() else {
            panic!("expected remove as inverse");
        };
        assert_eq!(inverse.id, EntityId::new(1));
        assert_eq!(command.label(), "add_entity");
    }
}
