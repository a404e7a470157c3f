use dxv_core::document::{EntityId, Scene};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Command, SceneCommand};
use crate::errors::CommandError;

/// 原子复合命令。任一子命令失败时回滚已执行的部分，场景保持执行前的状态。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub commands: Vec<SceneCommand>,
}

impl Batch {
    pub fn new(commands: Vec<SceneCommand>) -> Self {
        Self { commands }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Command for Batch {
    fn label(&self) -> &'static str {
        "batch"
    }

    fn execute(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        if self.commands.is_empty() {
            return Err(CommandError::EmptyBatch);
        }
        for index in 0..self.commands.len() {
            if let Err(err) = self.commands[index].execute(scene) {
                for applied in self.commands[..index].iter_mut().rev() {
                    if let Err(rollback) = applied.undo(scene) {
                        warn!(error = %rollback, "批量命令回滚失败");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn undo(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        let count = self.commands.len();
        for index in (0..count).rev() {
            if let Err(err) = self.commands[index].undo(scene) {
                for reverted in self.commands[index + 1..].iter_mut() {
                    if let Err(restore) = reverted.execute(scene) {
                        warn!(error = %restore, "批量撤销恢复失败");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn inverse(&self) -> Option<SceneCommand> {
        let inverses = self
            .commands
            .iter()
            .rev()
            .map(|command| command.inverse())
            .collect::<Option<Vec<_>>>()?;
        Some(Batch::new(inverses).into())
    }

    fn affected_entities(&self) -> Vec<EntityId> {
        let mut ids = Vec::new();
        for command in &self.commands {
            for id in command.affected_entities() {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{AddEntity, RemoveEntity};
    use dxv_core::document::{EntityDraft, Geometry, Line};
    use dxv_core::geometry::Point2;

    fn line_draft(y: f64) -> EntityDraft {
        EntityDraft::new(
            "0",
            Geometry::Line(Line {
                start: Point2::new(0.0, y),
                end: Point2::new(10.0, y),
            }),
        )
    }

    #[test]
    fn failing_member_rolls_back_the_rest() {
        let mut scene = Scene::new();
        let keep = scene.add_entity(line_draft(0.0)).unwrap();
        let original = scene.clone();
        let mut batch = Batch::new(vec![
            RemoveEntity::new(keep).into(),
            AddEntity::new(line_draft(5.0)).into(),
            RemoveEntity::new(EntityId::new(404)).into(),
        ]);
        let err = batch.execute(&mut scene).unwrap_err();
        assert!(matches!(err, CommandError::EntityNotFound(404)));
        assert_eq!(scene, original);
    }

    #[test]
    fn batch_undoes_atomically() {
        let mut scene = Scene::new();
        let a = scene.add_entity(line_draft(0.0)).unwrap();
        let b = scene.add_entity(line_draft(1.0)).unwrap();
        let original = scene.clone();
        let mut batch = Batch::new(vec![RemoveEntity::new(a).into(), RemoveEntity::new(b).into()]);
        batch.execute(&mut scene).unwrap();
        assert!(scene.is_empty());
        batch.undo(&mut scene).unwrap();
        assert_eq!(scene, original);
        assert_eq!(batch.affected_entities(), vec![a, b]);
    }

    #[test]
    fn empty_batch_is_an_error() {
        let mut scene = Scene::new();
        assert!(matches!(
            Batch::new(Vec::new()).execute(&mut scene),
            Err(CommandError::EmptyBatch)
        ));
    }
}
