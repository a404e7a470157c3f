use dxv_core::document::{Entity, EntityDraft, EntityId, Geometry, Scene, StyleOverrides};
use dxv_core::geometry::{GeometryError, Vector2};
use serde::{Deserialize, Serialize};

use super::{Command, SceneCommand, ensure_editable};
use crate::errors::CommandError;

/// 新建实体。撤销时连同 ID 计数器一起回退，使撤销后的场景与执行前完全一致。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddEntity {
    pub draft: EntityDraft,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    counter_before: Option<u64>,
}

impl AddEntity {
    pub fn new(draft: EntityDraft) -> Self {
        Self {
            draft,
            assigned: None,
            counter_before: None,
        }
    }
}

impl Command for AddEntity {
    fn label(&self) -> &'static str {
        "add_entity"
    }

    fn execute(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        self.draft.geometry.validate()?;
        let counter = scene.next_entity_id();
        let id = scene.add_entity(self.draft.clone())?;
        self.counter_before = Some(counter);
        self.assigned = Some(id);
        Ok(())
    }

    fn undo(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        let id = self.assigned.ok_or(CommandError::NotExecuted)?;
        scene.remove_entity(id)?;
        if let Some(counter) = self.counter_before {
            scene.restore_entity_counter(counter);
        }
        Ok(())
    }

    fn inverse(&self) -> Option<SceneCommand> {
        self.assigned.map(|id| RemoveEntity::new(id).into())
    }

    fn affected_entities(&self) -> Vec<EntityId> {
        self.assigned.into_iter().collect()
    }
}

/// 以既定 ID 和位置放回实体，是删除命令的逆操作。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertEntity {
    pub entity: Entity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    counter_before: Option<u64>,
}

impl InsertEntity {
    pub fn new(entity: Entity, position: Option<usize>) -> Self {
        Self {
            entity,
            position,
            counter_before: None,
        }
    }
}

impl Command for InsertEntity {
    fn label(&self) -> &'static str {
        "insert_entity"
    }

    fn execute(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        self.entity.geometry.validate()?;
        let counter = scene.next_entity_id();
        scene.insert_entity(self.entity.clone(), self.position)?;
        self.counter_before = Some(counter);
        Ok(())
    }

    fn undo(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        let counter = self.counter_before.ok_or(CommandError::NotExecuted)?;
        scene.remove_entity(self.entity.id)?;
        scene.restore_entity_counter(counter);
        Ok(())
    }

    fn inverse(&self) -> Option<SceneCommand> {
        self.counter_before
            .map(|_| RemoveEntity::new(self.entity.id).into())
    }

    fn affected_entities(&self) -> Vec<EntityId> {
        vec![self.entity.id]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedEntity {
    pub position: usize,
    pub entity: Entity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveEntity {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<RemovedEntity>,
}

impl RemoveEntity {
    pub fn new(id: EntityId) -> Self {
        Self { id, removed: None }
    }
}

impl Command for RemoveEntity {
    fn label(&self) -> &'static str {
        "remove_entity"
    }

    fn execute(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        ensure_editable(scene, self.id)?;
        let (position, entity) = scene.remove_entity(self.id)?;
        self.removed = Some(RemovedEntity { position, entity });
        Ok(())
    }

    fn undo(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        let removed = self.removed.clone().ok_or(CommandError::NotExecuted)?;
        scene.insert_entity(removed.entity, Some(removed.position))?;
        Ok(())
    }

    fn inverse(&self) -> Option<SceneCommand> {
        self.removed
            .as_ref()
            .map(|removed| InsertEntity::new(removed.entity.clone(), Some(removed.position)).into())
    }

    fn affected_entities(&self) -> Vec<EntityId> {
        vec![self.id]
    }
}

/// 整体替换几何，夹点编辑的提交形式。
///
/// 构造时给出 `before` 则作为乐观校验：执行时当前几何必须与之相同，否则报 `StaleState`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceGeometry {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Geometry>,
    pub after: Geometry,
}

impl ReplaceGeometry {
    pub fn new(id: EntityId, after: Geometry) -> Self {
        Self {
            id,
            before: None,
            after,
        }
    }

    pub fn expecting(id: EntityId, before: Geometry, after: Geometry) -> Self {
        Self {
            id,
            before: Some(before),
            after,
        }
    }
}

impl Command for ReplaceGeometry {
    fn label(&self) -> &'static str {
        "replace_geometry"
    }

    fn execute(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        ensure_editable(scene, self.id)?;
        self.after.validate()?;
        if let (Some(expected), Some(entity)) = (&self.before, scene.entity(self.id)) {
            if &entity.geometry != expected {
                return Err(CommandError::StaleState(self.id.get()));
            }
        }
        let previous = scene.replace_geometry(self.id, self.after.clone())?;
        self.before = Some(previous);
        Ok(())
    }

    fn undo(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        let before = self.before.clone().ok_or(CommandError::NotExecuted)?;
        scene.replace_geometry(self.id, before)?;
        Ok(())
    }

    fn inverse(&self) -> Option<SceneCommand> {
        self.before
            .as_ref()
            .map(|before| ReplaceGeometry::expecting(self.id, self.after.clone(), before.clone()).into())
    }

    fn affected_entities(&self) -> Vec<EntityId> {
        vec![self.id]
    }
}

/// 平移一组实体。执行时保存原几何，撤销时原样写回而不是反向平移，避免浮点累积误差。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveEntities {
    pub ids: Vec<EntityId>,
    pub delta: Vector2,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    before: Vec<Geometry>,
}

impl MoveEntities {
    pub fn new(ids: impl IntoIterator<Item = EntityId>, delta: Vector2) -> Self {
        let mut unique: Vec<EntityId> = Vec::new();
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        Self {
            ids: unique,
            delta,
            before: Vec::new(),
        }
    }
}

impl Command for MoveEntities {
    fn label(&self) -> &'static str {
        "move_entities"
    }

    fn execute(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        if !(self.delta.x().is_finite() && self.delta.y().is_finite()) {
            return Err(GeometryError::NonFinite.into());
        }
        let mut before = Vec::with_capacity(self.ids.len());
        let mut after = Vec::with_capacity(self.ids.len());
        for id in &self.ids {
            ensure_editable(scene, *id)?;
            let entity = scene
                .entity(*id)
                .ok_or(CommandError::EntityNotFound(id.get()))?;
            let moved = entity.geometry.translated(self.delta);
            moved.validate()?;
            before.push(entity.geometry.clone());
            after.push(moved);
        }
        for (id, geometry) in self.ids.iter().zip(after) {
            scene.replace_geometry(*id, geometry)?;
        }
        self.before = before;
        Ok(())
    }

    fn undo(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        if self.before.len() != self.ids.len() {
            return Err(CommandError::NotExecuted);
        }
        for (id, geometry) in self.ids.iter().zip(&self.before) {
            scene.replace_geometry(*id, geometry.clone())?;
        }
        Ok(())
    }

    fn inverse(&self) -> Option<SceneCommand> {
        (self.before.len() == self.ids.len())
            .then(|| MoveEntities::new(self.ids.clone(), self.delta.scale(-1.0)).into())
    }

    fn affected_entities(&self) -> Vec<EntityId> {
        self.ids.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetEntityLayer {
    pub id: EntityId,
    pub layer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

impl SetEntityLayer {
    pub fn new(id: EntityId, layer: impl Into<String>) -> Self {
        Self {
            id,
            layer: layer.into(),
            previous: None,
        }
    }
}

impl Command for SetEntityLayer {
    fn label(&self) -> &'static str {
        "set_entity_layer"
    }

    fn execute(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        ensure_editable(scene, self.id)?;
        let previous = scene.set_entity_layer(self.id, self.layer.clone())?;
        self.previous = Some(previous);
        Ok(())
    }

    fn undo(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        let previous = self.previous.clone().ok_or(CommandError::NotExecuted)?;
        scene.set_entity_layer(self.id, previous)?;
        Ok(())
    }

    fn inverse(&self) -> Option<SceneCommand> {
        self.previous
            .as_ref()
            .map(|previous| SetEntityLayer::new(self.id, previous.clone()).into())
    }

    fn affected_entities(&self) -> Vec<EntityId> {
        vec![self.id]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetEntityStyle {
    pub id: EntityId,
    pub style: StyleOverrides,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<StyleOverrides>,
}

impl SetEntityStyle {
    pub fn new(id: EntityId, style: StyleOverrides) -> Self {
        Self {
            id,
            style,
            previous: None,
        }
    }
}

impl Command for SetEntityStyle {
    fn label(&self) -> &'static str {
        "set_entity_style"
    }

    fn execute(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        ensure_editable(scene, self.id)?;
        if let Some(width) = self.style.width {
            if !width.is_finite() || width < 0.0 {
                return Err(GeometryError::NonFinite.into());
            }
        }
        let previous = scene.set_entity_style(self.id, self.style.clone())?;
        self.previous = Some(previous);
        Ok(())
    }

    fn undo(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        let previous = self.previous.clone().ok_or(CommandError::NotExecuted)?;
        scene.set_entity_style(self.id, previous)?;
        Ok(())
    }

    fn inverse(&self) -> Option<SceneCommand> {
        self.previous
            .as_ref()
            .map(|previous| SetEntityStyle::new(self.id, previous.clone()).into())
    }

    fn affected_entities(&self) -> Vec<EntityId> {
        vec![self.id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxv_core::document::{Circle, Layer, Line};
    use dxv_core::geometry::Point2;

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry {
        Geometry::Line(Line {
            start: Point2::new(x0, y0),
            end: Point2::new(x1, y1),
        })
    }

    fn scene_with_two() -> (Scene, EntityId, EntityId) {
        let mut scene = Scene::new();
        let a = scene
            .add_entity(EntityDraft::new("0", line(0.0, 0.0, 10.0, 0.0)))
            .unwrap();
        let b = scene
            .add_entity(EntityDraft::new(
                "0",
                Geometry::Circle(Circle {
                    center: Point2::new(5.0, 5.0),
                    radius: 2.0,
                }),
            ))
            .unwrap();
        (scene, a, b)
    }

    #[test]
    fn add_then_undo_restores_counter() {
        let (mut scene, _, _) = scene_with_two();
        let original = scene.clone();
        let mut command = AddEntity::new(EntityDraft::new("0", line(1.0, 1.0, 2.0, 2.0)));
        command.execute(&mut scene).unwrap();
        assert_eq!(scene.len(), 3);
        command.undo(&mut scene).unwrap();
        assert_eq!(scene, original);
        command.execute(&mut scene).unwrap();
        assert_eq!(command.assigned, Some(EntityId::new(3)));
    }

    #[test]
    fn degenerate_geometry_is_rejected_before_mutation() {
        let (mut scene, _, _) = scene_with_two();
        let original = scene.clone();
        let mut command = AddEntity::new(EntityDraft::new("0", line(1.0, 1.0, 1.0, 1.0)));
        let err = command.execute(&mut scene).unwrap_err();
        assert!(matches!(err, CommandError::Geometry(GeometryError::CoincidentPoints)));
        assert_eq!(scene, original);
    }

    #[test]
    fn remove_restores_original_position() {
        let (mut scene, a, b) = scene_with_two();
        let original = scene.clone();
        let mut command = RemoveEntity::new(a);
        command.execute(&mut scene).unwrap();
        assert_eq!(scene.entity_ids().collect::<Vec<_>>(), vec![b]);
        command.undo(&mut scene).unwrap();
        assert_eq!(scene, original);
        assert_eq!(scene.position_of(a), Some(0));
    }

    #[test]
    fn locked_layer_blocks_edits() {
        let mut scene = Scene::new();
        let mut layer = Layer::new("walls");
        layer.is_locked = true;
        scene.add_layer(layer).unwrap();
        let id = scene
            .add_entity(EntityDraft::new("walls", line(0.0, 0.0, 1.0, 0.0)))
            .unwrap();
        let original = scene.clone();
        let err = MoveEntities::new([id], Vector2::new(1.0, 0.0))
            .execute(&mut scene)
            .unwrap_err();
        assert!(matches!(err, CommandError::LayerLocked(name) if name == "walls"));
        assert_eq!(scene, original);
    }

    #[test]
    fn move_with_missing_id_changes_nothing() {
        let (mut scene, a, _) = scene_with_two();
        let original = scene.clone();
        let err = MoveEntities::new([a, EntityId::new(99)], Vector2::new(3.0, 0.0))
            .execute(&mut scene)
            .unwrap_err();
        assert!(matches!(err, CommandError::EntityNotFound(99)));
        assert_eq!(scene, original);
    }

    #[test]
    fn move_undo_is_exact() {
        let (mut scene, a, b) = scene_with_two();
        let original = scene.clone();
        let mut command = MoveEntities::new([a, b, a], Vector2::new(0.1, 0.7));
        assert_eq!(command.ids, vec![a, b]);
        command.execute(&mut scene).unwrap();
        assert_ne!(scene, original);
        command.undo(&mut scene).unwrap();
        assert_eq!(scene, original);
    }

    #[test]
    fn replace_geometry_detects_stale_state() {
        let (mut scene, a, _) = scene_with_two();
        let mut stale = ReplaceGeometry::expecting(
            a,
            line(0.0, 0.0, 99.0, 0.0),
            line(0.0, 0.0, 20.0, 0.0),
        );
        assert!(matches!(
            stale.execute(&mut scene),
            Err(CommandError::StaleState(_))
        ));
        let mut fresh = ReplaceGeometry::expecting(
            a,
            line(0.0, 0.0, 10.0, 0.0),
            line(0.0, 0.0, 20.0, 0.0),
        );
        fresh.execute(&mut scene).unwrap();
        assert_eq!(scene.entity(a).unwrap().geometry, line(0.0, 0.0, 20.0, 0.0));
        fresh.undo(&mut scene).unwrap();
        assert_eq!(scene.entity(a).unwrap().geometry, line(0.0, 0.0, 10.0, 0.0));
    }

    #[test]
    fn layer_and_style_changes_round_trip() {
        let (mut scene, a, _) = scene_with_two();
        scene.add_layer(Layer::new("dims")).unwrap();
        let original = scene.clone();

        let mut to_dims = SetEntityLayer::new(a, "dims");
        to_dims.execute(&mut scene).unwrap();
        assert_eq!(scene.entity(a).unwrap().layer, "dims");

        let mut style = SetEntityStyle::new(
            a,
            StyleOverrides {
                width: Some(2.0),
                ..StyleOverrides::default()
            },
        );
        style.execute(&mut scene).unwrap();
        style.undo(&mut scene).unwrap();
        to_dims.undo(&mut scene).unwrap();
        assert_eq!(scene, original);

        let err = SetEntityLayer::new(a, "missing")
            .execute(&mut scene)
            .unwrap_err();
        assert!(matches!(err, CommandError::Scene(_)));
    }
}
