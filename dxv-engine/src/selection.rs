use std::collections::BTreeSet;

use dxv_core::document::{Entity, EntityId, Scene};
use dxv_core::geometry::{Bounds2D, Point2};
use dxv_core::hit_test;

/// 框选模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// 实体范围必须完全落在矩形内。
    Window,
    /// 与矩形有任何几何接触即选中，是窗口选择的超集。
    Crossing,
}

impl SelectionMode {
    /// CAD 惯例：从左向右拖为窗口选择，从右向左拖为交叉选择。
    pub fn from_drag(start: Point2, end: Point2) -> Self {
        if end.x() >= start.x() {
            SelectionMode::Window
        } else {
            SelectionMode::Crossing
        }
    }
}

/// 图层可见且未锁定的实体才能被选中。
pub fn is_selectable(scene: &Scene, entity: &Entity) -> bool {
    scene
        .resolve_layer(&entity.layer)
        .map(|layer| layer.is_visible && !layer.is_locked)
        .unwrap_or(false)
}

/// 当前选中的实体 ID 集合，按 ID 有序。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: BTreeSet<EntityId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.ids.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.ids.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<EntityId> {
        self.iter().collect()
    }

    /// 清空选择，返回是否有变化。
    pub fn clear(&mut self) -> bool {
        let changed = !self.ids.is_empty();
        self.ids.clear();
        changed
    }

    pub fn replace<I>(&mut self, ids: I) -> bool
    where
        I: IntoIterator<Item = EntityId>,
    {
        let next: BTreeSet<EntityId> = ids.into_iter().collect();
        let changed = next != self.ids;
        self.ids = next;
        changed
    }

    pub fn extend<I>(&mut self, ids: I) -> bool
    where
        I: IntoIterator<Item = EntityId>,
    {
        let before = self.ids.len();
        self.ids.extend(ids);
        self.ids.len() != before
    }

    /// 切换单个实体的选中状态，返回切换后是否选中。
    pub fn toggle(&mut self, id: EntityId) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    /// 剔除已不在场景中、或已变为不可选的实体，返回剔除数量。
    pub fn purge(&mut self, scene: &Scene) -> usize {
        let before = self.ids.len();
        self.ids.retain(|id| {
            scene
                .entity(*id)
                .is_some_and(|entity| is_selectable(scene, entity))
        });
        before - self.ids.len()
    }

    /// 点选。`additive` 为真时切换命中实体；否则用命中实体替换选择，未命中则清空。
    pub fn pick(&mut self, scene: &Scene, point: Point2, tolerance: f64, additive: bool) -> bool {
        let hit = hit_test::pick(scene, point, tolerance, |entity| is_selectable(scene, entity));
        self.apply_pick(hit, additive)
    }

    /// 按已完成的点选结果更新选择集。
    pub fn apply_pick(&mut self, hit: Option<EntityId>, additive: bool) -> bool {
        match (hit, additive) {
            (Some(id), true) => {
                self.toggle(id);
                true
            }
            (Some(id), false) => self.replace([id]),
            (None, true) => false,
            (None, false) => self.clear(),
        }
    }

    /// 矩形框选。`additive` 为真时并入现有选择。
    pub fn select_rect(
        &mut self,
        scene: &Scene,
        corner_a: Point2,
        corner_b: Point2,
        mode: SelectionMode,
        additive: bool,
    ) -> bool {
        let rect = Bounds2D::from_corners(corner_a, corner_b);
        let filter = |entity: &Entity| is_selectable(scene, entity);
        let hits = match mode {
            SelectionMode::Window => hit_test::entities_inside(scene, &rect, filter),
            SelectionMode::Crossing => hit_test::entities_crossing(scene, &rect, filter),
        };
        if additive {
            self.extend(hits)
        } else {
            self.replace(hits)
        }
    }

    pub fn select_all(&mut self, scene: &Scene) -> bool {
        let all: Vec<EntityId> = scene
            .entities()
            .filter(|entity| is_selectable(scene, entity))
            .map(|entity| entity.id)
            .collect();
        self.replace(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxv_core::document::{Circle, EntityDraft, Geometry, Layer, Line};

    fn scene() -> (Scene, EntityId, EntityId, EntityId) {
        let mut scene = Scene::new();
        let mut hidden = Layer::new("hidden");
        hidden.is_visible = false;
        scene.add_layer(hidden).unwrap();
        let a = scene
            .add_entity(EntityDraft::new(
                "0",
                Geometry::Line(Line {
                    start: Point2::new(0.0, 0.0),
                    end: Point2::new(10.0, 0.0),
                }),
            ))
            .unwrap();
        let b = scene
            .add_entity(EntityDraft::new(
                "0",
                Geometry::Circle(Circle {
                    center: Point2::new(30.0, 0.0),
                    radius: 5.0,
                }),
            ))
            .unwrap();
        let c = scene
            .add_entity(EntityDraft::new(
                "hidden",
                Geometry::Line(Line {
                    start: Point2::new(0.0, 5.0),
                    end: Point2::new(10.0, 5.0),
                }),
            ))
            .unwrap();
        (scene, a, b, c)
    }

    #[test]
    fn drag_direction_picks_mode() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(20.0, 20.0);
        assert_eq!(SelectionMode::from_drag(a, b), SelectionMode::Window);
        assert_eq!(SelectionMode::from_drag(b, a), SelectionMode::Crossing);
    }

    #[test]
    fn pick_replaces_and_additive_toggles() {
        let (scene, a, b, _) = scene();
        let mut selection = SelectionSet::new();
        assert!(selection.pick(&scene, Point2::new(5.0, 0.2), 0.5, false));
        assert_eq!(selection.to_vec(), vec![a]);
        selection.pick(&scene, Point2::new(35.0, 0.0), 0.5, true);
        assert_eq!(selection.to_vec(), vec![a, b]);
        selection.pick(&scene, Point2::new(5.0, 0.0), 0.5, true);
        assert_eq!(selection.to_vec(), vec![b]);
        selection.pick(&scene, Point2::new(5.0, 0.0), 0.5, false);
        assert_eq!(selection.to_vec(), vec![a]);
        assert!(selection.pick(&scene, Point2::new(100.0, 100.0), 0.5, false));
        assert!(selection.is_empty());
    }

    #[test]
    fn precomputed_hit_matches_pick() {
        let (scene, a, b, _) = scene();
        let mut selection = SelectionSet::new();
        let hit = hit_test::pick(&scene, Point2::new(35.0, 0.0), 0.5, |entity| {
            is_selectable(&scene, entity)
        });
        assert_eq!(hit, Some(b));
        assert!(selection.apply_pick(hit, false));
        assert!(!selection.apply_pick(Some(b), false));
        assert!(selection.apply_pick(Some(a), true));
        assert_eq!(selection.to_vec(), vec![a, b]);
        assert!(!selection.apply_pick(None, true));
        assert!(selection.apply_pick(None, false));
        assert!(selection.is_empty());
    }

    #[test]
    fn hidden_layers_are_not_selectable() {
        let (scene, a, b, _) = scene();
        let mut selection = SelectionSet::new();
        selection.pick(&scene, Point2::new(5.0, 5.0), 0.5, false);
        assert!(selection.is_empty());
        selection.select_all(&scene);
        assert_eq!(selection.to_vec(), vec![a, b]);
    }

    #[test]
    fn window_and_crossing_differ() {
        let (scene, a, b, _) = scene();
        let mut selection = SelectionSet::new();
        selection.select_rect(
            &scene,
            Point2::new(-1.0, -6.0),
            Point2::new(31.0, 6.0),
            SelectionMode::Window,
            false,
        );
        assert_eq!(selection.to_vec(), vec![a]);
        selection.select_rect(
            &scene,
            Point2::new(-1.0, -6.0),
            Point2::new(31.0, 6.0),
            SelectionMode::Crossing,
            false,
        );
        assert_eq!(selection.to_vec(), vec![a, b]);
    }

    #[test]
    fn purge_drops_removed_entities() {
        let (mut scene, a, b, _) = scene();
        let mut selection = SelectionSet::new();
        selection.replace([a, b]);
        scene.remove_entity(a).unwrap();
        assert_eq!(selection.purge(&scene), 1);
        assert_eq!(selection.to_vec(), vec![b]);
    }
}
