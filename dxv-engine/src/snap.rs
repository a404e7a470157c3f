//! 捕捉引擎：多种策略组合生成候选点，按优先级、再按距离选出唯一结果。
//!
//! 每次查询先用空间索引筛出光标附近的实体，再在这些实体的精确图元上求候选，
//! 不会遍历整个场景。没有候选时返回 `None`，这不是错误。

use dxv_config::SnappingConfig;
use dxv_core::document::{EntityId, Geometry, Scene};
use dxv_core::geometry::{
    Point2, Vector2, angle_in_sweep, point_on_circle, project_onto_line, tangent_points,
};
use dxv_core::tessellate::{Primitive, scene_primitives};
use dxv_core::tolerance::{DUPLICATE_VERTEX, INTERACTION};
use tracing::warn;

/// 延伸、平行这类追踪捕捉的搜索范围相对捕捉半径的倍数。
const TRACKING_REACH: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SnapKind {
    Grid,
    Endpoint,
    Midpoint,
    Center,
    Intersection,
    Perpendicular,
    Tangent,
    Parallel,
    Extension,
}

impl SnapKind {
    pub const ALL: [SnapKind; 9] = [
        SnapKind::Grid,
        SnapKind::Endpoint,
        SnapKind::Midpoint,
        SnapKind::Center,
        SnapKind::Intersection,
        SnapKind::Perpendicular,
        SnapKind::Tangent,
        SnapKind::Parallel,
        SnapKind::Extension,
    ];

    /// 数值越大越优先。对象捕捉总是压过网格。
    pub fn priority(self) -> u8 {
        match self {
            SnapKind::Endpoint => 100,
            SnapKind::Intersection => 95,
            SnapKind::Midpoint => 90,
            SnapKind::Center => 85,
            SnapKind::Perpendicular => 70,
            SnapKind::Tangent => 65,
            SnapKind::Extension => 50,
            SnapKind::Parallel => 45,
            SnapKind::Grid => 10,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SnapKind::Grid => "grid",
            SnapKind::Endpoint => "endpoint",
            SnapKind::Midpoint => "midpoint",
            SnapKind::Center => "center",
            SnapKind::Intersection => "intersection",
            SnapKind::Perpendicular => "perpendicular",
            SnapKind::Tangent => "tangent",
            SnapKind::Parallel => "parallel",
            SnapKind::Extension => "extension",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let name = if name == "node" { "endpoint" } else { name.as_str() };
        SnapKind::ALL.into_iter().find(|kind| kind.name() == name)
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// 启用的策略集合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapMask(u16);

impl SnapMask {
    pub const NONE: SnapMask = SnapMask(0);

    pub fn all() -> Self {
        SnapKind::ALL.into_iter().collect()
    }

    /// 由配置中的策略名构造；未知名称记录警告后跳过。
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut mask = SnapMask::NONE;
        for name in names {
            match SnapKind::from_name(name.as_ref()) {
                Some(kind) => mask.insert(kind),
                None => warn!(name = name.as_ref(), "忽略未知的捕捉策略"),
            }
        }
        mask
    }

    #[inline]
    pub fn contains(self, kind: SnapKind) -> bool {
        self.0 & kind.bit() != 0
    }

    #[inline]
    pub fn insert(&mut self, kind: SnapKind) {
        self.0 |= kind.bit();
    }

    #[inline]
    pub fn remove(&mut self, kind: SnapKind) {
        self.0 &= !kind.bit();
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<SnapKind> for SnapMask {
    fn from_iter<T: IntoIterator<Item = SnapKind>>(iter: T) -> Self {
        let mut mask = SnapMask::NONE;
        for kind in iter {
            mask.insert(kind);
        }
        mask
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapCandidate {
    pub point: Point2,
    pub kind: SnapKind,
    pub priority: u8,
    pub distance: f64,
    pub source: Option<EntityId>,
}

impl SnapCandidate {
    fn new(kind: SnapKind, point: Point2, cursor: Point2, source: Option<EntityId>) -> Self {
        Self {
            point,
            kind,
            priority: kind.priority(),
            distance: point.distance_to(cursor),
            source,
        }
    }

    /// 排序键：优先级高者在前，同优先级距离近者在前。
    fn outranks(&self, other: &SnapCandidate) -> bool {
        self.priority > other.priority
            || (self.priority == other.priority && self.distance < other.distance)
    }
}

/// 单次捕捉查询的上下文，候选实体已由空间索引预筛。
pub struct SnapQuery<'a> {
    pub scene: &'a Scene,
    pub cursor: Point2,
    /// 世界单位的搜索半径。
    pub radius: f64,
    /// 工具已确定的上一个点，垂足、切点、平行捕捉以它为基准。
    pub reference: Option<Point2>,
    pub grid_spacing: f64,
    pub nearby: Vec<EntityId>,
    pub tracking: Vec<EntityId>,
}

impl SnapQuery<'_> {
    fn primitives_of(&self, id: EntityId) -> Vec<Primitive> {
        self.scene
            .entity(id)
            .map(|entity| scene_primitives(self.scene, &entity.geometry))
            .unwrap_or_default()
    }

    fn nearby_primitives(&self) -> impl Iterator<Item = (EntityId, Primitive)> + '_ {
        self.nearby
            .iter()
            .flat_map(|id| self.primitives_of(*id).into_iter().map(move |p| (*id, p)))
    }

    fn tracking_primitives(&self) -> impl Iterator<Item = (EntityId, Primitive)> + '_ {
        self.tracking
            .iter()
            .flat_map(|id| self.primitives_of(*id).into_iter().map(move |p| (*id, p)))
    }

    fn candidate(&self, kind: SnapKind, point: Point2, source: Option<EntityId>) -> SnapCandidate {
        SnapCandidate::new(kind, point, self.cursor, source)
    }
}

pub trait SnapStrategy {
    fn kind(&self) -> SnapKind;

    /// 产生候选点；半径过滤由引擎统一完成。
    fn candidates(&self, query: &SnapQuery<'_>) -> Vec<SnapCandidate>;
}

pub struct GridSnap;

impl SnapStrategy for GridSnap {
    fn kind(&self) -> SnapKind {
        SnapKind::Grid
    }

    fn candidates(&self, query: &SnapQuery<'_>) -> Vec<SnapCandidate> {
        let spacing = query.grid_spacing;
        if !(spacing.is_finite() && spacing > INTERACTION) {
            return Vec::new();
        }
        let node = Point2::new(
            (query.cursor.x() / spacing).round() * spacing,
            (query.cursor.y() / spacing).round() * spacing,
        );
        vec![query.candidate(SnapKind::Grid, node, None)]
    }
}

pub struct EndpointSnap;

impl SnapStrategy for EndpointSnap {
    fn kind(&self) -> SnapKind {
        SnapKind::Endpoint
    }

    fn candidates(&self, query: &SnapQuery<'_>) -> Vec<SnapCandidate> {
        let mut out = Vec::new();
        for (id, primitive) in query.nearby_primitives() {
            if let Some((a, b)) = primitive.endpoints() {
                out.push(query.candidate(SnapKind::Endpoint, a, Some(id)));
                out.push(query.candidate(SnapKind::Endpoint, b, Some(id)));
            }
        }
        out
    }
}

pub struct MidpointSnap;

impl SnapStrategy for MidpointSnap {
    fn kind(&self) -> SnapKind {
        SnapKind::Midpoint
    }

    fn candidates(&self, query: &SnapQuery<'_>) -> Vec<SnapCandidate> {
        query
            .nearby_primitives()
            .filter(|(_, primitive)| !is_degenerate(primitive))
            .filter_map(|(id, primitive)| {
                primitive
                    .midpoint()
                    .map(|point| query.candidate(SnapKind::Midpoint, point, Some(id)))
            })
            .collect()
    }
}

pub struct CenterSnap;

impl SnapStrategy for CenterSnap {
    fn kind(&self) -> SnapKind {
        SnapKind::Center
    }

    fn candidates(&self, query: &SnapQuery<'_>) -> Vec<SnapCandidate> {
        let mut out: Vec<SnapCandidate> = query
            .nearby_primitives()
            .filter_map(|(id, primitive)| match primitive {
                Primitive::Circle { center, .. } | Primitive::Arc { center, .. } => {
                    Some(query.candidate(SnapKind::Center, center, Some(id)))
                }
                Primitive::Segment { .. } => None,
            })
            .collect();
        for id in &query.nearby {
            if let Some(entity) = query.scene.entity(*id) {
                match &entity.geometry {
                    Geometry::Ellipse(ellipse) => {
                        out.push(query.candidate(SnapKind::Center, ellipse.center, Some(*id)));
                    }
                    Geometry::Rectangle(rect) => {
                        out.push(query.candidate(
                            SnapKind::Center,
                            rect.bounds().center(),
                            Some(*id),
                        ));
                    }
                    _ => {}
                }
            }
        }
        out
    }
}

pub struct IntersectionSnap;

impl SnapStrategy for IntersectionSnap {
    fn kind(&self) -> SnapKind {
        SnapKind::Intersection
    }

    fn candidates(&self, query: &SnapQuery<'_>) -> Vec<SnapCandidate> {
        let primitives: Vec<(EntityId, Primitive)> = query
            .nearby_primitives()
            .filter(|(_, primitive)| {
                !is_degenerate(primitive) && primitive.distance_to(query.cursor) <= query.radius
            })
            .collect();
        let mut out = Vec::new();
        for (i, (id_a, a)) in primitives.iter().enumerate() {
            for (id_b, b) in &primitives[i + 1..] {
                if id_a == id_b {
                    continue;
                }
                for point in a.intersections(b) {
                    out.push(query.candidate(SnapKind::Intersection, point, Some(*id_a)));
                }
            }
        }
        out
    }
}

pub struct PerpendicularSnap;

impl SnapStrategy for PerpendicularSnap {
    fn kind(&self) -> SnapKind {
        SnapKind::Perpendicular
    }

    fn candidates(&self, query: &SnapQuery<'_>) -> Vec<SnapCandidate> {
        let Some(reference) = query.reference else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (id, primitive) in query.nearby_primitives() {
            match primitive {
                Primitive::Segment { start, end } => {
                    if let Ok((foot, t)) = project_onto_line(reference, start, end) {
                        if (0.0..=1.0).contains(&t) {
                            out.push(query.candidate(SnapKind::Perpendicular, foot, Some(id)));
                        }
                    }
                }
                Primitive::Circle { center, radius } | Primitive::Arc { center, radius, .. } => {
                    let Some(direction) = center.vector_to(reference).normalize() else {
                        continue;
                    };
                    let base = direction.angle();
                    for angle in [base, base + std::f64::consts::PI] {
                        let point = point_on_circle(center, radius, angle);
                        if on_round_sweep(&primitive, point) {
                            out.push(query.candidate(SnapKind::Perpendicular, point, Some(id)));
                        }
                    }
                }
            }
        }
        out
    }
}

pub struct TangentSnap;

impl SnapStrategy for TangentSnap {
    fn kind(&self) -> SnapKind {
        SnapKind::Tangent
    }

    fn candidates(&self, query: &SnapQuery<'_>) -> Vec<SnapCandidate> {
        let Some(reference) = query.reference else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (id, primitive) in query.nearby_primitives() {
            if let Primitive::Circle { center, radius } | Primitive::Arc { center, radius, .. } =
                primitive
            {
                for point in tangent_points(reference, center, radius) {
                    if on_round_sweep(&primitive, point) {
                        out.push(query.candidate(SnapKind::Tangent, point, Some(id)));
                    }
                }
            }
        }
        out
    }
}

/// 过基准点、与光标附近线段平行的追踪线上的投影点。
pub struct ParallelSnap;

impl SnapStrategy for ParallelSnap {
    fn kind(&self) -> SnapKind {
        SnapKind::Parallel
    }

    fn candidates(&self, query: &SnapQuery<'_>) -> Vec<SnapCandidate> {
        let Some(reference) = query.reference else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (id, primitive) in query.tracking_primitives() {
            let Primitive::Segment { start, end } = primitive else {
                continue;
            };
            let Some(direction) = start.vector_to(end).normalize() else {
                continue;
            };
            let along = direction.dot(reference.vector_to(query.cursor));
            if along.abs() <= INTERACTION {
                continue;
            }
            let point = reference.translate(direction.scale(along));
            out.push(query.candidate(SnapKind::Parallel, point, Some(id)));
        }
        out
    }
}

/// 线段或圆弧越过端点之后的延长线。
pub struct ExtensionSnap;

impl SnapStrategy for ExtensionSnap {
    fn kind(&self) -> SnapKind {
        SnapKind::Extension
    }

    fn candidates(&self, query: &SnapQuery<'_>) -> Vec<SnapCandidate> {
        let mut out = Vec::new();
        for (id, primitive) in query.tracking_primitives() {
            match primitive {
                Primitive::Segment { start, end } => {
                    if let Ok((foot, t)) = project_onto_line(query.cursor, start, end) {
                        if t < 0.0 || t > 1.0 {
                            out.push(query.candidate(SnapKind::Extension, foot, Some(id)));
                        }
                    }
                }
                Primitive::Arc {
                    center,
                    radius,
                    start_angle,
                    end_angle,
                } => {
                    let angle = center.vector_to(query.cursor).angle();
                    if !angle_in_sweep(angle, start_angle, end_angle) {
                        let point = center.translate(Vector2::from_angle(angle).scale(radius));
                        out.push(query.candidate(SnapKind::Extension, point, Some(id)));
                    }
                }
                Primitive::Circle { .. } => {}
            }
        }
        out
    }
}

fn is_degenerate(primitive: &Primitive) -> bool {
    matches!(primitive, Primitive::Segment { start, end } if start.distance_to(*end) <= DUPLICATE_VERTEX)
}

fn on_round_sweep(primitive: &Primitive, point: Point2) -> bool {
    match *primitive {
        Primitive::Arc {
            center,
            start_angle,
            end_angle,
            ..
        } => angle_in_sweep(center.vector_to(point).angle(), start_angle, end_angle),
        _ => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapSettings {
    pub radius_px: f64,
    pub grid_spacing: f64,
    pub mask: SnapMask,
}

impl Default for SnapSettings {
    fn default() -> Self {
        Self::from(&SnappingConfig::default())
    }
}

impl From<&SnappingConfig> for SnapSettings {
    fn from(config: &SnappingConfig) -> Self {
        Self {
            radius_px: config.radius_px,
            grid_spacing: config.grid_spacing,
            mask: SnapMask::from_names(&config.enabled),
        }
    }
}

pub struct SnapEngine {
    strategies: Vec<Box<dyn SnapStrategy>>,
    settings: SnapSettings,
    enabled: bool,
}

impl Default for SnapEngine {
    fn default() -> Self {
        Self::new(SnapSettings::default())
    }
}

impl SnapEngine {
    pub fn new(settings: SnapSettings) -> Self {
        Self {
            strategies: vec![
                Box::new(GridSnap),
                Box::new(EndpointSnap),
                Box::new(MidpointSnap),
                Box::new(CenterSnap),
                Box::new(IntersectionSnap),
                Box::new(PerpendicularSnap),
                Box::new(TangentSnap),
                Box::new(ParallelSnap),
                Box::new(ExtensionSnap),
            ],
            settings,
            enabled: true,
        }
    }

    /// 追加或替换同类策略。
    pub fn register<S: SnapStrategy + 'static>(&mut self, strategy: S) {
        let kind = strategy.kind();
        self.strategies.retain(|existing| existing.kind() != kind);
        self.strategies.push(Box::new(strategy));
    }

    #[inline]
    pub fn settings(&self) -> SnapSettings {
        self.settings
    }

    #[inline]
    pub fn mask(&self) -> SnapMask {
        self.settings.mask
    }

    pub fn set_mask(&mut self, mask: SnapMask) {
        self.settings.mask = mask;
    }

    pub fn set_kind_enabled(&mut self, kind: SnapKind, enabled: bool) {
        if enabled {
            self.settings.mask.insert(kind);
        } else {
            self.settings.mask.remove(kind);
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 全局开关，返回切换后的状态。
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    /// 半径内的全部候选，按优先级与距离排序。`scale` 为当前像素/世界单位比例。
    pub fn candidates(
        &self,
        scene: &Scene,
        cursor: Point2,
        scale: f64,
        reference: Option<Point2>,
    ) -> Vec<SnapCandidate> {
        if !self.enabled || self.settings.mask.is_empty() || !(scale.is_finite() && scale > 0.0) {
            return Vec::new();
        }
        let radius = self.settings.radius_px / scale;
        let visible = |id: &EntityId| {
            scene.entity(*id).is_some_and(|entity| {
                scene
                    .resolve_layer(&entity.layer)
                    .is_ok_and(|layer| layer.is_visible)
            })
        };
        let query = SnapQuery {
            scene,
            cursor,
            radius,
            reference,
            grid_spacing: self.settings.grid_spacing,
            nearby: scene
                .query_point(cursor, radius)
                .into_iter()
                .filter(visible)
                .collect(),
            tracking: scene
                .query_point(cursor, radius * TRACKING_REACH)
                .into_iter()
                .filter(visible)
                .collect(),
        };
        let mut found: Vec<SnapCandidate> = self
            .strategies
            .iter()
            .filter(|strategy| self.settings.mask.contains(strategy.kind()))
            .flat_map(|strategy| strategy.candidates(&query))
            .filter(|candidate| candidate.point.is_finite() && candidate.distance <= radius)
            .collect();
        found.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.distance.total_cmp(&b.distance))
        });
        found
    }

    /// 捕捉结果：最高优先级者胜，同级取最近；没有候选返回 `None`。
    pub fn snap(
        &self,
        scene: &Scene,
        cursor: Point2,
        scale: f64,
        reference: Option<Point2>,
    ) -> Option<SnapCandidate> {
        self.candidates(scene, cursor, scale, reference)
            .into_iter()
            .reduce(|best, next| if next.outranks(&best) { next } else { best })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxv_core::document::{Circle, EntityDraft, Line};

    fn add(scene: &mut Scene, geometry: Geometry) -> EntityId {
        scene.add_entity(EntityDraft::new("0", geometry)).unwrap()
    }

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry {
        Geometry::Line(Line {
            start: Point2::new(x0, y0),
            end: Point2::new(x1, y1),
        })
    }

    fn engine(kinds: &[SnapKind], radius_px: f64) -> SnapEngine {
        SnapEngine::new(SnapSettings {
            radius_px,
            grid_spacing: 10.0,
            mask: kinds.iter().copied().collect(),
        })
    }

    #[test]
    fn names_round_trip_and_unknown_names_are_skipped() {
        for kind in SnapKind::ALL {
            assert_eq!(SnapKind::from_name(kind.name()), Some(kind));
        }
        let mask = SnapMask::from_names(["Endpoint", "grid", "bogus"]);
        assert!(mask.contains(SnapKind::Endpoint));
        assert!(mask.contains(SnapKind::Grid));
        assert!(!mask.contains(SnapKind::Center));
    }

    #[test]
    fn priority_beats_distance() {
        let mut scene = Scene::new();
        add(&mut scene, line(12.0, 12.0, 30.0, 30.0));
        let engine = engine(&SnapKind::ALL, 5.0);
        let result = engine.snap(&scene, Point2::new(11.0, 9.0), 1.0, None).unwrap();
        assert_eq!(result.kind, SnapKind::Endpoint);
        assert_eq!(result.point, Point2::new(12.0, 12.0));
    }

    #[test]
    fn ties_go_to_the_nearest() {
        let mut scene = Scene::new();
        add(&mut scene, line(0.0, 0.0, 10.0, 0.0));
        add(&mut scene, line(10.5, 0.0, 20.0, 0.0));
        let engine = engine(&[SnapKind::Endpoint], 5.0);
        let result = engine.snap(&scene, Point2::new(10.4, 0.0), 1.0, None).unwrap();
        assert_eq!(result.point, Point2::new(10.5, 0.0));
    }

    #[test]
    fn nothing_within_radius_is_none() {
        let mut scene = Scene::new();
        add(&mut scene, line(0.0, 0.0, 10.0, 0.0));
        let engine = engine(&[SnapKind::Endpoint, SnapKind::Midpoint], 2.0);
        assert!(engine.snap(&scene, Point2::new(50.0, 50.0), 1.0, None).is_none());
        let zoomed_out = engine.snap(&scene, Point2::new(5.0, 3.0), 0.5, None).unwrap();
        assert_eq!(zoomed_out.kind, SnapKind::Midpoint);
    }

    #[test]
    fn intersection_and_center() {
        let mut scene = Scene::new();
        add(&mut scene, line(0.0, 0.0, 10.0, 10.0));
        add(&mut scene, line(0.0, 10.0, 10.0, 0.0));
        add(
            &mut scene,
            Geometry::Circle(Circle {
                center: Point2::new(40.0, 0.0),
                radius: 1.0,
            }),
        );
        let engine = engine(&[SnapKind::Intersection, SnapKind::Center], 3.0);
        let hit = engine.snap(&scene, Point2::new(5.5, 4.5), 1.0, None).unwrap();
        assert_eq!(hit.kind, SnapKind::Intersection);
        assert!(hit.point.distance_to(Point2::new(5.0, 5.0)) < 1e-9);
        let center = engine.snap(&scene, Point2::new(40.5, 0.5), 1.0, None).unwrap();
        assert_eq!(center.kind, SnapKind::Center);
    }

    #[test]
    fn perpendicular_and_tangent_need_reference() {
        let mut scene = Scene::new();
        add(&mut scene, line(0.0, 0.0, 20.0, 0.0));
        add(
            &mut scene,
            Geometry::Circle(Circle {
                center: Point2::new(50.0, 0.0),
                radius: 5.0,
            }),
        );
        let engine = engine(&[SnapKind::Perpendicular, SnapKind::Tangent], 3.0);
        assert!(engine.snap(&scene, Point2::new(7.0, 1.0), 1.0, None).is_none());
        let foot = engine
            .snap(&scene, Point2::new(7.0, 1.0), 1.0, Some(Point2::new(8.0, 10.0)))
            .unwrap();
        assert_eq!(foot.kind, SnapKind::Perpendicular);
        assert!(foot.point.distance_to(Point2::new(8.0, 0.0)) < 1e-9);

        let reference = Point2::new(60.0, 0.0);
        let tangents = tangent_points(reference, Point2::new(50.0, 0.0), 5.0);
        let near = tangents[0].translate(Vector2::new(0.5, 0.0));
        let tangent = engine.snap(&scene, near, 1.0, Some(reference)).unwrap();
        assert_eq!(tangent.kind, SnapKind::Tangent);
    }

    #[test]
    fn extension_tracks_beyond_endpoint() {
        let mut scene = Scene::new();
        add(&mut scene, line(0.0, 0.0, 10.0, 0.0));
        let engine = engine(&[SnapKind::Extension], 2.0);
        let hit = engine.snap(&scene, Point2::new(25.0, 1.0), 1.0, None).unwrap();
        assert_eq!(hit.kind, SnapKind::Extension);
        assert!(hit.point.distance_to(Point2::new(25.0, 0.0)) < 1e-9);
    }

    #[test]
    fn hidden_layers_and_global_toggle() {
        let mut scene = Scene::new();
        let mut hidden = dxv_core::document::Layer::new("hidden");
        hidden.is_visible = false;
        scene.add_layer(hidden).unwrap();
        scene
            .add_entity(EntityDraft::new("hidden", line(0.0, 0.0, 10.0, 0.0)))
            .unwrap();
        let mut engine = engine(&[SnapKind::Endpoint, SnapKind::Grid], 3.0);
        let hit = engine.snap(&scene, Point2::new(0.5, 0.5), 1.0, None).unwrap();
        assert_eq!(hit.kind, SnapKind::Grid);
        assert!(!engine.toggle());
        assert!(engine.snap(&scene, Point2::new(0.5, 0.5), 1.0, None).is_none());
    }
}
