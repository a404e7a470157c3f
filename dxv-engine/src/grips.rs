//! 夹点：选中实体上的控制点。拖动期间只更新预览，释放时生成一条 `ReplaceGeometry` 命令。

use dxv_config::GripConfig;
use dxv_core::document::{
    Arc, Circle, Dimension, Ellipse, Entity, EntityId, Geometry, Line, Polyline, Rectangle, Scene,
};
use dxv_core::geometry::{GeometryError, Point2, Vector2, arc_through_points, midpoint};

use crate::commands::{ReplaceGeometry, SceneCommand};
use crate::selection::{SelectionSet, is_selectable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripState {
    Cold,
    Warm,
    Hot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GripSettings {
    pub base_size_px: f64,
    pub warm_multiplier: f64,
    pub hot_multiplier: f64,
}

impl Default for GripSettings {
    fn default() -> Self {
        Self::from(&GripConfig::default())
    }
}

impl From<&GripConfig> for GripSettings {
    fn from(config: &GripConfig) -> Self {
        Self {
            base_size_px: config.base_size_px,
            warm_multiplier: config.warm_multiplier,
            hot_multiplier: config.hot_multiplier,
        }
    }
}

impl GripSettings {
    /// 某状态下夹点的屏幕边长（像素）。
    pub fn size_for(&self, state: GripState) -> f64 {
        match state {
            GripState::Cold => self.base_size_px,
            GripState::Warm => self.base_size_px * self.warm_multiplier,
            GripState::Hot => self.base_size_px * self.hot_multiplier,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripKind {
    Endpoint,
    Midpoint,
    Center,
    Vertex,
    Quadrant,
    Insert,
    Offset,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grip {
    pub entity: EntityId,
    pub index: usize,
    pub kind: GripKind,
    pub position: Point2,
}

impl Grip {
    #[inline]
    pub fn key(&self) -> (EntityId, usize) {
        (self.entity, self.index)
    }
}

/// 实体的全部夹点，`index` 与 [`apply_grip`] 的编号一致。
pub fn grips_for(entity: &Entity) -> Vec<Grip> {
    let make = |index: usize, kind: GripKind, position: Point2| Grip {
        entity: entity.id,
        index,
        kind,
        position,
    };
    match &entity.geometry {
        Geometry::Line(line) => vec![
            make(0, GripKind::Endpoint, line.start),
            make(1, GripKind::Endpoint, line.end),
            make(2, GripKind::Midpoint, midpoint(line.start, line.end)),
        ],
        Geometry::Circle(circle) => vec![
            make(0, GripKind::Center, circle.center),
            make(
                1,
                GripKind::Quadrant,
                Point2::new(circle.center.x() + circle.radius, circle.center.y()),
            ),
        ],
        Geometry::Arc(arc) => vec![
            make(0, GripKind::Center, arc.center),
            make(1, GripKind::Endpoint, arc.start_point()),
            make(2, GripKind::Endpoint, arc.end_point()),
            make(3, GripKind::Midpoint, arc.mid_point()),
        ],
        Geometry::Ellipse(ellipse) => vec![
            make(0, GripKind::Center, ellipse.center),
            make(1, GripKind::Quadrant, ellipse.center.translate(ellipse.major_axis)),
        ],
        Geometry::Polyline(polyline) => polyline
            .vertices
            .iter()
            .enumerate()
            .map(|(index, vertex)| make(index, GripKind::Vertex, vertex.position))
            .collect(),
        Geometry::Rectangle(rect) => {
            let mut grips: Vec<Grip> = rect
                .corners()
                .iter()
                .enumerate()
                .map(|(index, corner)| make(index, GripKind::Vertex, *corner))
                .collect();
            grips.push(make(4, GripKind::Center, rect.bounds().center()));
            grips
        }
        Geometry::Point(point) => vec![make(0, GripKind::Insert, point.position)],
        Geometry::Text(text) => vec![make(0, GripKind::Insert, text.insert)],
        Geometry::Spline(spline) => {
            let points = if spline.control_points.is_empty() {
                &spline.fit_points
            } else {
                &spline.control_points
            };
            points
                .iter()
                .enumerate()
                .map(|(index, point)| make(index, GripKind::Vertex, *point))
                .collect()
        }
        Geometry::Dimension(dimension) => {
            let mut grips = vec![
                make(0, GripKind::Endpoint, dimension.start),
                make(1, GripKind::Endpoint, dimension.end),
            ];
            if let Some(layout) = dimension.layout() {
                grips.push(make(2, GripKind::Offset, layout.label_position));
            }
            grips
        }
        Geometry::BlockReference(reference) => vec![make(0, GripKind::Insert, reference.insert)],
    }
}

/// 把第 `index` 个夹点移到 `target` 后的新几何。结果会经过合法性校验。
pub fn apply_grip(
    geometry: &Geometry,
    index: usize,
    target: Point2,
) -> Result<Geometry, GeometryError> {
    let moved = match geometry {
        Geometry::Line(line) => match index {
            0 => Geometry::Line(Line {
                start: target,
                end: line.end,
            }),
            1 => Geometry::Line(Line {
                start: line.start,
                end: target,
            }),
            _ => geometry.translated(midpoint(line.start, line.end).vector_to(target)),
        },
        Geometry::Circle(circle) => match index {
            0 => geometry.translated(circle.center.vector_to(target)),
            _ => Geometry::Circle(Circle {
                center: circle.center,
                radius: circle.center.distance_to(target),
            }),
        },
        Geometry::Arc(arc) => {
            let (start, end, mid) = (arc.start_point(), arc.end_point(), arc.mid_point());
            let through = match index {
                0 => return checked(geometry.translated(arc.center.vector_to(target))),
                1 => arc_through_points(target, mid, end)?,
                2 => arc_through_points(start, mid, target)?,
                _ => arc_through_points(start, target, end)?,
            };
            Geometry::Arc(Arc::from(through))
        }
        Geometry::Ellipse(ellipse) => match index {
            0 => geometry.translated(ellipse.center.vector_to(target)),
            _ => Geometry::Ellipse(Ellipse {
                major_axis: ellipse.center.vector_to(target),
                ..ellipse.clone()
            }),
        },
        Geometry::Polyline(polyline) => {
            let mut vertices = polyline.vertices.clone();
            if let Some(vertex) = vertices.get_mut(index) {
                vertex.position = target;
            }
            Geometry::Polyline(Polyline {
                vertices,
                is_closed: polyline.is_closed,
            })
        }
        Geometry::Rectangle(rect) => {
            let corners = rect.corners();
            if index < 4 {
                Geometry::Rectangle(Rectangle {
                    first: corners[(index + 2) % 4],
                    second: target,
                })
            } else {
                geometry.translated(rect.bounds().center().vector_to(target))
            }
        }
        Geometry::Point(point) => geometry.translated(point.position.vector_to(target)),
        Geometry::Text(text) => geometry.translated(text.insert.vector_to(target)),
        Geometry::Spline(spline) => {
            let mut spline = spline.clone();
            let points = if spline.control_points.is_empty() {
                &mut spline.fit_points
            } else {
                &mut spline.control_points
            };
            if let Some(point) = points.get_mut(index) {
                *point = target;
            }
            Geometry::Spline(spline)
        }
        Geometry::Dimension(dimension) => match index {
            0 => Geometry::Dimension(Dimension {
                start: target,
                ..dimension.clone()
            }),
            1 => Geometry::Dimension(Dimension {
                end: target,
                ..dimension.clone()
            }),
            _ => Geometry::Dimension(Dimension {
                offset: signed_offset(dimension, target)?,
                ..dimension.clone()
            }),
        },
        Geometry::BlockReference(reference) => {
            geometry.translated(reference.insert.vector_to(target))
        }
    };
    checked(moved)
}

fn checked(geometry: Geometry) -> Result<Geometry, GeometryError> {
    geometry.validate()?;
    Ok(geometry)
}

/// 点相对测量段的带符号法向距离，左侧为正。
fn signed_offset(dimension: &Dimension, point: Point2) -> Result<f64, GeometryError> {
    let direction = dimension
        .start
        .vector_to(dimension.end)
        .normalize()
        .ok_or(GeometryError::CoincidentPoints)?;
    Ok(direction.cross(Vector2::from_points(dimension.start, point)))
}

#[derive(Debug, Clone, PartialEq)]
struct GripDrag {
    grip: Grip,
    original: Geometry,
    preview: Geometry,
}

/// 夹点交互状态：悬停（warm）与拖动（hot）。
#[derive(Debug, Clone, Default)]
pub struct GripEditor {
    settings: GripSettings,
    hovered: Option<(EntityId, usize)>,
    drag: Option<GripDrag>,
}

impl GripEditor {
    pub fn new(settings: GripSettings) -> Self {
        Self {
            settings,
            hovered: None,
            drag: None,
        }
    }

    #[inline]
    pub fn settings(&self) -> GripSettings {
        self.settings
    }

    /// 选中且可编辑的实体上的所有夹点。
    pub fn grips(&self, scene: &Scene, selection: &SelectionSet) -> Vec<Grip> {
        selection
            .iter()
            .filter_map(|id| scene.entity(id))
            .filter(|entity| is_selectable(scene, entity))
            .flat_map(grips_for)
            .collect()
    }

    pub fn state_of(&self, grip: &Grip) -> GripState {
        if self
            .drag
            .as_ref()
            .is_some_and(|drag| drag.grip.key() == grip.key())
        {
            GripState::Hot
        } else if self.hovered == Some(grip.key()) {
            GripState::Warm
        } else {
            GripState::Cold
        }
    }

    /// 更新悬停夹点，返回状态是否变化。`tolerance` 为世界单位。
    pub fn hover(
        &mut self,
        scene: &Scene,
        selection: &SelectionSet,
        point: Point2,
        tolerance: f64,
    ) -> bool {
        let next = self.grip_at(scene, selection, point, tolerance).map(|g| g.key());
        let changed = next != self.hovered;
        self.hovered = next;
        changed
    }

    pub fn grip_at(
        &self,
        scene: &Scene,
        selection: &SelectionSet,
        point: Point2,
        tolerance: f64,
    ) -> Option<Grip> {
        self.grips(scene, selection)
            .into_iter()
            .map(|grip| (grip.position.distance_to(point), grip))
            .filter(|(distance, _)| *distance <= tolerance)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, grip)| grip)
    }

    #[inline]
    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn begin_drag(&mut self, scene: &Scene, grip: Grip) -> bool {
        let Some(entity) = scene.entity(grip.entity) else {
            return false;
        };
        if !is_selectable(scene, entity) {
            return false;
        }
        self.drag = Some(GripDrag {
            grip,
            original: entity.geometry.clone(),
            preview: entity.geometry.clone(),
        });
        true
    }

    /// 更新拖动预览。几何退化时保留上一帧的预览并返回错误，场景不受影响。
    pub fn drag_to(&mut self, target: Point2) -> Result<Option<&Geometry>, GeometryError> {
        let Some(drag) = self.drag.as_mut() else {
            return Ok(None);
        };
        drag.preview = apply_grip(&drag.original, drag.grip.index, target)?;
        Ok(Some(&drag.preview))
    }

    pub fn preview(&self) -> Option<(EntityId, &Geometry)> {
        self.drag
            .as_ref()
            .map(|drag| (drag.grip.entity, &drag.preview))
    }

    /// 结束拖动。几何有变化时返回待执行的命令（带乐观校验的原几何）。
    pub fn release(&mut self) -> Option<SceneCommand> {
        let drag = self.drag.take()?;
        if drag.preview == drag.original {
            return None;
        }
        Some(ReplaceGeometry::expecting(drag.grip.entity, drag.original, drag.preview).into())
    }

    /// 取消拖动，丢弃预览。
    pub fn cancel(&mut self) -> bool {
        self.drag.take().is_some()
    }

    /// 选择变化后清理悬停与拖动状态。
    pub fn reset(&mut self) {
        self.hovered = None;
        self.drag = None;
    }
}
