use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{
    Bounds2D, GeometryError, Point2, Vector2, canonical_interval, point_on_circle,
};
use crate::spatial::{GridSettings, SpatialIndex};
use crate::tolerance::{DEGENERACY, DUPLICATE_VERTEX};

/// 保留的默认图层，始终存在且不可删除。
pub const DEFAULT_LAYER: &str = "0";

/// 块嵌套展开的最大深度，超过后视为循环引用截断。
pub const MAX_BLOCK_DEPTH: usize = 16;

/// 文字宽度估算时每个字符相对字高的步进比例。
pub const TEXT_ADVANCE_RATIO: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("layer `{0}` does not exist")]
    UnknownLayer(String),
    #[error("layer `{0}` already exists")]
    DuplicateLayer(String),
    #[error("layer `{0}` is still referenced by entities")]
    LayerInUse(String),
    #[error("layer `{0}` is protected")]
    ProtectedLayer(String),
    #[error("entity with id {0} already exists")]
    DuplicateEntity(u64),
    #[error("entity with id {0} not found")]
    EntityNotFound(u64),
    #[error("block with id {0} not found")]
    UnknownBlock(u64),
    #[error("block with id {0} already exists")]
    DuplicateBlock(u64),
    #[error("{0} id space is exhausted")]
    IdExhausted(&'static str),
    #[error("invalid geometry: {0}")]
    Geometry(#[from] GeometryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 提供原始数值，便于序列化或日志输出。
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(u64);

impl BlockId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// 24 位 RGB 颜色，文本形式为 `#RRGGBB`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(u32);

impl Color {
    pub const WHITE: Color = Color(0xFF_FF_FF);
    pub const BLACK: Color = Color(0x00_00_00);

    #[inline]
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    pub fn from_hex(text: &str) -> Option<Self> {
        let digits = text.strip_prefix('#').unwrap_or(text);
        if digits.len() != 6 {
            return None;
        }
        u32::from_str_radix(digits, 16).ok().map(Self)
    }

    pub fn to_hex(self) -> String {
        format!("#{:06X}", self.0)
    }

    #[inline]
    pub fn components(self) -> (u8, u8, u8) {
        ((self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8)
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value).ok_or_else(|| format!("invalid color `{value}`"))
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_hex()
    }
}

/// 实体级样式覆盖，未设置的字段沿用图层。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash: Option<Vec<f64>>,
}

impl StyleOverrides {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.width.is_none() && self.dash.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub color: Color,
    pub is_visible: bool,
    pub is_locked: bool,
}

impl Layer {
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: Color::WHITE,
            is_visible: true,
            is_locked: false,
        }
    }

    #[inline]
    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    #[default]
    Unitless,
    Millimeters,
    Centimeters,
    Meters,
    Inches,
    Feet,
}

impl Units {
    pub fn abbreviation(self) -> &'static str {
        match self {
            Units::Unitless => "",
            Units::Millimeters => "mm",
            Units::Centimeters => "cm",
            Units::Meters => "m",
            Units::Inches => "in",
            Units::Feet => "ft",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub start: Point2,
    pub end: Point2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point2,
    pub radius: f64,
}

/// 圆弧实体，角度以弧度形式储存，遵循数学正方向。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub center: Point2,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
}

impl Arc {
    #[inline]
    pub fn start_point(&self) -> Point2 {
        point_on_circle(self.center, self.radius, self.start_angle)
    }

    #[inline]
    pub fn end_point(&self) -> Point2 {
        point_on_circle(self.center, self.radius, self.end_angle)
    }

    pub fn mid_point(&self) -> Point2 {
        let (start, end) = canonical_interval(self.start_angle, self.end_angle);
        point_on_circle(self.center, self.radius, (start + end) * 0.5)
    }
}

impl From<crate::geometry::CircularArc> for Arc {
    fn from(value: crate::geometry::CircularArc) -> Self {
        Self {
            center: value.center,
            radius: value.radius,
            start_angle: value.start_angle,
            end_angle: value.end_angle,
        }
    }
}

/// 椭圆实体，记录主轴向量与参数范围（单位为弧度）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    pub center: Point2,
    pub major_axis: Vector2,
    pub ratio: f64,
    pub start_parameter: f64,
    pub end_parameter: f64,
}

impl Ellipse {
    /// 参数 `t` 处的点。
    pub fn point_at(&self, t: f64) -> Point2 {
        let major = self.major_axis.as_vec2();
        let minor = major.perp() * self.ratio;
        Point2::from_vec(self.center.as_vec2() + major * t.cos() + minor * t.sin())
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        let (start, end) = canonical_interval(self.start_parameter, self.end_parameter);
        (end - start - std::f64::consts::TAU).abs() < DEGENERACY
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolylineVertex {
    pub position: Point2,
    pub bulge: f64,
}

impl PolylineVertex {
    #[inline]
    pub fn new(position: Point2) -> Self {
        Self {
            position,
            bulge: 0.0,
        }
    }

    #[inline]
    pub fn with_bulge(position: Point2, bulge: f64) -> Self {
        Self { position, bulge }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub vertices: Vec<PolylineVertex>,
    pub is_closed: bool,
}

impl Polyline {
    pub fn from_points<I>(points: I, is_closed: bool) -> Self
    where
        I: IntoIterator<Item = Point2>,
    {
        Self {
            vertices: points.into_iter().map(PolylineVertex::new).collect(),
            is_closed,
        }
    }

    /// 按顺序返回每段的 `(起点, 终点, 凸度)`，闭合时包含收尾段。
    pub fn segments(&self) -> impl Iterator<Item = (Point2, Point2, f64)> + '_ {
        let count = self.vertices.len();
        let segment_count = match (count, self.is_closed) {
            (0 | 1, _) => 0,
            (n, true) => n,
            (n, false) => n - 1,
        };
        (0..segment_count).map(move |i| {
            let current = &self.vertices[i];
            let next = &self.vertices[(i + 1) % count];
            (current.position, next.position, current.bulge)
        })
    }
}

/// 轴对齐矩形，两个对角点任意顺序。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub first: Point2,
    pub second: Point2,
}

impl Rectangle {
    #[inline]
    pub fn bounds(&self) -> Bounds2D {
        Bounds2D::from_corners(self.first, self.second)
    }

    #[inline]
    pub fn corners(&self) -> [Point2; 4] {
        self.bounds().corners()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub position: Point2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub insert: Point2,
    pub content: String,
    pub height: f64,
    pub rotation: f64,
}

impl Text {
    #[inline]
    pub fn estimated_width(&self) -> f64 {
        self.content.chars().count() as f64 * self.height * TEXT_ADVANCE_RATIO
    }

    /// 文字外框四角（考虑旋转），逆时针，从插入点开始。
    pub fn outline(&self) -> [Point2; 4] {
        let along = Vector2::from_angle(self.rotation);
        let up = along.perp();
        let width = self.estimated_width();
        let p0 = self.insert;
        let p1 = p0.translate(along.scale(width));
        let p2 = p1.translate(up.scale(self.height));
        let p3 = p0.translate(up.scale(self.height));
        [p0, p1, p2, p3]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spline {
    pub degree: u32,
    pub control_points: Vec<Point2>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fit_points: Vec<Point2>,
    pub is_closed: bool,
}

/// 对齐标注：尺寸线与测量段平行，沿法向偏移 `offset`（带符号）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub start: Point2,
    pub end: Point2,
    pub offset: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// 标注的派生布局，渲染和命中测试共用。
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionLayout {
    pub extension_lines: [(Point2, Point2); 2],
    pub dimension_line: (Point2, Point2),
    pub label_position: Point2,
    pub label_angle: f64,
    pub measurement: f64,
}

impl Dimension {
    pub fn layout(&self) -> Option<DimensionLayout> {
        let measured = self.start.vector_to(self.end);
        let direction = measured.normalize()?;
        let normal = direction.perp().scale(self.offset);
        let a = self.start.translate(normal);
        let b = self.end.translate(normal);
        Some(DimensionLayout {
            extension_lines: [(self.start, a), (self.end, b)],
            dimension_line: (a, b),
            label_position: a.lerp(b, 0.5),
            label_angle: direction.angle(),
            measurement: measured.length(),
        })
    }

    pub fn label(&self) -> String {
        match &self.text {
            Some(text) => text.clone(),
            None => format!("{:.2}", self.start.distance_to(self.end)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockReference {
    pub block: BlockId,
    pub insert: Point2,
    pub scale: Vector2,
    pub rotation: f64,
}

impl BlockReference {
    #[inline]
    pub fn placement(&self, base_point: Point2) -> BlockPlacement {
        BlockPlacement {
            base: base_point,
            insert: self.insert,
            scale: self.scale,
            rotation: self.rotation,
        }
    }
}

/// 块参照的仿射放置：先相对基点缩放，再旋转，最后平移到插入点。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockPlacement {
    pub base: Point2,
    pub insert: Point2,
    pub scale: Vector2,
    pub rotation: f64,
}

impl BlockPlacement {
    pub const IDENTITY: BlockPlacement = BlockPlacement {
        base: Point2::ORIGIN,
        insert: Point2::ORIGIN,
        scale: Vector2(glam::DVec2::ONE),
        rotation: 0.0,
    };

    pub fn apply(&self, point: Point2) -> Point2 {
        let local = (point.as_vec2() - self.base.as_vec2()) * self.scale.as_vec2();
        let (sin, cos) = self.rotation.sin_cos();
        let rotated = glam::DVec2::new(local.x * cos - local.y * sin, local.x * sin + local.y * cos);
        Point2::from_vec(self.insert.as_vec2() + rotated)
    }

    /// 等比且不镜像时圆保持为圆。
    #[inline]
    pub fn uniform_scale(&self) -> Option<f64> {
        let s = self.scale;
        if (s.x() - s.y()).abs() <= DUPLICATE_VERTEX && s.x() > 0.0 {
            Some(s.x())
        } else {
            None
        }
    }
}

/// 多级块嵌套的放置链，按顺序从最内层应用到最外层。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComposedPlacement(pub Vec<BlockPlacement>);

impl ComposedPlacement {
    pub fn apply(&self, point: Point2) -> Point2 {
        self.0.iter().fold(point, |acc, placement| placement.apply(acc))
    }

    pub fn push_inner(&self, inner: BlockPlacement) -> ComposedPlacement {
        let mut chain = Vec::with_capacity(self.0.len() + 1);
        chain.push(inner);
        chain.extend(self.0.iter().copied());
        ComposedPlacement(chain)
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.0.is_empty()
    }

    /// 整条链的等比缩放与总旋转；任一环节非等比时返回 `None`。
    pub fn similarity(&self) -> Option<(f64, f64)> {
        let mut scale = 1.0;
        let mut rotation = 0.0;
        for placement in &self.0 {
            scale *= placement.uniform_scale()?;
            rotation += placement.rotation;
        }
        Some((scale, rotation))
    }
}

/// 实体几何的封闭集合。新增类型需要在每个按类型分派的地方补齐分支。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Line(Line),
    Circle(Circle),
    Arc(Arc),
    Ellipse(Ellipse),
    Polyline(Polyline),
    Rectangle(Rectangle),
    Point(Point),
    Text(Text),
    Spline(Spline),
    Dimension(Dimension),
    BlockReference(BlockReference),
}

impl Geometry {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Geometry::Line(_) => "line",
            Geometry::Circle(_) => "circle",
            Geometry::Arc(_) => "arc",
            Geometry::Ellipse(_) => "ellipse",
            Geometry::Polyline(_) => "polyline",
            Geometry::Rectangle(_) => "rectangle",
            Geometry::Point(_) => "point",
            Geometry::Text(_) => "text",
            Geometry::Spline(_) => "spline",
            Geometry::Dimension(_) => "dimension",
            Geometry::BlockReference(_) => "block_reference",
        }
    }

    /// 计算自身的 2D 轴对齐范围。块参照只返回插入点，展开后的范围由 `Scene` 负责。
    pub fn bounds(&self) -> Option<Bounds2D> {
        let mut bounds = Bounds2D::empty();
        match self {
            Geometry::Line(line) => {
                bounds.include_point(line.start);
                bounds.include_point(line.end);
            }
            Geometry::Circle(circle) => {
                let radius = circle.radius.abs();
                let center = circle.center;
                bounds.include_point(Point2::new(center.x() - radius, center.y() - radius));
                bounds.include_point(Point2::new(center.x() + radius, center.y() + radius));
            }
            Geometry::Arc(arc) => arc_bounds(arc, &mut bounds),
            Geometry::Ellipse(ellipse) => {
                for point in crate::tessellate::sample_ellipse(ellipse, 64) {
                    bounds.include_point(point);
                }
            }
            Geometry::Polyline(polyline) => {
                for vertex in &polyline.vertices {
                    bounds.include_point(vertex.position);
                }
                for (start, end, bulge) in polyline.segments() {
                    if let Some(arc) = crate::geometry::bulge_to_arc(start, end, bulge) {
                        let (start_angle, end_angle) = if arc.sweep >= 0.0 {
                            (arc.start_angle, arc.start_angle + arc.sweep)
                        } else {
                            (arc.start_angle + arc.sweep, arc.start_angle)
                        };
                        let arc = Arc {
                            center: arc.center,
                            radius: arc.radius,
                            start_angle,
                            end_angle,
                        };
                        arc_bounds(&arc, &mut bounds);
                    }
                }
            }
            Geometry::Rectangle(rect) => bounds.include_bounds(&rect.bounds()),
            Geometry::Point(point) => bounds.include_point(point.position),
            Geometry::Text(text) => {
                for corner in text.outline() {
                    bounds.include_point(corner);
                }
            }
            Geometry::Spline(spline) => {
                for point in spline.control_points.iter().chain(spline.fit_points.iter()) {
                    bounds.include_point(*point);
                }
            }
            Geometry::Dimension(dimension) => {
                bounds.include_point(dimension.start);
                bounds.include_point(dimension.end);
                if let Some(layout) = dimension.layout() {
                    bounds.include_point(layout.dimension_line.0);
                    bounds.include_point(layout.dimension_line.1);
                }
            }
            Geometry::BlockReference(reference) => bounds.include_point(reference.insert),
        }
        if bounds.is_empty() { None } else { Some(bounds) }
    }

    /// 平移整个几何体，用于移动命令和中点夹点。
    pub fn translated(&self, delta: Vector2) -> Geometry {
        let mv = |p: Point2| p.translate(delta);
        match self {
            Geometry::Line(line) => Geometry::Line(Line {
                start: mv(line.start),
                end: mv(line.end),
            }),
            Geometry::Circle(circle) => Geometry::Circle(Circle {
                center: mv(circle.center),
                ..circle.clone()
            }),
            Geometry::Arc(arc) => Geometry::Arc(Arc {
                center: mv(arc.center),
                ..arc.clone()
            }),
            Geometry::Ellipse(ellipse) => Geometry::Ellipse(Ellipse {
                center: mv(ellipse.center),
                ..ellipse.clone()
            }),
            Geometry::Polyline(polyline) => Geometry::Polyline(Polyline {
                vertices: polyline
                    .vertices
                    .iter()
                    .map(|v| PolylineVertex::with_bulge(mv(v.position), v.bulge))
                    .collect(),
                is_closed: polyline.is_closed,
            }),
            Geometry::Rectangle(rect) => Geometry::Rectangle(Rectangle {
                first: mv(rect.first),
                second: mv(rect.second),
            }),
            Geometry::Point(point) => Geometry::Point(Point {
                position: mv(point.position),
            }),
            Geometry::Text(text) => Geometry::Text(Text {
                insert: mv(text.insert),
                ..text.clone()
            }),
            Geometry::Spline(spline) => Geometry::Spline(Spline {
                control_points: spline.control_points.iter().copied().map(mv).collect(),
                fit_points: spline.fit_points.iter().copied().map(mv).collect(),
                ..spline.clone()
            }),
            Geometry::Dimension(dimension) => Geometry::Dimension(Dimension {
                start: mv(dimension.start),
                end: mv(dimension.end),
                ..dimension.clone()
            }),
            Geometry::BlockReference(reference) => Geometry::BlockReference(BlockReference {
                insert: mv(reference.insert),
                ..reference.clone()
            }),
        }
    }

    /// 结构合法性检查。提交前必须通过，保证场景中不存在退化实体。
    pub fn validate(&self) -> Result<(), GeometryError> {
        let finite = |points: &[Point2]| {
            if points.iter().all(|p| p.is_finite()) {
                Ok(())
            } else {
                Err(GeometryError::NonFinite)
            }
        };
        let positive = |radius: f64| {
            if radius.is_finite() && radius > DEGENERACY {
                Ok(())
            } else {
                Err(GeometryError::NonPositiveRadius(radius))
            }
        };
        match self {
            Geometry::Line(line) => {
                finite(&[line.start, line.end])?;
                if line.start.distance_to(line.end) <= DUPLICATE_VERTEX {
                    return Err(GeometryError::CoincidentPoints);
                }
            }
            Geometry::Circle(circle) => {
                finite(&[circle.center])?;
                positive(circle.radius)?;
            }
            Geometry::Arc(arc) => {
                finite(&[arc.center])?;
                positive(arc.radius)?;
                if !arc.start_angle.is_finite() || !arc.end_angle.is_finite() {
                    return Err(GeometryError::NonFinite);
                }
            }
            Geometry::Ellipse(ellipse) => {
                finite(&[ellipse.center])?;
                if ellipse.major_axis.length() <= DEGENERACY {
                    return Err(GeometryError::ZeroLengthVector);
                }
                positive(ellipse.ratio)?;
            }
            Geometry::Polyline(polyline) => {
                let points: Vec<Point2> = polyline.vertices.iter().map(|v| v.position).collect();
                finite(&points)?;
                let required = if polyline.is_closed { 3 } else { 2 };
                if points.len() < required {
                    return Err(GeometryError::InsufficientPoints {
                        required,
                        actual: points.len(),
                    });
                }
                if polyline
                    .vertices
                    .iter()
                    .any(|v| !v.bulge.is_finite())
                {
                    return Err(GeometryError::NonFinite);
                }
            }
            Geometry::Rectangle(rect) => {
                finite(&[rect.first, rect.second])?;
                let bounds = rect.bounds();
                if bounds.width() <= DUPLICATE_VERTEX || bounds.height() <= DUPLICATE_VERTEX {
                    return Err(GeometryError::ZeroArea);
                }
            }
            Geometry::Point(point) => finite(&[point.position])?,
            Geometry::Text(text) => {
                finite(&[text.insert])?;
                positive(text.height)?;
            }
            Geometry::Spline(spline) => {
                finite(&spline.control_points)?;
                finite(&spline.fit_points)?;
                let required = (spline.degree as usize + 1).max(2);
                if spline.control_points.len() < required && spline.fit_points.len() < 2 {
                    return Err(GeometryError::InsufficientPoints {
                        required,
                        actual: spline.control_points.len(),
                    });
                }
            }
            Geometry::Dimension(dimension) => {
                finite(&[dimension.start, dimension.end])?;
                if dimension.start.distance_to(dimension.end) <= DUPLICATE_VERTEX {
                    return Err(GeometryError::CoincidentPoints);
                }
            }
            Geometry::BlockReference(reference) => {
                finite(&[reference.insert])?;
                if reference.scale.x().abs() <= DEGENERACY || reference.scale.y().abs() <= DEGENERACY
                {
                    return Err(GeometryError::ZeroLengthVector);
                }
            }
        }
        Ok(())
    }
}

/// 尚未分配 ID 的实体描述，用于新建命令与块定义内容。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDraft {
    pub layer: String,
    #[serde(default, skip_serializing_if = "StyleOverrides::is_empty")]
    pub style: StyleOverrides,
    pub geometry: Geometry,
}

impl EntityDraft {
    pub fn new(layer: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            layer: layer.into(),
            style: StyleOverrides::default(),
            geometry,
        }
    }

    #[inline]
    pub fn with_style(mut self, style: StyleOverrides) -> Self {
        self.style = style;
        self
    }

    #[inline]
    pub fn into_entity(self, id: EntityId) -> Entity {
        Entity {
            id,
            layer: self.layer,
            style: self.style,
            geometry: self.geometry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub layer: String,
    #[serde(default, skip_serializing_if = "StyleOverrides::is_empty")]
    pub style: StyleOverrides,
    pub geometry: Geometry,
}

impl Entity {
    #[inline]
    pub fn layer_name(&self) -> &str {
        &self.layer
    }

    #[inline]
    pub fn to_draft(&self) -> EntityDraft {
        EntityDraft {
            layer: self.layer.clone(),
            style: self.style.clone(),
            geometry: self.geometry.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDefinition {
    pub id: BlockId,
    pub name: String,
    pub base_point: Point2,
    pub entities: Vec<EntityDraft>,
}

/// 编辑器的工作单元：有序实体、图层表、块表与派生的空间索引。
///
/// 实体按插入顺序保存（即绘制顺序），同时维护 ID → 下标映射以保证 O(1) 查找。
/// 空间索引是可重建的缓存，不参与序列化与相等比较。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SceneData", into = "SceneData")]
pub struct Scene {
    layers: BTreeMap<String, Layer>,
    entities: Vec<Entity>,
    positions: HashMap<EntityId, usize>,
    blocks: BTreeMap<BlockId, BlockDefinition>,
    units: Units,
    next_entity_id: u64,
    next_block_id: u64,
    spatial: SpatialIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SceneData {
    #[serde(default)]
    units: Units,
    layers: Vec<Layer>,
    entities: Vec<Entity>,
    #[serde(default)]
    blocks: Vec<BlockDefinition>,
    #[serde(default)]
    next_entity_id: u64,
    #[serde(default)]
    next_block_id: u64,
}

impl From<Scene> for SceneData {
    fn from(scene: Scene) -> Self {
        Self {
            units: scene.units,
            layers: scene.layers.into_values().collect(),
            entities: scene.entities,
            blocks: scene.blocks.into_values().collect(),
            next_entity_id: scene.next_entity_id,
            next_block_id: scene.next_block_id,
        }
    }
}

/// 反序列化时重新建立场景不变量：ID 唯一、几何非退化、块参照可解析。
impl TryFrom<SceneData> for Scene {
    type Error = SceneError;

    fn try_from(data: SceneData) -> Result<Self, Self::Error> {
        let mut scene = Scene::new();
        scene.units = data.units;
        for layer in data.layers {
            if layer.name != DEFAULT_LAYER && scene.layers.contains_key(&layer.name) {
                return Err(SceneError::DuplicateLayer(layer.name));
            }
            scene.layers.insert(layer.name.clone(), layer);
        }
        for block in data.blocks {
            if scene.blocks.contains_key(&block.id) {
                return Err(SceneError::DuplicateBlock(block.id.get()));
            }
            for draft in &block.entities {
                draft.geometry.validate()?;
                scene.ensure_layer(&draft.layer);
            }
            scene.next_block_id = scene.next_block_id.max(successor(block.id.get(), "block")?);
            scene.blocks.insert(block.id, block);
        }
        for block in scene.blocks.values() {
            for draft in &block.entities {
                scene.check_block_reference(&draft.geometry)?;
            }
        }
        scene.next_block_id = scene.next_block_id.max(data.next_block_id);
        for entity in data.entities {
            if scene.positions.contains_key(&entity.id) {
                return Err(SceneError::DuplicateEntity(entity.id.get()));
            }
            entity.geometry.validate()?;
            scene.check_block_reference(&entity.geometry)?;
            scene.ensure_layer(&entity.layer);
            scene.next_entity_id = scene
                .next_entity_id
                .max(successor(entity.id.get(), "entity")?);
            scene.positions.insert(entity.id, scene.entities.len());
            scene.entities.push(entity);
        }
        scene.next_entity_id = scene.next_entity_id.max(data.next_entity_id);
        scene.rebuild_spatial_index();
        Ok(scene)
    }
}

fn successor(raw: u64, kind: &'static str) -> Result<u64, SceneError> {
    raw.checked_add(1).ok_or(SceneError::IdExhausted(kind))
}

impl PartialEq for Scene {
    fn eq(&self, other: &Self) -> bool {
        self.units == other.units
            && self.layers == other.layers
            && self.entities == other.entities
            && self.blocks == other.blocks
            && self.next_entity_id == other.next_entity_id
            && self.next_block_id == other.next_block_id
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::with_index_settings(GridSettings::default())
    }

    pub fn with_index_settings(settings: GridSettings) -> Self {
        let mut layers = BTreeMap::new();
        layers.insert(DEFAULT_LAYER.to_string(), Layer::new(DEFAULT_LAYER));
        Self {
            layers,
            entities: Vec::new(),
            positions: HashMap::new(),
            blocks: BTreeMap::new(),
            units: Units::default(),
            next_entity_id: 1,
            next_block_id: 1,
            spatial: SpatialIndex::new(settings),
        }
    }

    /// 替换空间索引参数并立即重建。
    pub fn set_index_settings(&mut self, settings: GridSettings) {
        self.spatial = SpatialIndex::new(settings);
        self.rebuild_spatial_index();
    }

    #[inline]
    pub fn units(&self) -> Units {
        self.units
    }

    #[inline]
    pub fn set_units(&mut self, units: Units) {
        self.units = units;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    // ---- 图层 ----

    #[inline]
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.values()
    }

    #[inline]
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    /// 解析实体的图层键；空键映射到默认图层。未知键返回错误而不是静默回退。
    pub fn resolve_layer(&self, key: &str) -> Result<&Layer, SceneError> {
        let key = if key.is_empty() { DEFAULT_LAYER } else { key };
        self.layers
            .get(key)
            .ok_or_else(|| SceneError::UnknownLayer(key.to_string()))
    }

    /// 导入路径使用：按需隐式创建图层。
    pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
        let key = name.as_ref();
        self.layers
            .entry(key.to_string())
            .or_insert_with(|| Layer::new(key));
    }

    pub fn add_layer(&mut self, layer: Layer) -> Result<(), SceneError> {
        if self.layers.contains_key(&layer.name) {
            return Err(SceneError::DuplicateLayer(layer.name));
        }
        self.layers.insert(layer.name.clone(), layer);
        Ok(())
    }

    /// 用新的属性替换同名图层，返回旧值。
    pub fn replace_layer(&mut self, layer: Layer) -> Result<Layer, SceneError> {
        match self.layers.get_mut(&layer.name) {
            Some(slot) => Ok(std::mem::replace(slot, layer)),
            None => Err(SceneError::UnknownLayer(layer.name)),
        }
    }

    pub fn layer_in_use(&self, name: &str) -> bool {
        self.entities.iter().any(|entity| entity.layer == name)
            || self
                .blocks
                .values()
                .any(|block| block.entities.iter().any(|draft| draft.layer == name))
    }

    pub fn remove_layer(&mut self, name: &str) -> Result<Layer, SceneError> {
        if name == DEFAULT_LAYER {
            return Err(SceneError::ProtectedLayer(name.to_string()));
        }
        if !self.layers.contains_key(name) {
            return Err(SceneError::UnknownLayer(name.to_string()));
        }
        if self.layer_in_use(name) {
            return Err(SceneError::LayerInUse(name.to_string()));
        }
        self.layers
            .remove(name)
            .ok_or_else(|| SceneError::UnknownLayer(name.to_string()))
    }

    // ---- 实体 ----

    #[inline]
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    #[inline]
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().map(|entity| entity.id)
    }

    #[inline]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.positions.get(&id).map(|&index| &self.entities[index])
    }

    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.positions.contains_key(&id)
    }

    /// 实体在绘制顺序中的位置。
    #[inline]
    pub fn position_of(&self, id: EntityId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    #[inline]
    pub fn next_entity_id(&self) -> u64 {
        self.next_entity_id
    }

    /// 分配下一个实体 ID。ID 单调递增，删除后不会复用。
    #[inline]
    pub fn reserve_entity_id(&mut self) -> Result<EntityId, SceneError> {
        let id = self.next_entity_id;
        self.next_entity_id = successor(id, "entity")?;
        Ok(EntityId(id))
    }

    /// 撤销新增实体时回退 ID 计数器。
    #[inline]
    pub fn restore_entity_counter(&mut self, value: u64) {
        self.next_entity_id = value;
    }

    /// 追加实体并分配 ID。
    pub fn add_entity(&mut self, draft: EntityDraft) -> Result<EntityId, SceneError> {
        self.resolve_layer(&draft.layer)?;
        self.check_block_reference(&draft.geometry)?;
        let id = self.reserve_entity_id()?;
        self.push_entity(draft.into_entity(id), None);
        Ok(id)
    }

    /// 以既定 ID 插入实体，`position` 为空时追加到末尾。用于撤销删除和日志回放。
    pub fn insert_entity(
        &mut self,
        entity: Entity,
        position: Option<usize>,
    ) -> Result<(), SceneError> {
        if self.positions.contains_key(&entity.id) {
            return Err(SceneError::DuplicateEntity(entity.id.get()));
        }
        self.resolve_layer(&entity.layer)?;
        self.check_block_reference(&entity.geometry)?;
        self.next_entity_id = self
            .next_entity_id
            .max(successor(entity.id.get(), "entity")?);
        self.push_entity(entity, position);
        Ok(())
    }

    fn push_entity(&mut self, entity: Entity, position: Option<usize>) {
        let id = entity.id;
        let bounds = self.geometry_bounds(&entity.geometry);
        let index = position
            .unwrap_or(self.entities.len())
            .min(self.entities.len());
        self.entities.insert(index, entity);
        if index + 1 == self.entities.len() {
            self.positions.insert(id, index);
        } else {
            self.reindex_from(index);
        }
        if let Some(bounds) = bounds {
            self.spatial.insert(id, bounds);
        }
    }

    /// 移除实体，返回其原位置与内容，便于撤销时原样放回。
    pub fn remove_entity(&mut self, id: EntityId) -> Result<(usize, Entity), SceneError> {
        let index = self
            .positions
            .remove(&id)
            .ok_or(SceneError::EntityNotFound(id.get()))?;
        let entity = self.entities.remove(index);
        self.reindex_from(index);
        self.spatial.remove(id);
        Ok((index, entity))
    }

    fn reindex_from(&mut self, start: usize) {
        for (offset, entity) in self.entities[start..].iter().enumerate() {
            self.positions.insert(entity.id, start + offset);
        }
    }

    fn entity_mut(&mut self, id: EntityId) -> Result<&mut Entity, SceneError> {
        let index = *self
            .positions
            .get(&id)
            .ok_or(SceneError::EntityNotFound(id.get()))?;
        Ok(&mut self.entities[index])
    }

    /// 替换实体几何并同步空间索引，返回旧几何。
    pub fn replace_geometry(
        &mut self,
        id: EntityId,
        geometry: Geometry,
    ) -> Result<Geometry, SceneError> {
        self.check_block_reference(&geometry)?;
        let bounds = self.geometry_bounds(&geometry);
        let entity = self.entity_mut(id)?;
        let previous = std::mem::replace(&mut entity.geometry, geometry);
        match bounds {
            Some(bounds) => self.spatial.update(id, bounds),
            None => self.spatial.remove(id),
        }
        Ok(previous)
    }

    pub fn set_entity_layer(
        &mut self,
        id: EntityId,
        layer: impl Into<String>,
    ) -> Result<String, SceneError> {
        let layer = layer.into();
        self.resolve_layer(&layer)?;
        let entity = self.entity_mut(id)?;
        Ok(std::mem::replace(&mut entity.layer, layer))
    }

    pub fn set_entity_style(
        &mut self,
        id: EntityId,
        style: StyleOverrides,
    ) -> Result<StyleOverrides, SceneError> {
        let entity = self.entity_mut(id)?;
        Ok(std::mem::replace(&mut entity.style, style))
    }

    // ---- 块 ----

    pub fn add_block(
        &mut self,
        name: impl Into<String>,
        base_point: Point2,
        entities: Vec<EntityDraft>,
    ) -> Result<BlockId, SceneError> {
        for draft in &entities {
            self.resolve_layer(&draft.layer)?;
        }
        let id = BlockId(self.next_block_id);
        self.next_block_id = successor(id.get(), "block")?;
        self.blocks.insert(
            id,
            BlockDefinition {
                id,
                name: name.into(),
                base_point,
                entities,
            },
        );
        Ok(id)
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> Option<&BlockDefinition> {
        self.blocks.get(&id)
    }

    #[inline]
    pub fn blocks(&self) -> impl Iterator<Item = &BlockDefinition> {
        self.blocks.values()
    }

    pub fn block_by_name(&self, name: &str) -> Option<&BlockDefinition> {
        self.blocks.values().find(|block| block.name == name)
    }

    fn check_block_reference(&self, geometry: &Geometry) -> Result<(), SceneError> {
        if let Geometry::BlockReference(reference) = geometry {
            if !self.blocks.contains_key(&reference.block) {
                return Err(SceneError::UnknownBlock(reference.block.get()));
            }
        }
        Ok(())
    }

    // ---- 范围与空间查询 ----

    /// 几何体在当前块表下的范围；块参照会递归展开。
    pub fn geometry_bounds(&self, geometry: &Geometry) -> Option<Bounds2D> {
        let mut stack = Vec::new();
        self.geometry_bounds_inner(geometry, &mut stack)
    }

    fn geometry_bounds_inner(
        &self,
        geometry: &Geometry,
        stack: &mut Vec<BlockId>,
    ) -> Option<Bounds2D> {
        let Geometry::BlockReference(reference) = geometry else {
            return geometry.bounds();
        };
        let fallback = geometry.bounds();
        let Some(block) = self.blocks.get(&reference.block) else {
            return fallback;
        };
        if stack.len() >= MAX_BLOCK_DEPTH || stack.contains(&block.id) {
            return fallback;
        }
        stack.push(block.id);
        let placement = reference.placement(block.base_point);
        let mut bounds = Bounds2D::empty();
        for draft in &block.entities {
            if let Some(child) = self.geometry_bounds_inner(&draft.geometry, stack) {
                for corner in child.corners() {
                    bounds.include_point(placement.apply(corner));
                }
            }
        }
        stack.pop();
        if bounds.is_empty() { fallback } else { Some(bounds) }
    }

    #[inline]
    pub fn entity_bounds(&self, id: EntityId) -> Option<Bounds2D> {
        self.spatial.bounds_of(id)
    }

    pub fn bounds(&self) -> Option<Bounds2D> {
        let mut bounds = Bounds2D::empty();
        for entity in &self.entities {
            if let Some(entity_bounds) = self.spatial.bounds_of(entity.id) {
                bounds.include_bounds(&entity_bounds);
            }
        }
        if bounds.is_empty() { None } else { Some(bounds) }
    }

    #[inline]
    pub fn spatial_index(&self) -> &SpatialIndex {
        &self.spatial
    }

    /// 与矩形范围相交的候选实体（超集，需精确测试）。
    #[inline]
    pub fn query_rect(&self, rect: &Bounds2D) -> Vec<EntityId> {
        self.spatial.query_rect(rect)
    }

    #[inline]
    pub fn query_point(&self, point: Point2, radius: f64) -> Vec<EntityId> {
        self.spatial.query_point(point, radius)
    }

    pub fn rebuild_spatial_index(&mut self) {
        let entries: Vec<(EntityId, Bounds2D)> = self
            .entities
            .iter()
            .filter_map(|entity| {
                self.geometry_bounds(&entity.geometry)
                    .map(|bounds| (entity.id, bounds))
            })
            .collect();
        self.spatial.rebuild(entries);
    }

    /// 不可变快照，供持久化与导出使用。
    #[inline]
    pub fn snapshot(&self) -> Scene {
        self.clone()
    }
}

/// 楼层（或图纸页），每个持有一个独立场景。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub name: String,
    pub scene: Scene,
}

impl Level {
    pub fn new(name: impl Into<String>, scene: Scene) -> Self {
        Self {
            name: name.into(),
            scene,
        }
    }
}

/// 有序的楼层集合，始终至少包含一层，核心逻辑只作用于当前层。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSet {
    levels: Vec<Level>,
    current: usize,
}

impl LevelSet {
    pub fn new(first: Level) -> Self {
        Self {
            levels: vec![first],
            current: 0,
        }
    }

    pub fn add_level(&mut self, level: Level) -> usize {
        self.levels.push(level);
        self.levels.len() - 1
    }

    pub fn switch_to(&mut self, index: usize) -> bool {
        if index < self.levels.len() {
            self.current = index;
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn current(&self) -> &Level {
        &self.levels[self.current]
    }

    #[inline]
    pub fn current_scene(&self) -> &Scene {
        &self.levels[self.current].scene
    }

    #[inline]
    pub fn current_scene_mut(&mut self) -> &mut Scene {
        &mut self.levels[self.current].scene
    }

    /// 整体替换当前层场景（导入完成时）。
    pub fn replace_current_scene(&mut self, scene: Scene) -> Scene {
        std::mem::replace(&mut self.levels[self.current].scene, scene)
    }

    #[inline]
    pub fn levels(&self) -> impl Iterator<Item = &Level> {
        self.levels.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

fn arc_bounds(arc: &Arc, bounds: &mut Bounds2D) {
    use std::f64::consts::{FRAC_PI_2, PI, TAU};

    let radius = arc.radius.abs();
    if radius <= f64::EPSILON {
        bounds.include_point(arc.center);
        return;
    }

    let (start, end) = canonical_interval(arc.start_angle, arc.end_angle);
    bounds.include_point(point_on_circle(arc.center, radius, start));
    bounds.include_point(point_on_circle(arc.center, radius, end));

    const QUADRANTS: [f64; 4] = [0.0, FRAC_PI_2, PI, FRAC_PI_2 * 3.0];
    for base in QUADRANTS {
        let mut candidate = base;
        while candidate < start {
            candidate += TAU;
        }
        if candidate <= end {
            bounds.include_point(point_on_circle(arc.center, radius, candidate));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry {
        Geometry::Line(Line {
            start: Point2::new(x0, y0),
            end: Point2::new(x1, y1),
        })
    }

    #[test]
    fn scene_preserves_insertion_order_and_lookup() {
        let mut scene = Scene::new();
        scene.add_layer(Layer::new("GEOM")).unwrap();
        let a = scene.add_entity(EntityDraft::new("0", line(0.0, 0.0, 10.0, 0.0))).unwrap();
        let b = scene
            .add_entity(EntityDraft::new(
                "GEOM",
                Geometry::Circle(Circle {
                    center: Point2::new(5.0, 5.0),
                    radius: 2.0,
                }),
            ))
            .unwrap();
        let c = scene.add_entity(EntityDraft::new("0", line(1.0, 1.0, 2.0, 2.0))).unwrap();

        let order: Vec<_> = scene.entity_ids().collect();
        assert_eq!(order, vec![a, b, c]);
        assert_eq!(scene.position_of(b), Some(1));

        let (index, removed) = scene.remove_entity(b).unwrap();
        assert_eq!(index, 1);
        assert_eq!(removed.layer, "GEOM");
        assert_eq!(scene.position_of(c), Some(1));
        assert!(scene.entity(b).is_none());

        scene.insert_entity(removed, Some(index)).unwrap();
        let order: Vec<_> = scene.entity_ids().collect();
        assert_eq!(order, vec![a, b, c]);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut scene = Scene::new();
        let first = scene.add_entity(EntityDraft::new("0", line(0.0, 0.0, 1.0, 0.0))).unwrap();
        scene.remove_entity(first).unwrap();
        let second = scene.add_entity(EntityDraft::new("0", line(0.0, 0.0, 1.0, 0.0))).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn unknown_layer_is_rejected() {
        let mut scene = Scene::new();
        let err = scene
            .add_entity(EntityDraft::new("MISSING", line(0.0, 0.0, 1.0, 0.0)))
            .unwrap_err();
        assert_eq!(err, SceneError::UnknownLayer("MISSING".to_string()));
        assert!(scene.is_empty());
        assert_eq!(scene.resolve_layer("").unwrap().name, DEFAULT_LAYER);
    }

    #[test]
    fn default_layer_is_protected_and_used_layers_stay() {
        let mut scene = Scene::new();
        assert_eq!(
            scene.remove_layer(DEFAULT_LAYER),
            Err(SceneError::ProtectedLayer(DEFAULT_LAYER.to_string()))
        );
        scene.add_layer(Layer::new("A")).unwrap();
        scene.add_entity(EntityDraft::new("A", line(0.0, 0.0, 1.0, 0.0))).unwrap();
        assert_eq!(
            scene.remove_layer("A"),
            Err(SceneError::LayerInUse("A".to_string()))
        );
        scene.add_layer(Layer::new("B")).unwrap();
        assert!(scene.remove_layer("B").is_ok());
    }

    #[test]
    fn serialized_form_round_trips_and_rebuilds_index() {
        let mut scene = Scene::new();
        scene.add_layer(Layer::new("ANNOT").with_color(Color::rgb(255, 0, 0))).unwrap();
        scene.add_entity(EntityDraft::new("ANNOT", line(0.0, 0.0, 10.0, 10.0))).unwrap();
        scene
            .add_entity(EntityDraft::new(
                "0",
                Geometry::Arc(Arc {
                    center: Point2::new(0.0, 0.0),
                    radius: 3.0,
                    start_angle: 0.0,
                    end_angle: FRAC_PI_2,
                }),
            ))
            .unwrap();

        let json = serde_json::to_string(&scene).unwrap();
        assert!(json.contains("#FF0000"));
        let restored: Scene = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, scene);
        assert_eq!(serde_json::to_string(&restored).unwrap(), json);
        assert_eq!(
            restored.query_point(Point2::new(5.0, 5.0), 0.5).len(),
            1
        );
    }

    #[test]
    fn block_reference_bounds_follow_placement() {
        let mut scene = Scene::new();
        let block = scene
            .add_block(
                "BOX",
                Point2::new(0.0, 0.0),
                vec![EntityDraft::new(
                    "0",
                    Geometry::Rectangle(Rectangle {
                        first: Point2::new(0.0, 0.0),
                        second: Point2::new(2.0, 1.0),
                    }),
                )],
            )
            .unwrap();
        let id = scene
            .add_entity(EntityDraft::new(
                "0",
                Geometry::BlockReference(BlockReference {
                    block,
                    insert: Point2::new(10.0, 10.0),
                    scale: Vector2::new(2.0, 2.0),
                    rotation: 0.0,
                }),
            ))
            .unwrap();
        let bounds = scene.entity_bounds(id).unwrap();
        assert_eq!(bounds.min(), Point2::new(10.0, 10.0));
        assert_eq!(bounds.max(), Point2::new(14.0, 12.0));

        let missing = scene.add_entity(EntityDraft::new(
            "0",
            Geometry::BlockReference(BlockReference {
                block: BlockId::new(99),
                insert: Point2::ORIGIN,
                scale: Vector2::new(1.0, 1.0),
                rotation: 0.0,
            }),
        ));
        assert_eq!(missing, Err(SceneError::UnknownBlock(99)));
    }

    #[test]
    fn validation_rejects_degenerate_geometry() {
        assert_eq!(
            line(1.0, 1.0, 1.0, 1.0).validate(),
            Err(GeometryError::CoincidentPoints)
        );
        let circle = Geometry::Circle(Circle {
            center: Point2::ORIGIN,
            radius: 0.0,
        });
        assert!(matches!(circle.validate(), Err(GeometryError::NonPositiveRadius(_))));
        let open = Geometry::Polyline(Polyline::from_points([Point2::ORIGIN], false));
        assert!(matches!(
            open.validate(),
            Err(GeometryError::InsufficientPoints { required: 2, actual: 1 })
        ));
        let nan = line(f64::NAN, 0.0, 1.0, 0.0);
        assert_eq!(nan.validate(), Err(GeometryError::NonFinite));
    }

    #[test]
    fn extreme_coordinates_and_exhausted_ids_do_not_panic() {
        let mut scene = Scene::new();
        let wide = scene
            .add_entity(EntityDraft::new("0", line(-1.0e21, 0.0, 1.0e21, 0.0)))
            .unwrap();
        assert_eq!(scene.query_point(Point2::ORIGIN, 1.0), vec![wide]);

        scene.restore_entity_counter(u64::MAX);
        let exhausted = scene.add_entity(EntityDraft::new("0", line(0.0, 0.0, 1.0, 1.0)));
        assert_eq!(exhausted, Err(SceneError::IdExhausted("entity")));
        assert_eq!(scene.len(), 1);

        let replayed = Entity {
            id: EntityId::new(u64::MAX),
            layer: DEFAULT_LAYER.to_string(),
            style: StyleOverrides::default(),
            geometry: line(0.0, 0.0, 1.0, 1.0),
        };
        assert_eq!(
            scene.insert_entity(replayed, None),
            Err(SceneError::IdExhausted("entity"))
        );
        assert!(!scene.contains(EntityId::new(u64::MAX)));
    }

    #[test]
    fn dimension_layout_offsets_along_normal() {
        let dim = Dimension {
            start: Point2::new(0.0, 0.0),
            end: Point2::new(10.0, 0.0),
            offset: 5.0,
            text: None,
        };
        let layout = dim.layout().unwrap();
        assert_eq!(layout.dimension_line.0, Point2::new(0.0, 5.0));
        assert!((layout.measurement - 10.0).abs() < 1e-12);
        assert_eq!(dim.label(), "10.00");
    }

    #[test]
    fn level_set_switches_current_scene() {
        let mut levels = LevelSet::new(Level::new("Ground", Scene::new()));
        let upper = levels.add_level(Level::new("Upper", Scene::new()));
        levels
            .current_scene_mut()
            .add_entity(EntityDraft::new("0", line(0.0, 0.0, 1.0, 1.0)))
            .unwrap();
        assert!(levels.switch_to(upper));
        assert!(levels.current_scene().is_empty());
        assert!(!levels.switch_to(5));
        assert_eq!(levels.current().name, "Upper");
    }

    #[test]
    fn color_hex_round_trip() {
        let color = Color::from_hex("#00ff7f").unwrap();
        assert_eq!(color.components(), (0, 255, 127));
        assert_eq!(color.to_hex(), "#00FF7F");
        assert!(Color::from_hex("#12345").is_none());
    }
}
