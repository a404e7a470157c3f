//! 渲染管线：背景、实体、叠加层三个有序的纯函数通道，输出屏幕坐标的绘制列表。
//!
//! 通道只读取场景、变换与叠加状态，不修改任何东西；后一个通道的结果不会被前一个通道使用。
//! 绘制列表与具体后端无关，由宿主自行光栅化。

use std::collections::HashSet;
use std::time::{Duration, Instant};

use dxv_config::AppConfig;
use dxv_core::document::{
    Arc, Circle, Color, Dimension, Ellipse, EntityId, Geometry, Line, Polyline, Rectangle, Scene,
    Spline, Text,
};
use dxv_core::geometry::{Bounds2D, Point2, Vector2};
use dxv_core::tessellate::{Primitive, primitives, sample_ellipse, sample_spline, scene_primitives};
use dxv_core::tolerance::DEGENERACY;
use tracing::debug;

use crate::errors::TransformError;
use crate::grips::{Grip, GripState};
use crate::selection::SelectionMode;
use crate::snap::{SnapCandidate, SnapKind};
use crate::transform::ViewTransform;

const ELLIPSE_SEGMENTS: usize = 64;
const SPLINE_SEGMENTS_PER_SPAN: usize = 16;
const SNAP_MARKER_PX: f64 = 12.0;
const ORIGIN_AXIS_PX: f64 = 24.0;
/// 小于该像素高度的文字只画外框。
const MIN_TEXT_PX: f64 = 3.0;
const MAX_GRID_DOUBLINGS: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub color: Color,
    /// 像素线宽。
    pub width: f64,
    /// 像素虚线模式，`None` 为实线。
    pub dash: Option<Vec<f64>>,
}

impl Stroke {
    pub fn solid(color: Color, width: f64) -> Self {
        Self {
            color,
            width,
            dash: None,
        }
    }

    pub fn dashed(color: Color, width: f64, pattern: Vec<f64>) -> Self {
        Self {
            color,
            width,
            dash: Some(pattern),
        }
    }

    #[inline]
    pub fn is_dashed(&self) -> bool {
        self.dash.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerShape {
    Square,
    Triangle,
    Circle,
    Cross,
    Diamond,
    RightAngle,
    Tangent,
    Parallel,
    Plus,
    Dot,
    Tick,
}

impl MarkerShape {
    /// 每种捕捉类型对应的标记外形。
    pub fn for_snap(kind: SnapKind) -> Self {
        match kind {
            SnapKind::Endpoint => MarkerShape::Square,
            SnapKind::Midpoint => MarkerShape::Triangle,
            SnapKind::Center => MarkerShape::Circle,
            SnapKind::Intersection => MarkerShape::Cross,
            SnapKind::Perpendicular => MarkerShape::RightAngle,
            SnapKind::Tangent => MarkerShape::Tangent,
            SnapKind::Parallel => MarkerShape::Parallel,
            SnapKind::Extension => MarkerShape::Plus,
            SnapKind::Grid => MarkerShape::Diamond,
        }
    }
}

/// 屏幕坐标（像素，y 向下）的绘制原语。
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Polyline {
        points: Vec<Point2>,
        closed: bool,
        stroke: Stroke,
    },
    Circle {
        center: Point2,
        radius: f64,
        stroke: Stroke,
    },
    Text {
        position: Point2,
        content: String,
        /// 像素字高。
        size: f64,
        /// 屏幕角度（顺时针为正）。
        angle: f64,
        color: Color,
    },
    Marker {
        position: Point2,
        shape: MarkerShape,
        size: f64,
        color: Color,
    },
    Rect {
        min: Point2,
        max: Point2,
        stroke: Option<Stroke>,
        fill: Option<Color>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    pub background: Color,
    pub grid_minor: Color,
    pub grid_major: Color,
    pub ruler: Color,
    pub ruler_text: Color,
    pub axis_x: Color,
    pub axis_y: Color,
    pub selection: Color,
    pub grip_cold: Color,
    pub grip_warm: Color,
    pub grip_hot: Color,
    pub grip_border: Color,
    pub snap: Color,
    pub preview: Color,
    pub selection_window: Color,
    pub selection_crossing: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            background: Color::rgb(33, 40, 48),
            grid_minor: Color::rgb(45, 54, 64),
            grid_major: Color::rgb(62, 74, 88),
            ruler: Color::rgb(24, 28, 34),
            ruler_text: Color::rgb(170, 178, 189),
            axis_x: Color::rgb(220, 80, 80),
            axis_y: Color::rgb(80, 200, 110),
            selection: Color::rgb(80, 160, 255),
            grip_cold: Color::rgb(40, 110, 240),
            grip_warm: Color::rgb(255, 140, 190),
            grip_hot: Color::rgb(240, 50, 50),
            grip_border: Color::WHITE,
            snap: Color::rgb(255, 210, 0),
            preview: Color::rgb(150, 220, 255),
            selection_window: Color::rgb(90, 140, 255),
            selection_crossing: Color::rgb(90, 220, 120),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    /// 网格基准间距（世界单位）。
    pub grid_spacing: f64,
    /// 网格线最小像素间距，过密时间距倍增。
    pub min_grid_px: f64,
    pub major_every: i64,
    pub max_grid_lines: usize,
    pub ruler_size: f64,
    /// 标注文字处尺寸线断开的总宽度（世界单位）。
    pub dimension_label_gap: f64,
    pub dimension_text_px: f64,
    /// 曲线离散化的弦高容差（像素）。
    pub chord_tolerance_px: f64,
    pub frame_budget: Duration,
    pub palette: Palette,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl RenderSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let fps = if config.scheduler.target_fps > 0.0 {
            config.scheduler.target_fps
        } else {
            60.0
        };
        Self {
            grid_spacing: config.snapping.grid_spacing,
            min_grid_px: 8.0,
            major_every: 5,
            max_grid_lines: 512,
            ruler_size: config.viewport.ruler_size,
            dimension_label_gap: config.drawing.dimension_label_gap,
            dimension_text_px: 12.0,
            chord_tolerance_px: 0.25,
            frame_budget: Duration::from_secs_f64(1.0 / fps),
            palette: Palette::default(),
        }
    }
}

/// 叠加层输入，由会话按当前交互状态组装。坐标均为世界坐标。
#[derive(Debug, Clone, Default)]
pub struct OverlayState {
    pub selection: Vec<EntityId>,
    pub grips: Vec<GripMarker>,
    pub snap: Option<SnapCandidate>,
    pub previews: Vec<Geometry>,
    pub selection_rect: Option<SelectionRect>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GripMarker {
    pub grip: Grip,
    pub state: GripState,
    /// 像素边长。
    pub size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRect {
    pub start: Point2,
    pub end: Point2,
    pub mode: SelectionMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameStats {
    pub background: usize,
    pub entities: usize,
    pub overlays: usize,
    /// 被视口裁剪掉的实体数。
    pub culled: usize,
    pub elapsed: Duration,
    pub over_budget: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub background: Vec<DrawCommand>,
    pub entities: Vec<DrawCommand>,
    pub overlays: Vec<DrawCommand>,
    pub stats: FrameStats,
}

impl Frame {
    /// 按通道顺序遍历全部绘制命令。
    pub fn commands(&self) -> impl Iterator<Item = &DrawCommand> {
        self.background
            .iter()
            .chain(self.entities.iter())
            .chain(self.overlays.iter())
    }

    pub fn len(&self) -> usize {
        self.background.len() + self.entities.len() + self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderPipeline {
    settings: RenderSettings,
}

impl RenderPipeline {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    #[inline]
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: RenderSettings) {
        self.settings = settings;
    }

    /// 依次执行三个通道。视口未就绪时返回 `ViewportNotReady`，不产生任何绘制。
    pub fn render(
        &self,
        scene: &Scene,
        transform: &ViewTransform,
        overlay: &OverlayState,
    ) -> Result<Frame, TransformError> {
        let started = Instant::now();
        let background = background_pass(transform, &self.settings)?;
        let (entities, culled) = entity_pass(scene, transform, &self.settings)?;
        let overlays = overlay_pass(scene, transform, &self.settings, overlay)?;
        let elapsed = started.elapsed();
        let over_budget = elapsed > self.settings.frame_budget;
        if over_budget {
            debug!(
                elapsed_us = elapsed.as_micros() as u64,
                entities = entities.len(),
                "渲染超出帧预算"
            );
        }
        Ok(Frame {
            stats: FrameStats {
                background: background.len(),
                entities: entities.len(),
                overlays: overlays.len(),
                culled,
                elapsed,
                over_budget,
            },
            background,
            entities,
            overlays,
        })
    }
}

/// 世界坐标到屏幕坐标的绘制助手。
struct Painter<'a> {
    transform: &'a ViewTransform,
    chord_tolerance: f64,
}

impl<'a> Painter<'a> {
    fn new(transform: &'a ViewTransform, settings: &RenderSettings) -> Self {
        Self {
            transform,
            chord_tolerance: transform.pixels_to_world(settings.chord_tolerance_px),
        }
    }

    #[inline]
    fn point(&self, world: Point2) -> Result<Point2, TransformError> {
        self.transform.world_to_screen(world)
    }

    #[inline]
    fn length(&self, world: f64) -> f64 {
        self.transform.world_to_pixels(world)
    }

    fn polyline(
        &self,
        points: &[Point2],
        closed: bool,
        stroke: &Stroke,
    ) -> Result<DrawCommand, TransformError> {
        let points = points
            .iter()
            .map(|p| self.point(*p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DrawCommand::Polyline {
            points,
            closed,
            stroke: stroke.clone(),
        })
    }

    fn primitive(&self, primitive: &Primitive, stroke: &Stroke) -> Result<DrawCommand, TransformError> {
        match *primitive {
            Primitive::Circle { center, radius } => Ok(DrawCommand::Circle {
                center: self.point(center)?,
                radius: self.length(radius),
                stroke: stroke.clone(),
            }),
            _ => self.polyline(&primitive.to_points(self.chord_tolerance), false, stroke),
        }
    }
}

/// 网格间距自适应：像素间距不足时倍增。
pub fn adaptive_grid_spacing(base: f64, scale: f64, min_px: f64) -> Option<f64> {
    if !(base.is_finite() && base > 0.0 && scale.is_finite() && scale > 0.0) {
        return None;
    }
    let mut spacing = base;
    for _ in 0..MAX_GRID_DOUBLINGS {
        if spacing * scale >= min_px {
            return Some(spacing);
        }
        spacing *= 2.0;
    }
    None
}

fn grid_steps(min: f64, max: f64, spacing: f64) -> impl Iterator<Item = i64> {
    let first = (min / spacing).ceil() as i64;
    let last = (max / spacing).floor() as i64;
    first..=last
}

/// 背景通道：网格、标尺、原点标记。
pub fn background_pass(
    transform: &ViewTransform,
    settings: &RenderSettings,
) -> Result<Vec<DrawCommand>, TransformError> {
    let viewport = transform.viewport()?;
    let area = viewport.drawing_area();
    let visible = transform.visible_world_bounds()?;
    let palette = &settings.palette;
    let mut out = vec![DrawCommand::Rect {
        min: area.min(),
        max: area.max(),
        stroke: None,
        fill: Some(palette.background),
    }];

    let spacing = adaptive_grid_spacing(settings.grid_spacing, transform.scale(), settings.min_grid_px);
    let mut ticks_x = Vec::new();
    let mut ticks_y = Vec::new();
    if let Some(spacing) = spacing {
        let columns: Vec<i64> = grid_steps(visible.min().x(), visible.max().x(), spacing).collect();
        let rows: Vec<i64> = grid_steps(visible.min().y(), visible.max().y(), spacing).collect();
        if columns.len() + rows.len() <= settings.max_grid_lines {
            let minor = Stroke::solid(palette.grid_minor, 1.0);
            let major = Stroke::solid(palette.grid_major, 1.0);
            for k in columns {
                let x = k as f64 * spacing;
                let sx = transform.world_to_screen(Point2::new(x, 0.0))?.x();
                let is_major = k.rem_euclid(settings.major_every.max(1)) == 0;
                out.push(DrawCommand::Polyline {
                    points: vec![Point2::new(sx, area.min().y()), Point2::new(sx, area.max().y())],
                    closed: false,
                    stroke: if is_major { major.clone() } else { minor.clone() },
                });
                if is_major {
                    ticks_x.push((sx, x));
                }
            }
            for k in rows {
                let y = k as f64 * spacing;
                let sy = transform.world_to_screen(Point2::new(0.0, y))?.y();
                let is_major = k.rem_euclid(settings.major_every.max(1)) == 0;
                out.push(DrawCommand::Polyline {
                    points: vec![Point2::new(area.min().x(), sy), Point2::new(area.max().x(), sy)],
                    closed: false,
                    stroke: if is_major { major.clone() } else { minor.clone() },
                });
                if is_major {
                    ticks_y.push((sy, y));
                }
            }
        } else {
            debug!(spacing, "网格线过多，跳过网格绘制");
        }
    }

    if visible.contains_point(Point2::ORIGIN) {
        let origin = transform.world_to_screen(Point2::ORIGIN)?;
        out.push(DrawCommand::Polyline {
            points: vec![origin, origin.translate(Vector2::new(ORIGIN_AXIS_PX, 0.0))],
            closed: false,
            stroke: Stroke::solid(palette.axis_x, 2.0),
        });
        out.push(DrawCommand::Polyline {
            points: vec![origin, origin.translate(Vector2::new(0.0, -ORIGIN_AXIS_PX))],
            closed: false,
            stroke: Stroke::solid(palette.axis_y, 2.0),
        });
        out.push(DrawCommand::Marker {
            position: origin,
            shape: MarkerShape::Plus,
            size: 6.0,
            color: palette.ruler_text,
        });
    }

    let margins = viewport.margins;
    let label_px = settings.ruler_size * 0.4;
    let tick = Stroke::solid(palette.ruler_text, 1.0);
    if margins.top > 0.0 {
        out.push(DrawCommand::Rect {
            min: Point2::new(0.0, 0.0),
            max: Point2::new(viewport.width, margins.top),
            stroke: None,
            fill: Some(palette.ruler),
        });
        for (sx, value) in &ticks_x {
            out.push(DrawCommand::Polyline {
                points: vec![
                    Point2::new(*sx, margins.top * 0.5),
                    Point2::new(*sx, margins.top),
                ],
                closed: false,
                stroke: tick.clone(),
            });
            out.push(DrawCommand::Text {
                position: Point2::new(sx + 2.0, margins.top * 0.5),
                content: ruler_label(*value),
                size: label_px,
                angle: 0.0,
                color: palette.ruler_text,
            });
        }
    }
    if margins.left > 0.0 {
        out.push(DrawCommand::Rect {
            min: Point2::new(0.0, margins.top),
            max: Point2::new(margins.left, viewport.height),
            stroke: None,
            fill: Some(palette.ruler),
        });
        for (sy, value) in &ticks_y {
            out.push(DrawCommand::Polyline {
                points: vec![
                    Point2::new(margins.left * 0.5, *sy),
                    Point2::new(margins.left, *sy),
                ],
                closed: false,
                stroke: tick.clone(),
            });
            out.push(DrawCommand::Text {
                position: Point2::new(margins.left * 0.5, sy - 2.0),
                content: ruler_label(*value),
                size: label_px,
                angle: -std::f64::consts::FRAC_PI_2,
                color: palette.ruler_text,
            });
        }
    }
    Ok(out)
}

fn ruler_label(value: f64) -> String {
    if value.fract().abs() < 1e-9 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}

/// 实体通道：可见且未锁定图层上的实体，按场景顺序绘制。返回绘制列表与裁剪数。
pub fn entity_pass(
    scene: &Scene,
    transform: &ViewTransform,
    settings: &RenderSettings,
) -> Result<(Vec<DrawCommand>, usize), TransformError> {
    let visible = transform.visible_world_bounds()?;
    let candidates: HashSet<EntityId> = scene.query_rect(&visible).into_iter().collect();
    let painter = Painter::new(transform, settings);
    let mut out = Vec::new();
    let mut culled = 0;
    for entity in scene.entities() {
        if !candidates.contains(&entity.id) {
            culled += 1;
            continue;
        }
        let Ok(layer) = scene.resolve_layer(&entity.layer) else {
            continue;
        };
        if !layer.is_visible || layer.is_locked {
            continue;
        }
        let stroke = Stroke {
            color: entity.style.color.unwrap_or(layer.color),
            width: entity.style.width.unwrap_or(1.0),
            dash: entity.style.dash.clone(),
        };
        draw_geometry(&painter, scene, settings, &entity.geometry, &stroke, &mut out)?;
    }
    Ok((out, culled))
}

/// 按几何类型分派到各自的绘制函数。
fn draw_geometry(
    painter: &Painter<'_>,
    scene: &Scene,
    settings: &RenderSettings,
    geometry: &Geometry,
    stroke: &Stroke,
    out: &mut Vec<DrawCommand>,
) -> Result<(), TransformError> {
    match geometry {
        Geometry::Line(line) => draw_line(painter, line, stroke, out),
        Geometry::Circle(circle) => draw_circle(painter, circle, stroke, out),
        Geometry::Arc(arc) => draw_arc(painter, arc, stroke, out),
        Geometry::Ellipse(ellipse) => draw_ellipse(painter, ellipse, stroke, out),
        Geometry::Polyline(polyline) => draw_polyline(painter, polyline, stroke, out),
        Geometry::Rectangle(rect) => draw_rectangle(painter, rect, stroke, out),
        Geometry::Point(point) => {
            out.push(DrawCommand::Marker {
                position: painter.point(point.position)?,
                shape: MarkerShape::Dot,
                size: (stroke.width * 3.0).max(3.0),
                color: stroke.color,
            });
            Ok(())
        }
        Geometry::Text(text) => draw_text(painter, text, stroke, out),
        Geometry::Spline(spline) => draw_spline(painter, spline, stroke, out),
        Geometry::Dimension(dimension) => draw_dimension(painter, settings, dimension, stroke, out),
        Geometry::BlockReference(_) => {
            for primitive in scene_primitives(scene, geometry) {
                out.push(painter.primitive(&primitive, stroke)?);
            }
            Ok(())
        }
    }
}

fn draw_line(
    painter: &Painter<'_>,
    line: &Line,
    stroke: &Stroke,
    out: &mut Vec<DrawCommand>,
) -> Result<(), TransformError> {
    out.push(painter.polyline(&[line.start, line.end], false, stroke)?);
    Ok(())
}

fn draw_circle(
    painter: &Painter<'_>,
    circle: &Circle,
    stroke: &Stroke,
    out: &mut Vec<DrawCommand>,
) -> Result<(), TransformError> {
    out.push(DrawCommand::Circle {
        center: painter.point(circle.center)?,
        radius: painter.length(circle.radius),
        stroke: stroke.clone(),
    });
    Ok(())
}

fn draw_arc(
    painter: &Painter<'_>,
    arc: &Arc,
    stroke: &Stroke,
    out: &mut Vec<DrawCommand>,
) -> Result<(), TransformError> {
    let primitive = Primitive::Arc {
        center: arc.center,
        radius: arc.radius,
        start_angle: arc.start_angle,
        end_angle: arc.end_angle,
    };
    out.push(painter.primitive(&primitive, stroke)?);
    Ok(())
}

fn draw_ellipse(
    painter: &Painter<'_>,
    ellipse: &Ellipse,
    stroke: &Stroke,
    out: &mut Vec<DrawCommand>,
) -> Result<(), TransformError> {
    let points = sample_ellipse(ellipse, ELLIPSE_SEGMENTS);
    out.push(painter.polyline(&points, ellipse.is_full(), stroke)?);
    Ok(())
}

fn draw_polyline(
    painter: &Painter<'_>,
    polyline: &Polyline,
    stroke: &Stroke,
    out: &mut Vec<DrawCommand>,
) -> Result<(), TransformError> {
    let mut points: Vec<Point2> = Vec::new();
    for primitive in primitives(&Geometry::Polyline(polyline.clone())) {
        for point in primitive.to_points(painter.chord_tolerance) {
            if points.last().is_none_or(|last| last.distance_to(point) > DEGENERACY) {
                points.push(point);
            }
        }
    }
    if points.len() >= 2 {
        out.push(painter.polyline(&points, false, stroke)?);
    }
    Ok(())
}

fn draw_rectangle(
    painter: &Painter<'_>,
    rect: &Rectangle,
    stroke: &Stroke,
    out: &mut Vec<DrawCommand>,
) -> Result<(), TransformError> {
    out.push(painter.polyline(&rect.corners(), true, stroke)?);
    Ok(())
}

fn draw_text(
    painter: &Painter<'_>,
    text: &Text,
    stroke: &Stroke,
    out: &mut Vec<DrawCommand>,
) -> Result<(), TransformError> {
    let size = painter.length(text.height);
    if size < MIN_TEXT_PX {
        out.push(painter.polyline(&text.outline(), true, stroke)?);
        return Ok(());
    }
    out.push(DrawCommand::Text {
        position: painter.point(text.insert)?,
        content: text.content.clone(),
        size,
        angle: -text.rotation,
        color: stroke.color,
    });
    Ok(())
}

fn draw_spline(
    painter: &Painter<'_>,
    spline: &Spline,
    stroke: &Stroke,
    out: &mut Vec<DrawCommand>,
) -> Result<(), TransformError> {
    let points = sample_spline(spline, SPLINE_SEGMENTS_PER_SPAN);
    if points.len() >= 2 {
        out.push(painter.polyline(&points, spline.is_closed, stroke)?);
    }
    Ok(())
}

/// 尺寸线在标注文字处按配置的间隙断开；测量长度不足间隙时画整条。
fn draw_dimension(
    painter: &Painter<'_>,
    settings: &RenderSettings,
    dimension: &Dimension,
    stroke: &Stroke,
    out: &mut Vec<DrawCommand>,
) -> Result<(), TransformError> {
    let Some(layout) = dimension.layout() else {
        return Ok(());
    };
    for (start, end) in layout.extension_lines {
        out.push(painter.polyline(&[start, end], false, stroke)?);
    }
    let (a, b) = layout.dimension_line;
    let gap = settings.dimension_label_gap;
    match a.vector_to(b).normalize() {
        Some(direction) if gap > 0.0 && layout.measurement > gap + DEGENERACY => {
            let half = direction.scale(gap * 0.5);
            let mid = layout.label_position;
            out.push(painter.polyline(&[a, mid.translate(half.scale(-1.0))], false, stroke)?);
            out.push(painter.polyline(&[mid.translate(half), b], false, stroke)?);
        }
        _ => out.push(painter.polyline(&[a, b], false, stroke)?),
    }
    for end in [a, b] {
        out.push(DrawCommand::Marker {
            position: painter.point(end)?,
            shape: MarkerShape::Tick,
            size: settings.dimension_text_px * 0.6,
            color: stroke.color,
        });
    }
    out.push(DrawCommand::Text {
        position: painter.point(layout.label_position)?,
        content: dimension.label(),
        size: settings.dimension_text_px,
        angle: -layout.label_angle,
        color: stroke.color,
    });
    Ok(())
}

/// 叠加层通道：选中高亮、工具预览、夹点、捕捉标记、框选矩形。
pub fn overlay_pass(
    scene: &Scene,
    transform: &ViewTransform,
    settings: &RenderSettings,
    overlay: &OverlayState,
) -> Result<Vec<DrawCommand>, TransformError> {
    let palette = &settings.palette;
    let painter = Painter::new(transform, settings);
    let mut out = Vec::new();

    let highlight = Stroke::dashed(palette.selection, 2.0, vec![6.0, 4.0]);
    for id in &overlay.selection {
        let Some(entity) = scene.entity(*id) else {
            continue;
        };
        for primitive in scene_primitives(scene, &entity.geometry) {
            out.push(painter.primitive(&primitive, &highlight)?);
        }
    }

    let preview = Stroke::dashed(palette.preview, 1.0, vec![4.0, 4.0]);
    for geometry in &overlay.previews {
        draw_geometry(&painter, scene, settings, geometry, &preview, &mut out)?;
    }

    for marker in &overlay.grips {
        let center = painter.point(marker.grip.position)?;
        let half = Vector2::new(marker.size * 0.5, marker.size * 0.5);
        let fill = match marker.state {
            GripState::Cold => palette.grip_cold,
            GripState::Warm => palette.grip_warm,
            GripState::Hot => palette.grip_hot,
        };
        out.push(DrawCommand::Rect {
            min: center.translate(half.scale(-1.0)),
            max: center.translate(half),
            stroke: Some(Stroke::solid(palette.grip_border, 1.0)),
            fill: Some(fill),
        });
    }

    if let Some(snap) = &overlay.snap {
        out.push(DrawCommand::Marker {
            position: painter.point(snap.point)?,
            shape: MarkerShape::for_snap(snap.kind),
            size: SNAP_MARKER_PX,
            color: palette.snap,
        });
    }

    if let Some(rect) = &overlay.selection_rect {
        let bounds = Bounds2D::from_corners(painter.point(rect.start)?, painter.point(rect.end)?);
        let stroke = match rect.mode {
            SelectionMode::Window => Stroke::solid(palette.selection_window, 1.0),
            SelectionMode::Crossing => {
                Stroke::dashed(palette.selection_crossing, 1.0, vec![5.0, 3.0])
            }
        };
        out.push(DrawCommand::Rect {
            min: bounds.min(),
            max: bounds.max(),
            stroke: Some(stroke),
            fill: None,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grips::GripKind;
    use crate::transform::{Margins, Viewport};
    use dxv_core::document::{EntityDraft, Layer};

    fn transform(scale: f64, ox: f64, oy: f64) -> ViewTransform {
        let mut transform = ViewTransform::default();
        transform
            .set_viewport(Viewport::new(800.0, 600.0, Margins::rulers(24.0)))
            .unwrap();
        transform.set_view(scale, Vector2::new(ox, oy));
        transform
    }

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry {
        Geometry::Line(Line {
            start: Point2::new(x0, y0),
            end: Point2::new(x1, y1),
        })
    }

    fn polylines(commands: &[DrawCommand]) -> Vec<&Vec<Point2>> {
        commands
            .iter()
            .filter_map(|command| match command {
                DrawCommand::Polyline { points, .. } => Some(points),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn not_ready_viewport_draws_nothing() {
        let pipeline = RenderPipeline::default();
        let err = pipeline
            .render(&Scene::new(), &ViewTransform::default(), &OverlayState::default())
            .unwrap_err();
        assert_eq!(err, TransformError::ViewportNotReady);
    }

    #[test]
    fn entities_are_mapped_to_screen() {
        let mut scene = Scene::new();
        scene.add_entity(EntityDraft::new("0", line(0.0, 0.0, 10.0, 0.0))).unwrap();
        let (commands, culled) =
            entity_pass(&scene, &transform(2.0, 100.0, 500.0), &RenderSettings::default()).unwrap();
        assert_eq!(culled, 0);
        assert_eq!(
            polylines(&commands),
            vec![&vec![Point2::new(100.0, 500.0), Point2::new(120.0, 500.0)]]
        );
    }

    #[test]
    fn hidden_locked_and_offscreen_entities_are_skipped() {
        let mut scene = Scene::new();
        let mut hidden = Layer::new("hidden");
        hidden.is_visible = false;
        let mut locked = Layer::new("locked");
        locked.is_locked = true;
        scene.add_layer(hidden).unwrap();
        scene.add_layer(locked).unwrap();
        scene.add_entity(EntityDraft::new("hidden", line(0.0, 0.0, 5.0, 0.0))).unwrap();
        scene.add_entity(EntityDraft::new("locked", line(0.0, 1.0, 5.0, 1.0))).unwrap();
        scene
            .add_entity(EntityDraft::new("0", line(9000.0, 9000.0, 9001.0, 9000.0)))
            .unwrap();
        let (commands, culled) =
            entity_pass(&scene, &transform(1.0, 100.0, 500.0), &RenderSettings::default()).unwrap();
        assert!(commands.is_empty());
        assert_eq!(culled, 1);
    }

    #[test]
    fn dimension_line_leaves_gap_for_label() {
        let mut scene = Scene::new();
        scene
            .add_entity(EntityDraft::new(
                "0",
                Geometry::Dimension(Dimension {
                    start: Point2::new(0.0, 0.0),
                    end: Point2::new(100.0, 0.0),
                    offset: 10.0,
                    text: None,
                }),
            ))
            .unwrap();
        let settings = RenderSettings::default();
        let (commands, _) = entity_pass(&scene, &transform(1.0, 100.0, 500.0), &settings).unwrap();
        let lines = polylines(&commands);
        assert_eq!(lines.len(), 4);
        let dimension_parts: Vec<_> = lines
            .iter()
            .filter(|points| (points[0].y() - 490.0).abs() < 1e-9)
            .collect();
        assert_eq!(dimension_parts.len(), 2);
        assert!((dimension_parts[0][1].x() - 135.0).abs() < 1e-9);
        assert!((dimension_parts[1][0].x() - 165.0).abs() < 1e-9);
        assert!(commands.iter().any(|command| matches!(
            command,
            DrawCommand::Text { content, .. } if content == "100.00"
        )));
    }

    #[test]
    fn grid_spacing_doubles_until_readable() {
        assert_eq!(adaptive_grid_spacing(10.0, 1.0, 8.0), Some(10.0));
        assert_eq!(adaptive_grid_spacing(10.0, 0.1, 8.0), Some(80.0));
        assert_eq!(adaptive_grid_spacing(0.0, 1.0, 8.0), None);
    }

    #[test]
    fn background_has_rulers_and_origin() {
        let commands =
            background_pass(&transform(1.0, 100.0, 500.0), &RenderSettings::default()).unwrap();
        let fills = commands
            .iter()
            .filter(|command| matches!(command, DrawCommand::Rect { fill: Some(_), .. }))
            .count();
        assert_eq!(fills, 3);
        assert!(commands.iter().any(|command| matches!(
            command,
            DrawCommand::Marker { shape: MarkerShape::Plus, position, .. }
                if *position == Point2::new(100.0, 500.0)
        )));
    }

    #[test]
    fn overlays_reflect_interaction_state() {
        let mut scene = Scene::new();
        let id = scene.add_entity(EntityDraft::new("0", line(0.0, 0.0, 10.0, 0.0))).unwrap();
        let overlay = OverlayState {
            selection: vec![id],
            grips: vec![GripMarker {
                grip: Grip {
                    entity: id,
                    index: 0,
                    kind: GripKind::Endpoint,
                    position: Point2::new(0.0, 0.0),
                },
                state: GripState::Hot,
                size: 12.0,
            }],
            snap: Some(SnapCandidate {
                point: Point2::new(10.0, 0.0),
                kind: SnapKind::Endpoint,
                priority: SnapKind::Endpoint.priority(),
                distance: 0.5,
                source: Some(id),
            }),
            previews: vec![line(0.0, 0.0, 0.0, 5.0)],
            selection_rect: Some(SelectionRect {
                start: Point2::new(20.0, 20.0),
                end: Point2::new(0.0, 0.0),
                mode: SelectionMode::Crossing,
            }),
        };
        let settings = RenderSettings::default();
        let commands =
            overlay_pass(&scene, &transform(1.0, 100.0, 500.0), &settings, &overlay).unwrap();
        assert_eq!(commands.len(), 5);
        assert!(matches!(
            &commands[2],
            DrawCommand::Rect { min, max, fill: Some(fill), .. }
                if *fill == settings.palette.grip_hot
                    && *min == Point2::new(94.0, 494.0)
                    && *max == Point2::new(106.0, 506.0)
        ));
        assert!(matches!(
            &commands[3],
            DrawCommand::Marker { shape: MarkerShape::Square, .. }
        ));
        assert!(matches!(
            &commands[4],
            DrawCommand::Rect { stroke: Some(stroke), .. } if stroke.is_dashed()
        ));
    }

    #[test]
    fn frame_passes_keep_order() {
        let mut scene = Scene::new();
        scene.add_entity(EntityDraft::new("0", line(0.0, 0.0, 10.0, 0.0))).unwrap();
        let frame = RenderPipeline::default()
            .render(&scene, &transform(1.0, 100.0, 500.0), &OverlayState::default())
            .unwrap();
        assert_eq!(frame.stats.entities, 1);
        assert_eq!(frame.len(), frame.commands().count());
        assert!(matches!(frame.commands().next(), Some(DrawCommand::Rect { .. })));
    }
}
