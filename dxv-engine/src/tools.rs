//! 绘图工具状态机。
//!
//! `Idle → ToolArmed → CollectingPoints → Previewing → Completing → Committed`，
//! 提交后回到 `ToolArmed`（连续模式）或 `Idle`。提交前任意状态按 Esc 回到 `Idle`，
//! 丢弃未完成的图形且不产生命令。完成阶段的几何错误使状态机中止并回到 `Idle`。

use dxv_config::DrawingConfig;
use dxv_core::document::{
    Arc, Circle, Dimension, EntityDraft, Geometry, Line, Point, Polyline, Rectangle,
    StyleOverrides, Text,
};
use dxv_core::geometry::{GeometryError, Point2, arc_through_points};
use dxv_core::tolerance::DUPLICATE_VERTEX;
use tracing::{debug, trace, warn};

use crate::commands::{AddEntity, SceneCommand};
use crate::errors::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Line,
    Circle,
    Arc,
    Rectangle,
    Polyline,
    Point,
    Dimension,
    Text,
}

impl ToolKind {
    pub const ALL: [ToolKind; 8] = [
        ToolKind::Line,
        ToolKind::Circle,
        ToolKind::Arc,
        ToolKind::Rectangle,
        ToolKind::Polyline,
        ToolKind::Point,
        ToolKind::Dimension,
        ToolKind::Text,
    ];

    /// 完成所需的点数；多段线由用户结束或自动闭合，返回 `None`。
    pub fn required_points(self) -> Option<usize> {
        match self {
            ToolKind::Point | ToolKind::Text => Some(1),
            ToolKind::Line | ToolKind::Circle | ToolKind::Rectangle => Some(2),
            ToolKind::Arc | ToolKind::Dimension => Some(3),
            ToolKind::Polyline => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Line => "line",
            ToolKind::Circle => "circle",
            ToolKind::Arc => "arc",
            ToolKind::Rectangle => "rectangle",
            ToolKind::Polyline => "polyline",
            ToolKind::Point => "point",
            ToolKind::Dimension => "dimension",
            ToolKind::Text => "text",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        ToolKind::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolState {
    Idle,
    ToolArmed,
    CollectingPoints,
    Previewing,
    Completing,
    Committed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    Arm(ToolKind),
    /// 世界坐标，已经过捕捉修正。
    PointerMove(Point2),
    Click(Point2),
    /// 结束多段线（回车或双击）。
    Finish,
    Cancel,
}

/// 每次输入随附的上下文。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolContext {
    /// 自动闭合判定距离（世界单位），通常由像素容差换算。
    pub close_tolerance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    None,
    /// 预览几何已更新。
    Preview,
    Committed(SceneCommand),
    Cancelled,
    Aborted(ToolError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolSettings {
    pub layer: String,
    pub style: StyleOverrides,
    pub continuous: bool,
    pub text_content: String,
    pub text_height: f64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self::from(&DrawingConfig::default())
    }
}

impl From<&DrawingConfig> for ToolSettings {
    fn from(config: &DrawingConfig) -> Self {
        Self {
            layer: config.default_layer.clone(),
            style: StyleOverrides::default(),
            continuous: config.continuous_tools,
            text_content: "Text".to_string(),
            text_height: 2.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolMachine {
    settings: ToolSettings,
    kind: Option<ToolKind>,
    state: ToolState,
    points: Vec<Point2>,
    cursor: Option<Point2>,
    preview: Option<Geometry>,
    path: Vec<ToolState>,
}

impl Default for ToolMachine {
    fn default() -> Self {
        Self::new(ToolSettings::default())
    }
}

impl ToolMachine {
    pub fn new(settings: ToolSettings) -> Self {
        Self {
            settings,
            kind: None,
            state: ToolState::Idle,
            points: Vec::new(),
            cursor: None,
            preview: None,
            path: Vec::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> ToolState {
        self.state
    }

    #[inline]
    pub fn cursor(&self) -> Option<Point2> {
        self.cursor
    }

    #[inline]
    pub fn kind(&self) -> Option<ToolKind> {
        self.kind
    }

    #[inline]
    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ToolSettings {
        &mut self.settings
    }

    #[inline]
    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    #[inline]
    pub fn preview(&self) -> Option<&Geometry> {
        self.preview.as_ref()
    }

    /// 最近一次待命以来经过的状态序列。
    #[inline]
    pub fn path(&self) -> &[ToolState] {
        &self.path
    }

    /// 上一个已确定的点，作为垂足、切点、平行捕捉的基准。
    #[inline]
    pub fn reference_point(&self) -> Option<Point2> {
        self.points.last().copied()
    }

    /// 是否处于正在绘制（已有点）的状态。
    pub fn is_drawing(&self) -> bool {
        matches!(
            self.state(),
            ToolState::CollectingPoints | ToolState::Previewing
        )
    }

    pub fn handle(&mut self, input: ToolInput, ctx: &ToolContext) -> ToolOutcome {
        match input {
            ToolInput::Arm(kind) => self.arm(kind),
            ToolInput::PointerMove(point) => self.pointer_move(point),
            ToolInput::Click(point) => self.click(point, ctx),
            ToolInput::Finish => self.finish(),
            ToolInput::Cancel => self.cancel(),
        }
    }

    /// 外部（坐标变换等）错误导致中止：丢弃部分图形并回到 `Idle`。
    pub fn abort(&mut self, error: ToolError) -> ToolOutcome {
        warn!(tool = ?self.kind, error = %error, "绘图工具中止");
        self.discard();
        self.kind = None;
        self.enter(ToolState::Idle);
        ToolOutcome::Aborted(error)
    }

    fn arm(&mut self, kind: ToolKind) -> ToolOutcome {
        self.discard();
        self.path.clear();
        self.path.push(ToolState::Idle);
        self.kind = Some(kind);
        self.enter(ToolState::ToolArmed);
        debug!(tool = kind.name(), "工具待命");
        ToolOutcome::None
    }

    fn pointer_move(&mut self, point: Point2) -> ToolOutcome {
        self.cursor = Some(point);
        if !self.is_drawing() {
            return ToolOutcome::None;
        }
        let Some(kind) = self.kind else {
            return ToolOutcome::None;
        };
        // 预览失败（例如三点共线）只是暂不显示，不中止工具。
        let next = preview_geometry(kind, &self.points, point, &self.settings).ok();
        let changed = next != self.preview;
        self.preview = next;
        if self.preview.is_some() {
            if self.state() != ToolState::Previewing {
                self.enter(ToolState::Previewing);
            }
        } else if self.state() != ToolState::CollectingPoints {
            self.enter(ToolState::CollectingPoints);
        }
        if changed {
            ToolOutcome::Preview
        } else {
            ToolOutcome::None
        }
    }

    fn click(&mut self, point: Point2, ctx: &ToolContext) -> ToolOutcome {
        let Some(kind) = self.kind else {
            return ToolOutcome::None;
        };
        match self.state() {
            ToolState::ToolArmed => {
                self.points.push(point);
                self.enter(ToolState::CollectingPoints);
            }
            ToolState::CollectingPoints | ToolState::Previewing => {
                if kind == ToolKind::Polyline
                    && self.points.len() >= 3
                    && point.distance_to(self.points[0]) <= ctx.close_tolerance
                {
                    return self.complete(true);
                }
                if self
                    .points
                    .last()
                    .is_some_and(|last| last.distance_to(point) <= DUPLICATE_VERTEX)
                {
                    return ToolOutcome::None;
                }
                self.points.push(point);
            }
            _ => return ToolOutcome::None,
        }
        match kind.required_points() {
            Some(required) if self.points.len() >= required => self.complete(false),
            _ => {
                self.preview = None;
                ToolOutcome::Preview
            }
        }
    }

    fn finish(&mut self) -> ToolOutcome {
        if self.kind == Some(ToolKind::Polyline) && self.is_drawing() && self.points.len() >= 2 {
            self.complete(false)
        } else {
            ToolOutcome::None
        }
    }

    fn cancel(&mut self) -> ToolOutcome {
        if self.state() == ToolState::Idle {
            return ToolOutcome::None;
        }
        debug!(tool = ?self.kind, points = self.points.len(), "工具取消");
        self.discard();
        self.kind = None;
        self.enter(ToolState::Idle);
        ToolOutcome::Cancelled
    }

    /// 完成阶段：确定图层与样式、处理闭合，再构造命令。
    fn complete(&mut self, closed: bool) -> ToolOutcome {
        let Some(kind) = self.kind else {
            return ToolOutcome::None;
        };
        self.enter(ToolState::Completing);
        let geometry = match final_geometry(kind, &self.points, closed, &self.settings)
            .and_then(|geometry| geometry.validate().map(|()| geometry))
        {
            Ok(geometry) => geometry,
            Err(error) => return self.abort(ToolError::Geometry(error)),
        };
        let draft = EntityDraft::new(self.settings.layer.clone(), geometry)
            .with_style(self.settings.style.clone());
        let command = SceneCommand::from(AddEntity::new(draft));
        self.enter(ToolState::Committed);
        self.discard();
        if self.settings.continuous {
            self.enter(ToolState::ToolArmed);
        } else {
            self.kind = None;
            self.enter(ToolState::Idle);
        }
        ToolOutcome::Committed(command)
    }

    fn discard(&mut self) {
        self.points.clear();
        self.preview = None;
    }

    fn enter(&mut self, state: ToolState) {
        trace!(from = ?self.state, to = ?state, "工具状态切换");
        self.state = state;
        self.path.push(state);
    }
}

fn dimension_offset(start: Point2, end: Point2, through: Point2) -> Result<f64, GeometryError> {
    let direction = start
        .vector_to(end)
        .normalize()
        .ok_or(GeometryError::CoincidentPoints)?;
    Ok(direction.cross(start.vector_to(through)))
}

fn text_geometry(insert: Point2, settings: &ToolSettings) -> Geometry {
    Geometry::Text(Text {
        insert,
        content: settings.text_content.clone(),
        height: settings.text_height,
        rotation: 0.0,
    })
}

/// 已确定的点加上光标位置形成的橡皮筋预览。
fn preview_geometry(
    kind: ToolKind,
    points: &[Point2],
    cursor: Point2,
    settings: &ToolSettings,
) -> Result<Geometry, GeometryError> {
    let Some(&first) = points.first() else {
        return Err(GeometryError::InsufficientPoints {
            required: 1,
            actual: 0,
        });
    };
    let geometry = match (kind, points) {
        (ToolKind::Arc, [start, through]) => {
            Geometry::Arc(Arc::from(arc_through_points(*start, *through, cursor)?))
        }
        (ToolKind::Dimension, [start, end]) => Geometry::Dimension(Dimension {
            start: *start,
            end: *end,
            offset: dimension_offset(*start, *end, cursor)?,
            text: None,
        }),
        (ToolKind::Polyline, _) => {
            let mut vertices = points.to_vec();
            vertices.push(cursor);
            Geometry::Polyline(Polyline::from_points(vertices, false))
        }
        (ToolKind::Circle, _) => Geometry::Circle(Circle {
            center: first,
            radius: first.distance_to(cursor),
        }),
        (ToolKind::Rectangle, _) => Geometry::Rectangle(Rectangle {
            first,
            second: cursor,
        }),
        (ToolKind::Point, _) => Geometry::Point(Point { position: cursor }),
        (ToolKind::Text, _) => text_geometry(cursor, settings),
        _ => Geometry::Line(Line {
            start: *points.last().unwrap_or(&first),
            end: cursor,
        }),
    };
    geometry.validate()?;
    Ok(geometry)
}

fn final_geometry(
    kind: ToolKind,
    points: &[Point2],
    closed: bool,
    settings: &ToolSettings,
) -> Result<Geometry, GeometryError> {
    let need = |required: usize| GeometryError::InsufficientPoints {
        required,
        actual: points.len(),
    };
    let geometry = match kind {
        ToolKind::Line => match points {
            [start, end, ..] => Geometry::Line(Line {
                start: *start,
                end: *end,
            }),
            _ => return Err(need(2)),
        },
        ToolKind::Circle => match points {
            [center, rim, ..] => Geometry::Circle(Circle {
                center: *center,
                radius: center.distance_to(*rim),
            }),
            _ => return Err(need(2)),
        },
        ToolKind::Arc => match points {
            [start, through, end, ..] => {
                Geometry::Arc(Arc::from(arc_through_points(*start, *through, *end)?))
            }
            _ => return Err(need(3)),
        },
        ToolKind::Rectangle => match points {
            [first, second, ..] => Geometry::Rectangle(Rectangle {
                first: *first,
                second: *second,
            }),
            _ => return Err(need(2)),
        },
        ToolKind::Polyline => Geometry::Polyline(Polyline::from_points(points.iter().copied(), closed)),
        ToolKind::Point => match points {
            [position, ..] => Geometry::Point(Point {
                position: *position,
            }),
            _ => return Err(need(1)),
        },
        ToolKind::Dimension => match points {
            [start, end, through, ..] => Geometry::Dimension(Dimension {
                start: *start,
                end: *end,
                offset: dimension_offset(*start, *end, *through)?,
                text: None,
            }),
            _ => return Err(need(3)),
        },
        ToolKind::Text => match points {
            [insert, ..] => text_geometry(*insert, settings),
            _ => return Err(need(1)),
        },
    };
    Ok(geometry)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTX: ToolContext = ToolContext {
        close_tolerance: 0.5,
    };

    fn run(machine: &mut ToolMachine, inputs: Vec<ToolInput>) -> Vec<ToolOutcome> {
        inputs
            .into_iter()
            .map(|input| machine.handle(input, &CTX))
            .collect()
    }

    fn committed_geometry(outcome: &ToolOutcome) -> Geometry {
        match outcome {
            ToolOutcome::Committed(SceneCommand::AddEntity(add)) => add.draft.geometry.clone(),
            other => panic!("expected commit, got {other:?}"),
        }
    }

    #[test]
    fn line_walks_the_full_path() {
        let mut machine = ToolMachine::default();
        let outcomes = run(
            &mut machine,
            vec![
                ToolInput::Arm(ToolKind::Line),
                ToolInput::Click(Point2::new(0.0, 0.0)),
                ToolInput::PointerMove(Point2::new(5.0, 0.0)),
                ToolInput::Click(Point2::new(10.0, 0.0)),
            ],
        );
        assert_eq!(outcomes[2], ToolOutcome::Preview);
        assert_eq!(
            committed_geometry(&outcomes[3]),
            Geometry::Line(Line {
                start: Point2::new(0.0, 0.0),
                end: Point2::new(10.0, 0.0),
            })
        );
        assert_eq!(
            machine.path(),
            &[
                ToolState::Idle,
                ToolState::ToolArmed,
                ToolState::CollectingPoints,
                ToolState::Previewing,
                ToolState::Completing,
                ToolState::Committed,
                ToolState::Idle,
            ]
        );
        assert_eq!(machine.kind(), None);
    }

    #[test]
    fn continuous_mode_returns_to_armed() {
        let mut settings = ToolSettings::default();
        settings.continuous = true;
        let mut machine = ToolMachine::new(settings);
        run(
            &mut machine,
            vec![
                ToolInput::Arm(ToolKind::Point),
                ToolInput::Click(Point2::new(1.0, 1.0)),
            ],
        );
        assert_eq!(machine.state(), ToolState::ToolArmed);
        assert_eq!(machine.kind(), Some(ToolKind::Point));
    }

    #[test]
    fn cancel_discards_without_command() {
        let mut machine = ToolMachine::default();
        let outcomes = run(
            &mut machine,
            vec![
                ToolInput::Arm(ToolKind::Rectangle),
                ToolInput::Click(Point2::new(0.0, 0.0)),
                ToolInput::PointerMove(Point2::new(3.0, 4.0)),
                ToolInput::Cancel,
            ],
        );
        assert_eq!(outcomes[3], ToolOutcome::Cancelled);
        assert_eq!(machine.state(), ToolState::Idle);
        assert!(machine.points().is_empty());
        assert!(machine.preview().is_none());
        assert_eq!(machine.handle(ToolInput::Cancel, &CTX), ToolOutcome::None);
    }

    #[test]
    fn polyline_closes_near_first_point() {
        let mut machine = ToolMachine::default();
        let outcomes = run(
            &mut machine,
            vec![
                ToolInput::Arm(ToolKind::Polyline),
                ToolInput::Click(Point2::new(0.0, 0.0)),
                ToolInput::Click(Point2::new(10.0, 0.0)),
                ToolInput::Click(Point2::new(10.0, 10.0)),
                ToolInput::Click(Point2::new(0.2, 0.1)),
            ],
        );
        let Geometry::Polyline(polyline) = committed_geometry(&outcomes[4]) else {
            panic!("expected polyline");
        };
        assert!(polyline.is_closed);
        assert_eq!(polyline.vertices.len(), 3);
    }

    #[test]
    fn polyline_finish_keeps_it_open() {
        let mut machine = ToolMachine::default();
        let outcomes = run(
            &mut machine,
            vec![
                ToolInput::Arm(ToolKind::Polyline),
                ToolInput::Click(Point2::new(0.0, 0.0)),
                ToolInput::Click(Point2::new(0.0, 0.0)),
                ToolInput::Click(Point2::new(5.0, 5.0)),
                ToolInput::Finish,
            ],
        );
        let Geometry::Polyline(polyline) = committed_geometry(&outcomes[4]) else {
            panic!("expected polyline");
        };
        assert!(!polyline.is_closed);
        assert_eq!(polyline.vertices.len(), 2);
    }

    #[test]
    fn failed_preview_hides_it_without_aborting() {
        let mut machine = ToolMachine::default();
        run(
            &mut machine,
            vec![
                ToolInput::Arm(ToolKind::Arc),
                ToolInput::Click(Point2::new(0.0, 0.0)),
                ToolInput::Click(Point2::new(1.0, 1.0)),
                ToolInput::PointerMove(Point2::new(3.0, 1.0)),
            ],
        );
        assert_eq!(machine.state(), ToolState::Previewing);
        assert!(machine.preview().is_some());

        let collinear = machine.handle(ToolInput::PointerMove(Point2::new(2.0, 2.0)), &CTX);
        assert_eq!(collinear, ToolOutcome::Preview);
        assert!(machine.preview().is_none());
        assert_eq!(machine.state(), ToolState::CollectingPoints);
        assert_eq!(machine.kind(), Some(ToolKind::Arc));
        assert_eq!(machine.points().len(), 2);

        machine.handle(ToolInput::PointerMove(Point2::new(3.0, 1.0)), &CTX);
        let outcome = machine.handle(ToolInput::Click(Point2::new(3.0, 1.0)), &CTX);
        assert!(matches!(committed_geometry(&outcome), Geometry::Arc(_)));
    }

    #[test]
    fn degenerate_completion_aborts_to_idle() {
        let mut machine = ToolMachine::default();
        let outcomes = run(
            &mut machine,
            vec![
                ToolInput::Arm(ToolKind::Arc),
                ToolInput::Click(Point2::new(0.0, 0.0)),
                ToolInput::Click(Point2::new(1.0, 1.0)),
                ToolInput::PointerMove(Point2::new(2.0, 2.0)),
                ToolInput::Click(Point2::new(2.0, 2.0)),
            ],
        );
        assert_eq!(machine.state(), ToolState::Idle);
        assert!(machine.preview().is_none());
        assert_eq!(
            outcomes[4],
            ToolOutcome::Aborted(ToolError::Geometry(GeometryError::Collinear))
        );
        assert_eq!(outcomes[3], ToolOutcome::None);
    }

    #[test]
    fn dimension_offset_follows_third_point() {
        let mut machine = ToolMachine::default();
        let outcomes = run(
            &mut machine,
            vec![
                ToolInput::Arm(ToolKind::Dimension),
                ToolInput::Click(Point2::new(0.0, 0.0)),
                ToolInput::Click(Point2::new(10.0, 0.0)),
                ToolInput::Click(Point2::new(4.0, -3.0)),
            ],
        );
        let Geometry::Dimension(dimension) = committed_geometry(&outcomes[3]) else {
            panic!("expected dimension");
        };
        assert!((dimension.offset + 3.0).abs() < 1e-12);
    }

    #[test]
    fn external_errors_abort() {
        let mut machine = ToolMachine::default();
        run(
            &mut machine,
            vec![
                ToolInput::Arm(ToolKind::Circle),
                ToolInput::Click(Point2::new(0.0, 0.0)),
            ],
        );
        let outcome = machine.abort(ToolError::Transform(
            crate::errors::TransformError::ViewportNotReady,
        ));
        assert!(matches!(outcome, ToolOutcome::Aborted(ToolError::Transform(_))));
        assert_eq!(machine.state(), ToolState::Idle);
        assert!(machine.points().is_empty());
    }
}
