//! 编辑会话：把楼层、命令历史、选择、夹点、工具、捕捉、视图变换与渲染管线串起来。
//!
//! 输入处理器不直接写场景字段，所有修改都经由命令执行；每次修改后在同一次调用内
//! 清理选择集，保证选择集始终是当前场景实体的子集。

use std::collections::VecDeque;

use dxv_config::{AppConfig, SpatialConfig};
use dxv_core::document::{EntityId, Layer, Level, LevelSet, Scene};
use dxv_core::geometry::{Point2, Vector2};
use dxv_core::hit_test;
use dxv_core::spatial::GridSettings;
use tracing::{debug, info, warn};

use crate::commands::{
    Batch, Command, CommandManager, JournalEntry, MoveEntities, RemoveEntity, SceneCommand,
    UpdateLayer,
};
use crate::errors::{CommandError, EngineError, ToolError, TransformError};
use crate::grips::{GripEditor, GripSettings};
use crate::render::{
    Frame, GripMarker, OverlayState, RenderPipeline, RenderSettings, SelectionRect,
};
use crate::scheduler::{DirtyFlag, FrameScheduler};
use crate::selection::{SelectionMode, SelectionSet, is_selectable};
use crate::snap::{SnapCandidate, SnapEngine, SnapSettings};
use crate::tools::{ToolContext, ToolInput, ToolKind, ToolMachine, ToolOutcome, ToolSettings};
use crate::transform::{Margins, ViewTransform, Viewport, ZoomLimits};

/// 小于该像素距离的拖动视为单击。
const CLICK_SLOP_PX: f64 = 3.0;

/// 发往宿主界面的通知（图层面板、属性面板等）。
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    EntityCreated(EntityId),
    SelectionChanged(Vec<EntityId>),
    SceneChanged,
    CommandRejected {
        command: &'static str,
        message: String,
    },
    ToolAborted(String),
    /// 导入边界的解析错误，原样转交。
    ParseFailed(String),
    LevelSwitched(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    /// 多选修饰键（通常为 Shift）。
    pub additive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Enter,
    Delete,
}

/// 各渲染通道是否需要重绘。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyFlags {
    pub background: bool,
    pub entities: bool,
    pub overlays: bool,
}

impl DirtyFlags {
    pub const ALL: DirtyFlags = DirtyFlags {
        background: true,
        entities: true,
        overlays: true,
    };

    #[inline]
    pub fn any(&self) -> bool {
        self.background || self.entities || self.overlays
    }
}

/// 与帧调度器共享的脏标记，会话变化时自动标记。
#[derive(Debug, Clone)]
pub struct SessionSignals {
    pub background: DirtyFlag,
    pub entities: DirtyFlag,
    pub overlays: DirtyFlag,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DragSelect {
    start: Point2,
    current: Point2,
}

pub fn grid_settings(config: &SpatialConfig) -> GridSettings {
    GridSettings {
        initial_cell_size: config.initial_cell_size,
        target_per_cell: config.target_per_cell,
        rebuild_factor: config.rebuild_factor,
        min_cell_size: config.min_cell_size,
        max_cell_size: config.max_cell_size,
    }
}

pub struct EditorSession {
    levels: LevelSet,
    history: CommandManager,
    selection: SelectionSet,
    grips: GripEditor,
    tools: ToolMachine,
    snap: SnapEngine,
    transform: ViewTransform,
    pipeline: RenderPipeline,
    index_settings: GridSettings,
    ruler_size: f64,
    pick_tolerance_px: f64,
    hover_snap: Option<SnapCandidate>,
    drag_select: Option<DragSelect>,
    dirty: DirtyFlags,
    signals: Option<SessionSignals>,
    events: VecDeque<EditorEvent>,
}

impl EditorSession {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_scene(config, Scene::new())
    }

    pub fn with_scene(config: &AppConfig, mut scene: Scene) -> Self {
        let index_settings = grid_settings(&config.spatial);
        scene.set_index_settings(index_settings);
        Self {
            levels: LevelSet::new(Level::new("Level 1", scene)),
            history: CommandManager::from_config(&config.history),
            selection: SelectionSet::new(),
            grips: GripEditor::new(GripSettings::from(&config.grips)),
            tools: ToolMachine::new(ToolSettings::from(&config.drawing)),
            snap: SnapEngine::new(SnapSettings::from(&config.snapping)),
            transform: ViewTransform::new(ZoomLimits::from(&config.viewport)),
            pipeline: RenderPipeline::new(RenderSettings::from_config(config)),
            index_settings,
            ruler_size: config.viewport.ruler_size,
            pick_tolerance_px: config.drawing.pick_tolerance_px,
            hover_snap: None,
            drag_select: None,
            dirty: DirtyFlags::ALL,
            signals: None,
            events: VecDeque::new(),
        }
    }

    #[inline]
    pub fn scene(&self) -> &Scene {
        self.levels.current_scene()
    }

    #[inline]
    pub fn levels(&self) -> &LevelSet {
        &self.levels
    }

    #[inline]
    pub fn history(&self) -> &CommandManager {
        &self.history
    }

    #[inline]
    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    #[inline]
    pub fn grips(&self) -> &GripEditor {
        &self.grips
    }

    #[inline]
    pub fn tools(&self) -> &ToolMachine {
        &self.tools
    }

    #[inline]
    pub fn snap_engine(&self) -> &SnapEngine {
        &self.snap
    }

    pub fn snap_engine_mut(&mut self) -> &mut SnapEngine {
        &mut self.snap
    }

    #[inline]
    pub fn transform(&self) -> &ViewTransform {
        &self.transform
    }

    #[inline]
    pub fn last_snap(&self) -> Option<SnapCandidate> {
        self.hover_snap
    }

    /// 连接帧调度器：返回三个通道的脏标记，供登记渲染回调使用。
    pub fn connect(&mut self, scheduler: &FrameScheduler) -> SessionSignals {
        let signals = SessionSignals {
            background: scheduler.dirty_flag(),
            entities: scheduler.dirty_flag(),
            overlays: scheduler.dirty_flag(),
        };
        self.signals = Some(signals.clone());
        self.invalidate(DirtyFlags::ALL);
        signals
    }

    #[inline]
    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn take_dirty(&mut self) -> DirtyFlags {
        std::mem::take(&mut self.dirty)
    }

    pub fn drain_events(&mut self) -> Vec<EditorEvent> {
        self.events.drain(..).collect()
    }

    /// 取走命令日志，交给宿主的审计或回放存储。楼层切换不会丢弃未取走的条目。
    pub fn drain_journal(&mut self) -> Vec<JournalEntry> {
        self.history.drain_journal()
    }

    fn emit(&mut self, event: EditorEvent) {
        debug!(?event, "编辑器事件");
        self.events.push_back(event);
    }

    fn invalidate(&mut self, flags: DirtyFlags) {
        self.dirty.background |= flags.background;
        self.dirty.entities |= flags.entities;
        self.dirty.overlays |= flags.overlays;
        if let Some(signals) = &self.signals {
            if flags.background {
                signals.background.mark();
            }
            if flags.entities {
                signals.entities.mark();
            }
            if flags.overlays {
                signals.overlays.mark();
            }
        }
    }

    fn invalidate_overlays(&mut self) {
        self.invalidate(DirtyFlags {
            overlays: true,
            ..DirtyFlags::default()
        });
    }

    // ---- 视图 ----

    /// 宿主完成布局后调用；面积为零时视口回到未就绪状态。
    pub fn resize(&mut self, width: f64, height: f64) -> Result<(), TransformError> {
        let viewport = Viewport::new(width, height, Margins::rulers(self.ruler_size));
        let result = self.transform.set_viewport(viewport);
        self.invalidate(DirtyFlags::ALL);
        result
    }

    /// 缩放到全图。场景为空时保持当前视图并返回 `Ok(false)`。
    pub fn fit_to_view(&mut self) -> Result<bool, TransformError> {
        let Some(bounds) = self.scene().bounds() else {
            return Ok(false);
        };
        self.transform.fit_to_bounds(&bounds)?;
        self.invalidate(DirtyFlags::ALL);
        Ok(true)
    }

    /// 滚轮缩放，`steps` 为正放大、为负缩小。返回缩放后的比例。
    pub fn zoom(&mut self, cursor: Point2, steps: i32) -> Result<f64, TransformError> {
        let step = self.transform.limits().step;
        let scale = self.transform.zoom_at(cursor, step.powi(steps))?;
        self.invalidate(DirtyFlags::ALL);
        Ok(scale)
    }

    pub fn zoom_in(&mut self) -> Result<f64, TransformError> {
        let center = self.transform.center()?;
        self.zoom(center, 1)
    }

    pub fn zoom_out(&mut self) -> Result<f64, TransformError> {
        let center = self.transform.center()?;
        self.zoom(center, -1)
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.transform.pan(dx, dy);
        self.invalidate(DirtyFlags::ALL);
    }

    pub fn render(&self) -> Result<Frame, TransformError> {
        self.pipeline
            .render(self.scene(), &self.transform, &self.overlay_state())
    }

    fn overlay_state(&self) -> OverlayState {
        let scene = self.scene();
        let settings = self.grips.settings();
        let grips = self
            .grips
            .grips(scene, &self.selection)
            .into_iter()
            .map(|grip| {
                let state = self.grips.state_of(&grip);
                GripMarker {
                    grip,
                    state,
                    size: settings.size_for(state),
                }
            })
            .collect();
        let mut previews = Vec::new();
        if let Some(geometry) = self.tools.preview() {
            previews.push(geometry.clone());
        }
        if let Some((_, geometry)) = self.grips.preview() {
            previews.push(geometry.clone());
        }
        OverlayState {
            selection: self.selection.to_vec(),
            grips,
            snap: self.hover_snap,
            previews,
            selection_rect: self.drag_select.map(|drag| SelectionRect {
                start: drag.start,
                end: drag.current,
                mode: SelectionMode::from_drag(drag.start, drag.current),
            }),
        }
    }

    // ---- 命令 ----

    /// 执行命令。失败时发出 `CommandRejected`，历史保持不变。
    pub fn execute(&mut self, command: impl Into<SceneCommand>) -> Result<(), CommandError> {
        let command = command.into();
        let label = command.label();
        let scene = self.levels.current_scene_mut();
        if let Err(err) = self.history.execute(scene, command) {
            self.emit(EditorEvent::CommandRejected {
                command: label,
                message: err.to_string(),
            });
            return Err(err);
        }
        let created = self
            .history
            .last_command()
            .map(created_entities)
            .unwrap_or_default();
        for id in created {
            self.emit(EditorEvent::EntityCreated(id));
        }
        self.after_mutation();
        Ok(())
    }

    pub fn undo(&mut self) -> Result<bool, CommandError> {
        let scene = self.levels.current_scene_mut();
        let undone = self.history.undo(scene).inspect_err(|err| {
            warn!(error = %err, "撤销被拒绝");
        })?;
        if undone {
            self.after_mutation();
        }
        Ok(undone)
    }

    pub fn redo(&mut self) -> Result<bool, CommandError> {
        let scene = self.levels.current_scene_mut();
        let redone = self.history.redo(scene).inspect_err(|err| {
            warn!(error = %err, "重做被拒绝");
        })?;
        if redone {
            self.after_mutation();
        }
        Ok(redone)
    }

    /// 原子删除选中实体；选择为空时返回 `Ok(false)`。
    pub fn delete_selection(&mut self) -> Result<bool, CommandError> {
        if self.selection.is_empty() {
            return Ok(false);
        }
        let commands = self
            .selection
            .iter()
            .map(|id| SceneCommand::from(RemoveEntity::new(id)))
            .collect();
        self.execute(Batch::new(commands))?;
        Ok(true)
    }

    pub fn move_selection(&mut self, delta: Vector2) -> Result<bool, CommandError> {
        if self.selection.is_empty() {
            return Ok(false);
        }
        self.execute(MoveEntities::new(self.selection.to_vec(), delta))?;
        Ok(true)
    }

    /// 修改图层属性（可见、锁定、颜色），可撤销。
    pub fn update_layer(&mut self, layer: Layer) -> Result<(), CommandError> {
        self.execute(UpdateLayer::new(layer))
    }

    fn after_mutation(&mut self) {
        let purged = self.selection.purge(self.levels.current_scene());
        if purged > 0 {
            self.grips.reset();
            let ids = self.selection.to_vec();
            self.emit(EditorEvent::SelectionChanged(ids));
        }
        self.hover_snap = None;
        self.emit(EditorEvent::SceneChanged);
        self.invalidate(DirtyFlags {
            entities: true,
            overlays: true,
            ..DirtyFlags::default()
        });
    }

    // ---- 选择 ----

    fn selection_changed(&mut self) {
        self.grips.reset();
        let ids = self.selection.to_vec();
        self.emit(EditorEvent::SelectionChanged(ids));
        self.invalidate_overlays();
    }

    pub fn select_all(&mut self) -> bool {
        let changed = self.selection.select_all(self.levels.current_scene());
        if changed {
            self.selection_changed();
        }
        changed
    }

    pub fn clear_selection(&mut self) -> bool {
        let changed = self.selection.clear();
        if changed {
            self.selection_changed();
        }
        changed
    }

    /// 宿主面板按 ID 选中实体。
    pub fn select_entity(&mut self, id: EntityId, additive: bool) -> Result<bool, EngineError> {
        let scene = self.levels.current_scene();
        let entity = scene
            .entity(id)
            .ok_or(EngineError::EntityNotFound(id.get()))?;
        if !is_selectable(scene, entity) {
            return Ok(false);
        }
        let changed = if additive {
            self.selection.extend([id])
        } else {
            self.selection.replace([id])
        };
        if changed {
            self.selection_changed();
        }
        Ok(changed)
    }

    // ---- 工具 ----

    pub fn arm_tool(&mut self, kind: ToolKind) {
        self.grips.cancel();
        self.drag_select = None;
        let ctx = self.tool_context();
        let outcome = self.tools.handle(ToolInput::Arm(kind), &ctx);
        self.apply_tool_outcome(outcome);
    }

    fn tool_context(&self) -> ToolContext {
        ToolContext {
            close_tolerance: self.transform.pixels_to_world(self.pick_tolerance_px),
        }
    }

    fn apply_tool_outcome(&mut self, outcome: ToolOutcome) {
        match outcome {
            ToolOutcome::None => {}
            ToolOutcome::Preview | ToolOutcome::Cancelled => self.invalidate_overlays(),
            ToolOutcome::Committed(command) => {
                // 拒绝已通过 CommandRejected 事件上报。
                let _ = self.execute(command);
                self.invalidate_overlays();
            }
            ToolOutcome::Aborted(error) => {
                self.emit(EditorEvent::ToolAborted(error.to_string()));
                self.invalidate_overlays();
            }
        }
    }

    fn snapped(&mut self, world: Point2, reference: Option<Point2>) -> Point2 {
        self.hover_snap = self.snap.snap(
            self.levels.current_scene(),
            world,
            self.transform.scale(),
            reference,
        );
        self.hover_snap.map_or(world, |snap| snap.point)
    }

    /// 屏幕坐标换算失败时，正在进行的绘制中止回到 `Idle`。
    fn to_world(&mut self, screen: Point2) -> Option<Point2> {
        match self.transform.screen_to_world(screen) {
            Ok(world) => Some(world),
            Err(err) => {
                if self.tools.is_drawing() {
                    let outcome = self.tools.abort(ToolError::Transform(err));
                    self.apply_tool_outcome(outcome);
                }
                None
            }
        }
    }

    // ---- 指针与键盘（屏幕坐标） ----

    pub fn pointer_move(&mut self, screen: Point2) {
        let Some(world) = self.to_world(screen) else {
            return;
        };
        if self.grips.is_dragging() {
            let target = self.snapped(world, None);
            if let Err(err) = self.grips.drag_to(target) {
                debug!(error = %err, "夹点预览退化，保留上一帧");
            }
            self.invalidate_overlays();
        } else if self.tools.kind().is_some() {
            let reference = self.tools.reference_point();
            let point = self.snapped(world, reference);
            let ctx = self.tool_context();
            let outcome = self.tools.handle(ToolInput::PointerMove(point), &ctx);
            self.apply_tool_outcome(outcome);
            self.invalidate_overlays();
        } else if let Some(drag) = self.drag_select.as_mut() {
            drag.current = world;
            self.invalidate_overlays();
        } else {
            let tolerance = self.grip_tolerance();
            let scene = self.levels.current_scene();
            if self.grips.hover(scene, &self.selection, world, tolerance) {
                self.invalidate_overlays();
            }
        }
    }

    pub fn pointer_down(&mut self, screen: Point2, modifiers: Modifiers) {
        let Some(world) = self.to_world(screen) else {
            return;
        };
        if self.tools.kind().is_some() {
            let reference = self.tools.reference_point();
            let point = self.snapped(world, reference);
            let ctx = self.tool_context();
            let outcome = self.tools.handle(ToolInput::Click(point), &ctx);
            self.apply_tool_outcome(outcome);
            return;
        }
        let tolerance = self.grip_tolerance();
        let scene = self.levels.current_scene();
        if let Some(grip) = self.grips.grip_at(scene, &self.selection, world, tolerance) {
            if self.grips.begin_drag(scene, grip) {
                debug!(entity = %grip.entity, index = grip.index, "开始拖动夹点");
                self.invalidate_overlays();
                return;
            }
        }
        let pick = self.transform.pixels_to_world(self.pick_tolerance_px);
        let hit = hit_test::pick(scene, world, pick, |entity| is_selectable(scene, entity));
        if hit.is_some() {
            if self.selection.apply_pick(hit, modifiers.additive) {
                self.selection_changed();
            }
        } else {
            self.drag_select = Some(DragSelect {
                start: world,
                current: world,
            });
        }
    }

    pub fn pointer_up(&mut self, screen: Point2, modifiers: Modifiers) {
        if self.grips.is_dragging() {
            // 在绘图区外松开视为取消。
            let inside = self.transform.in_drawing_area(screen).unwrap_or(false);
            if !inside {
                self.grips.cancel();
                self.invalidate_overlays();
                return;
            }
            if let Some(command) = self.grips.release() {
                let _ = self.execute(command);
            }
            self.invalidate_overlays();
            return;
        }
        let Some(drag) = self.drag_select.take() else {
            return;
        };
        let end = self.transform.screen_to_world(screen).unwrap_or(drag.current);
        let moved = self.transform.world_to_pixels(drag.start.distance_to(end));
        let changed = if moved <= CLICK_SLOP_PX {
            !modifiers.additive && self.selection.clear()
        } else {
            let mode = SelectionMode::from_drag(drag.start, end);
            self.selection.select_rect(
                self.levels.current_scene(),
                drag.start,
                end,
                mode,
                modifiers.additive,
            )
        };
        if changed {
            self.selection_changed();
        } else {
            self.invalidate_overlays();
        }
    }

    pub fn key(&mut self, key: Key) {
        match key {
            Key::Escape => self.escape(),
            Key::Enter => {
                let ctx = self.tool_context();
                let outcome = self.tools.handle(ToolInput::Finish, &ctx);
                self.apply_tool_outcome(outcome);
            }
            Key::Delete => {
                let _ = self.delete_selection();
            }
        }
    }

    /// Esc 依次取消：夹点拖动、绘图工具、框选，最后清空选择。同步生效。
    fn escape(&mut self) {
        if self.grips.cancel() {
            debug!("夹点拖动已取消");
            self.invalidate_overlays();
        } else if self.tools.kind().is_some() {
            let ctx = self.tool_context();
            let outcome = self.tools.handle(ToolInput::Cancel, &ctx);
            self.hover_snap = None;
            self.apply_tool_outcome(outcome);
        } else if self.drag_select.take().is_some() {
            self.invalidate_overlays();
        } else {
            self.clear_selection();
        }
    }

    fn grip_tolerance(&self) -> f64 {
        self.transform
            .pixels_to_world(self.grips.settings().base_size_px)
    }

    // ---- 场景与楼层 ----

    /// 导入完成后载入场景：替换当前楼层、清空历史与选择、缩放到全图。
    pub fn load_scene(&mut self, mut scene: Scene) {
        scene.set_index_settings(self.index_settings);
        info!(
            entities = scene.len(),
            cell_size = scene.spatial_index().cell_size(),
            "载入场景"
        );
        self.levels.replace_current_scene(scene);
        self.reset_editing_state();
        if let Err(err) = self.fit_to_view() {
            debug!(error = %err, "视口未就绪，稍后再缩放到全图");
        }
        self.emit(EditorEvent::SceneChanged);
        self.invalidate(DirtyFlags::ALL);
    }

    /// 导入失败：原样转交给宿主。
    pub fn report_parse_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(error = %message, "场景解析失败");
        self.emit(EditorEvent::ParseFailed(message));
    }

    pub fn add_level(&mut self, name: impl Into<String>, mut scene: Scene) -> usize {
        scene.set_index_settings(self.index_settings);
        self.levels.add_level(Level::new(name, scene))
    }

    /// 切换当前楼层。命令历史只对应一个场景，切换后清空。
    pub fn switch_level(&mut self, index: usize) -> Result<(), EngineError> {
        if index == self.levels.current_index() {
            return Ok(());
        }
        if !self.levels.switch_to(index) {
            return Err(EngineError::LevelNotFound(index));
        }
        info!(level = index, name = %self.levels.current().name, "切换楼层");
        self.reset_editing_state();
        self.emit(EditorEvent::LevelSwitched(index));
        self.emit(EditorEvent::SceneChanged);
        self.invalidate(DirtyFlags::ALL);
        Ok(())
    }

    fn reset_editing_state(&mut self) {
        self.history.clear();
        self.grips.reset();
        self.drag_select = None;
        self.hover_snap = None;
        let ctx = self.tool_context();
        let _ = self.tools.handle(ToolInput::Cancel, &ctx);
        if self.selection.clear() {
            self.emit(EditorEvent::SelectionChanged(Vec::new()));
        }
    }
}

fn created_entities(command: &SceneCommand) -> Vec<EntityId> {
    match command {
        SceneCommand::AddEntity(add) => add.assigned.into_iter().collect(),
        SceneCommand::InsertEntity(insert) => vec![insert.entity.id],
        SceneCommand::Batch(batch) => batch.commands.iter().flat_map(created_entities).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxv_core::document::{EntityDraft, Geometry, Line};

    fn session() -> EditorSession {
        let mut session = EditorSession::new(&AppConfig::default());
        session.resize(800.0, 600.0).unwrap();
        session
    }

    fn add_line(session: &mut EditorSession, x0: f64, y0: f64, x1: f64, y1: f64) -> EntityId {
        session
            .execute(crate::commands::AddEntity::new(EntityDraft::new(
                "0",
                Geometry::Line(Line {
                    start: Point2::new(x0, y0),
                    end: Point2::new(x1, y1),
                }),
            )))
            .unwrap();
        session.scene().entity_ids().last().unwrap()
    }

    fn screen(session: &EditorSession, x: f64, y: f64) -> Point2 {
        session.transform().world_to_screen(Point2::new(x, y)).unwrap()
    }

    #[test]
    fn delete_selection_is_atomic_and_purges() {
        let mut session = session();
        let a = add_line(&mut session, 0.0, 0.0, 10.0, 0.0);
        let b = add_line(&mut session, 0.0, 5.0, 10.0, 5.0);
        session.drain_events();
        session.select_all();
        assert!(session.delete_selection().unwrap());
        assert!(session.scene().is_empty());
        assert!(session.selection().is_empty());
        assert_eq!(session.history().undo_len(), 3);
        session.undo().unwrap();
        assert!(session.scene().contains(a) && session.scene().contains(b));
        let events = session.drain_events();
        assert!(events.contains(&EditorEvent::SelectionChanged(Vec::new())));
    }

    #[test]
    fn rejected_command_is_reported() {
        let mut session = session();
        let err = session
            .execute(MoveEntities::new([EntityId::new(42)], Vector2::new(1.0, 0.0)))
            .unwrap_err();
        assert!(matches!(err, CommandError::EntityNotFound(42)));
        assert!(matches!(
            session.drain_events().as_slice(),
            [EditorEvent::CommandRejected { command: "move_entities", .. }]
        ));
        assert_eq!(session.history().undo_len(), 0);
    }

    #[test]
    fn drawing_with_tool_creates_entity() {
        let mut session = session();
        session.snap_engine_mut().set_mask(crate::snap::SnapMask::NONE);
        session.arm_tool(ToolKind::Line);
        let start = screen(&session, 0.0, 0.0);
        let end = screen(&session, 10.0, 0.0);
        session.pointer_down(start, Modifiers::default());
        session.pointer_move(end);
        session.pointer_down(end, Modifiers::default());
        assert_eq!(session.scene().len(), 1);
        let events = session.drain_events();
        assert!(matches!(events.first(), Some(EditorEvent::EntityCreated(_))));
    }

    #[test]
    fn window_drag_selects() {
        let mut session = session();
        let inside = add_line(&mut session, 1.0, 1.0, 5.0, 1.0);
        add_line(&mut session, 15.0, 1.0, 40.0, 1.0);
        let start = screen(&session, 0.0, 20.0);
        let end = screen(&session, 20.0, 0.0);
        session.pointer_down(start, Modifiers::default());
        session.pointer_move(end);
        session.pointer_up(end, Modifiers::default());
        assert_eq!(session.selection().to_vec(), vec![inside]);
    }

    #[test]
    fn escape_cancels_grip_drag_without_mutation() {
        let mut session = session();
        let id = add_line(&mut session, 0.0, 0.0, 10.0, 0.0);
        session.select_entity(id, false).unwrap();
        let before = session.scene().clone();
        let grip = screen(&session, 10.0, 0.0);
        session.pointer_down(grip, Modifiers::default());
        assert!(session.grips().is_dragging());
        session.pointer_move(screen(&session, 30.0, 30.0));
        session.key(Key::Escape);
        assert!(!session.grips().is_dragging());
        assert_eq!(session.scene(), &before);
    }

    #[test]
    fn switching_levels_resets_history() {
        let mut session = session();
        add_line(&mut session, 0.0, 0.0, 10.0, 0.0);
        let second = session.add_level("Level 2", Scene::new());
        session.switch_level(second).unwrap();
        assert!(session.scene().is_empty());
        assert!(!session.history().can_undo());
        let carried = session.drain_journal();
        assert_eq!(carried.len(), 1);
        assert!(session.history().journal().is_empty());
        add_line(&mut session, 0.0, 0.0, 5.0, 5.0);
        let next = session.drain_journal();
        assert!(next[0].id > carried[0].id);
        assert!(matches!(
            session.switch_level(9),
            Err(EngineError::LevelNotFound(9))
        ));
    }

    #[test]
    fn session_changes_wake_the_scheduler() {
        use crate::scheduler::{FrameInfo, Priority};
        use std::time::Instant;

        let mut scheduler = FrameScheduler::default();
        let mut session = session();
        let signals = session.connect(&scheduler);
        scheduler.register_flag("background", Priority::Background, &signals.background, |_: &FrameInfo| {});
        scheduler.register_flag("entities", Priority::Entities, &signals.entities, |_: &FrameInfo| {});
        scheduler.register_flag("overlays", Priority::Overlays, &signals.overlays, |_: &FrameInfo| {});

        let now = Instant::now();
        assert_eq!(scheduler.tick(now).rendered.len(), 3);
        assert!(scheduler.tick(now).is_idle());

        session.select_all();
        let report = scheduler.tick(now);
        assert_eq!(report.rendered.len(), 0);
        add_line(&mut session, 0.0, 0.0, 4.0, 4.0);
        assert_eq!(scheduler.tick(now).rendered.len(), 2);
    }

    #[test]
    fn parse_errors_pass_through_verbatim() {
        let mut session = session();
        session.report_parse_error("line 3: unexpected token");
        assert_eq!(
            session.drain_events(),
            vec![EditorEvent::ParseFailed("line 3: unexpected token".into())]
        );
    }
}
