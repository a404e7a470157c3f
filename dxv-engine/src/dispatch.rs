//! 具名动作总线：菜单、快捷键与脚本会话通过动作名驱动编辑会话。

use std::collections::BTreeMap;

use crate::session::EditorSession;
use crate::snap::SnapKind;
use crate::tools::ToolKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl ActionRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// 解析一行脚本：首个词为动作名，其余为参数。空行返回 `None`。
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let name = words.next()?;
        Some(Self {
            name: name.to_string(),
            args: words.map(str::to_string).collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

pub trait ActionHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(&self, request: &ActionRequest, session: &mut EditorSession) -> ActionResponse;
}

pub struct ActionBus {
    handlers: BTreeMap<&'static str, Box<dyn ActionHandler>>,
}

impl Default for ActionBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionBus {
    /// 预先登记全部内置动作。
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: BTreeMap::new(),
        };
        bus.register(FitToView);
        bus.register(Undo);
        bus.register(Redo);
        bus.register(DeleteSelection);
        bus.register(ClearSelection);
        bus.register(SelectAll);
        bus.register(Zoom { zoom_in: true });
        bus.register(Zoom { zoom_in: false });
        bus.register(ToggleSnap);
        bus.register(ArmTool);
        bus.register(SwitchLevel);
        bus
    }

    pub fn register<H: ActionHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(&self, request: &ActionRequest, session: &mut EditorSession) -> ActionResponse {
        match self.handlers.get(request.name.as_str()) {
            Some(handler) => handler.execute(request, session),
            None => ActionResponse::err(format!("未知动作: {}", request.name)),
        }
    }

    pub fn available_actions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }
}

struct FitToView;

impl ActionHandler for FitToView {
    fn name(&self) -> &'static str {
        "fit_to_view"
    }

    fn execute(&self, _request: &ActionRequest, session: &mut EditorSession) -> ActionResponse {
        match session.fit_to_view() {
            Ok(true) => ActionResponse::ok("视图已缩放到全图"),
            Ok(false) => ActionResponse::ok("场景为空，视图保持不变"),
            Err(err) => ActionResponse::err(err.to_string()),
        }
    }
}

struct Undo;

impl ActionHandler for Undo {
    fn name(&self) -> &'static str {
        "undo"
    }

    fn execute(&self, _request: &ActionRequest, session: &mut EditorSession) -> ActionResponse {
        match session.undo() {
            Ok(true) => ActionResponse::ok("已撤销"),
            Ok(false) => ActionResponse::err("没有可撤销的操作"),
            Err(err) => ActionResponse::err(err.to_string()),
        }
    }
}

struct Redo;

impl ActionHandler for Redo {
    fn name(&self) -> &'static str {
        "redo"
    }

    fn execute(&self, _request: &ActionRequest, session: &mut EditorSession) -> ActionResponse {
        match session.redo() {
            Ok(true) => ActionResponse::ok("已重做"),
            Ok(false) => ActionResponse::err("没有可重做的操作"),
            Err(err) => ActionResponse::err(err.to_string()),
        }
    }
}

struct DeleteSelection;

impl ActionHandler for DeleteSelection {
    fn name(&self) -> &'static str {
        "delete_selection"
    }

    fn execute(&self, _request: &ActionRequest, session: &mut EditorSession) -> ActionResponse {
        let count = session.selection().len();
        match session.delete_selection() {
            Ok(true) => ActionResponse::ok(format!("已删除 {count} 个实体")),
            Ok(false) => ActionResponse::err("当前没有选中实体"),
            Err(err) => ActionResponse::err(err.to_string()),
        }
    }
}

struct ClearSelection;

impl ActionHandler for ClearSelection {
    fn name(&self) -> &'static str {
        "clear_selection"
    }

    fn execute(&self, _request: &ActionRequest, session: &mut EditorSession) -> ActionResponse {
        session.clear_selection();
        ActionResponse::ok("选中集已清空")
    }
}

struct SelectAll;

impl ActionHandler for SelectAll {
    fn name(&self) -> &'static str {
        "select_all"
    }

    fn execute(&self, _request: &ActionRequest, session: &mut EditorSession) -> ActionResponse {
        session.select_all();
        ActionResponse::ok(format!("已选中 {} 个实体", session.selection().len()))
    }
}

struct Zoom {
    zoom_in: bool,
}

impl ActionHandler for Zoom {
    fn name(&self) -> &'static str {
        if self.zoom_in { "zoom_in" } else { "zoom_out" }
    }

    fn execute(&self, _request: &ActionRequest, session: &mut EditorSession) -> ActionResponse {
        let result = if self.zoom_in {
            session.zoom_in()
        } else {
            session.zoom_out()
        };
        match result {
            Ok(scale) => ActionResponse::ok(format!("缩放比例 {scale:.3}")),
            Err(err) => ActionResponse::err(err.to_string()),
        }
    }
}

/// `toggle_snap <策略>`；不带参数时切换全部捕捉。
struct ToggleSnap;

impl ActionHandler for ToggleSnap {
    fn name(&self) -> &'static str {
        "toggle_snap"
    }

    fn execute(&self, request: &ActionRequest, session: &mut EditorSession) -> ActionResponse {
        let snap = session.snap_engine_mut();
        let Some(name) = request.args.first() else {
            let enabled = snap.toggle();
            return ActionResponse::ok(if enabled { "捕捉已开启" } else { "捕捉已关闭" });
        };
        let Some(kind) = SnapKind::from_name(name) else {
            return ActionResponse::err(format!("未知捕捉策略: {name}"));
        };
        let enabled = !snap.mask().contains(kind);
        snap.set_kind_enabled(kind, enabled);
        let state = if enabled { "开启" } else { "关闭" };
        ActionResponse::ok(format!("{} 捕捉已{state}", kind.name()))
    }
}

/// `draw <工具>`，例如 `draw line`。
struct ArmTool;

impl ActionHandler for ArmTool {
    fn name(&self) -> &'static str {
        "draw"
    }

    fn execute(&self, request: &ActionRequest, session: &mut EditorSession) -> ActionResponse {
        let Some(name) = request.args.first() else {
            return ActionResponse::err("缺少工具名");
        };
        let Some(kind) = ToolKind::from_name(name) else {
            return ActionResponse::err(format!("未知工具: {name}"));
        };
        session.arm_tool(kind);
        ActionResponse::ok(format!("{} 工具已就绪", kind.name()))
    }
}

struct SwitchLevel;

impl ActionHandler for SwitchLevel {
    fn name(&self) -> &'static str {
        "switch_level"
    }

    fn execute(&self, request: &ActionRequest, session: &mut EditorSession) -> ActionResponse {
        let Some(index) = request.args.first().and_then(|arg| arg.parse::<usize>().ok()) else {
            return ActionResponse::err("需要楼层序号");
        };
        match session.switch_level(index) {
            Ok(()) => ActionResponse::ok(format!("已切换到 {}", session.levels().current().name)),
            Err(err) => ActionResponse::err(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxv_config::AppConfig;
    use dxv_core::document::{EntityDraft, Geometry, Line, Scene};
    use dxv_core::geometry::Point2;

    fn session() -> EditorSession {
        let mut scene = Scene::new();
        scene
            .add_entity(EntityDraft::new(
                "0",
                Geometry::Line(Line {
                    start: Point2::new(0.0, 0.0),
                    end: Point2::new(10.0, 10.0),
                }),
            ))
            .unwrap();
        let mut session = EditorSession::with_scene(&AppConfig::default(), scene);
        session.resize(400.0, 300.0).unwrap();
        session
    }

    #[test]
    fn select_delete_undo_through_bus() {
        let bus = ActionBus::new();
        let mut session = session();
        let response = bus.dispatch(&ActionRequest::new("select_all"), &mut session);
        assert!(response.success);
        assert_eq!(session.selection().len(), 1);

        assert!(bus.dispatch(&ActionRequest::new("delete_selection"), &mut session).success);
        assert!(session.scene().is_empty());
        assert!(bus.dispatch(&ActionRequest::new("undo"), &mut session).success);
        assert_eq!(session.scene().len(), 1);
        assert!(!bus.dispatch(&ActionRequest::new("delete_selection"), &mut session).success);
    }

    #[test]
    fn unknown_action_and_bad_arguments() {
        let bus = ActionBus::new();
        let mut session = session();
        let response = bus.dispatch(&ActionRequest::new("explode"), &mut session);
        assert_eq!(response, ActionResponse::err("未知动作: explode"));
        assert!(!bus.dispatch(&ActionRequest::new("draw").with_arg("hexagon"), &mut session).success);
        assert!(!bus.dispatch(&ActionRequest::new("switch_level").with_arg("3"), &mut session).success);
    }

    #[test]
    fn toggle_single_snap_kind() {
        let bus = ActionBus::new();
        let mut session = session();
        let before = session.snap_engine().mask().contains(SnapKind::Midpoint);
        let request = ActionRequest::parse("toggle_snap midpoint").unwrap();
        assert!(bus.dispatch(&request, &mut session).success);
        assert_eq!(session.snap_engine().mask().contains(SnapKind::Midpoint), !before);
        assert!(ActionRequest::parse("   ").is_none());
    }

    #[test]
    fn lists_builtin_actions() {
        let bus = ActionBus::new();
        let names: Vec<_> = bus.available_actions().collect();
        assert!(names.contains(&"fit_to_view"));
        assert!(names.contains(&"zoom_out"));
        assert!(names.contains(&"draw"));
    }
}
