use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use dxv_config::AppConfig;
use dxv_core::document::{EntityId, Geometry, Scene};
use dxv_core::geometry::Point2;
use dxv_engine::dispatch::{ActionBus, ActionRequest, ActionResponse};
use dxv_engine::render::FrameStats;
use dxv_engine::scheduler::{FrameInfo, FrameScheduler, Priority, SchedulerSettings, TickReport};
use dxv_engine::session::Modifiers;
use dxv_engine::{EditorEvent, EditorSession};
use dxv_io::{
    ExportProfile, ExportSelection, ExportSettings, ExportStats, ExportStatus, JsonSceneEncoder,
    export_scene,
};
use tracing::{info, warn};

use crate::errors::FrontendError;
use crate::loader::{DemoEntities, DocumentSource, load_from, resolve_scene_path};

/// 导出演示的摘要。
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub filename: String,
    pub status: ExportStatus,
    pub stats: ExportStats,
    pub bytes: usize,
}

/// 一次脚本化会话的结果，供打印与测试使用。
#[derive(Debug, Clone)]
pub struct DemoReport {
    pub source: DocumentSource,
    pub demo_entities: Option<DemoEntities>,
    pub available_actions: Vec<&'static str>,
    pub actions: Vec<(String, ActionResponse)>,
    pub drawn: Option<EntityId>,
    pub window_selection: Vec<EntityId>,
    pub scene: Scene,
    pub scale: f64,
    pub center: Point2,
    pub frame_commands: usize,
    pub frame_stats: FrameStats,
    pub tick: TickReport,
    pub rendered_passes: Vec<&'static str>,
    pub undo_len: usize,
    pub journal_len: usize,
    pub export: ExportSummary,
    pub events: Vec<EditorEvent>,
}

/// 加载场景后执行一段固定的编辑脚本：绘制、撤销重做、框选、夹点拖动、导出。
///
/// `scene` 显式指定快照路径，优先于 `DXV_SCENE` 与配置。
pub fn run_demo(config: &AppConfig, scene: Option<PathBuf>) -> Result<DemoReport, FrontendError> {
    let loaded = load_from(scene.or_else(|| resolve_scene_path(config)))?;
    let mut session = EditorSession::new(config);
    session.resize(config.frontend.viewport_width, config.frontend.viewport_height)?;
    if let Some(message) = loaded.failure {
        session.report_parse_error(message);
    }
    session.load_scene(loaded.scene);

    let mut scheduler = FrameScheduler::new(SchedulerSettings::from(&config.scheduler));
    let signals = session.connect(&scheduler);
    let rendered = Rc::new(RefCell::new(Vec::new()));
    let mut handles = Vec::new();
    for (name, priority, flag) in [
        ("background", Priority::Background, &signals.background),
        ("entities", Priority::Entities, &signals.entities),
        ("overlays", Priority::Overlays, &signals.overlays),
    ] {
        let log = Rc::clone(&rendered);
        handles.push(scheduler.register_flag(name, priority, flag, move |_: &FrameInfo| {
            log.borrow_mut().push(name);
        }));
    }

    let bus = ActionBus::new();
    let available_actions: Vec<&'static str> = bus.available_actions().collect();
    let mut actions = Vec::new();
    let mut events = Vec::new();

    run_actions(&bus, &mut session, &["fit_to_view", "toggle_snap grid", "draw line"], &mut actions);
    let start = session.transform().world_to_screen(Point2::new(0.0, 300.0))?;
    let end = session.transform().world_to_screen(Point2::new(200.0, 260.0))?;
    for point in [start, end] {
        session.pointer_move(point);
        session.pointer_down(point, Modifiers::default());
    }
    let created = session.drain_events();
    let drawn = created.iter().find_map(|event| match event {
        EditorEvent::EntityCreated(id) => Some(*id),
        _ => None,
    });
    events.extend(created);
    run_actions(&bus, &mut session, &["undo", "redo"], &mut actions);

    let mut window_selection = Vec::new();
    if let Some(ids) = loaded.demo_entities {
        window_selection = window_select(
            &mut session,
            Point2::new(30.0, 30.0),
            Point2::new(170.0, 130.0),
        )?;
        drag_baseline_start(&mut session, ids.baseline)?;
    }
    events.extend(session.drain_events());

    let tick = scheduler.tick(Instant::now());
    if tick.is_idle() {
        warn!("调度器本帧没有需要重绘的通道");
    }
    let frame = session.render()?;

    let settings = ExportSettings {
        profile: ExportProfile::Basic,
        name: Some("dxv-demo".to_string()),
        ..ExportSettings::default()
    };
    let outcome = export_scene(
        session.scene(),
        &settings,
        &ExportSelection::default(),
        &JsonSceneEncoder { pretty: true },
    )?;
    let export = ExportSummary {
        filename: outcome.filename,
        status: outcome.status,
        stats: outcome.stats,
        bytes: outcome.bytes.len(),
    };

    let scene = session.scene().clone();
    info!(
        entities = scene.len(),
        layers = scene.layers().count(),
        blocks = scene.blocks().count(),
        "CLI 演示场景统计"
    );
    let rendered_passes = rendered.borrow().clone();
    drop(handles);
    let journal = session.drain_journal();

    Ok(DemoReport {
        source: loaded.source,
        demo_entities: loaded.demo_entities,
        available_actions,
        actions,
        drawn,
        window_selection,
        scale: session.transform().scale(),
        center: session.transform().center()?,
        frame_commands: frame.len(),
        frame_stats: frame.stats,
        tick,
        rendered_passes,
        undo_len: session.history().undo_len(),
        journal_len: journal.len(),
        export,
        events,
        scene,
    })
}

fn run_actions(
    bus: &ActionBus,
    session: &mut EditorSession,
    lines: &[&str],
    log: &mut Vec<(String, ActionResponse)>,
) {
    for line in lines {
        let Some(request) = ActionRequest::parse(line) else {
            continue;
        };
        let response = bus.dispatch(&request, session);
        if !response.success {
            warn!(action = %line, message = ?response.message, "CLI 动作执行失败");
        }
        log.push((line.to_string(), response));
    }
}

/// 自左向右拖出窗口框，返回选中结果。
fn window_select(
    session: &mut EditorSession,
    from: Point2,
    to: Point2,
) -> Result<Vec<EntityId>, FrontendError> {
    let start = session.transform().world_to_screen(from)?;
    let end = session.transform().world_to_screen(to)?;
    session.pointer_down(start, Modifiers::default());
    session.pointer_move(end);
    session.pointer_up(end, Modifiers::default());
    Ok(session.selection().to_vec())
}

/// 选中基线并把起点夹点向左拖动 20 个单位。
fn drag_baseline_start(session: &mut EditorSession, baseline: EntityId) -> Result<(), FrontendError> {
    if let Err(err) = session.select_entity(baseline, false) {
        warn!(error = %err, "基线不存在，跳过夹点演示");
        return Ok(());
    }
    let grip = session.transform().world_to_screen(Point2::new(0.0, 0.0))?;
    let target = session.transform().world_to_screen(Point2::new(-20.0, 0.0))?;
    session.pointer_move(grip);
    session.pointer_down(grip, Modifiers::default());
    session.pointer_move(target);
    session.pointer_up(target, Modifiers::default());
    Ok(())
}

pub fn print_report(report: &DemoReport) {
    println!("DXV 编辑器核心 CLI 演示");
    println!("支持的动作: {}", report.available_actions.join(", "));
    match &report.source {
        DocumentSource::Snapshot(path) => println!("已从快照加载场景：{}", path.display()),
        DocumentSource::Demo => {
            println!("已构建内置示例场景");
            if let Some(ids) = &report.demo_entities {
                println!("  - 基线 ID = {}", ids.baseline);
                println!("  - 柱 ID = {}", ids.circle);
                println!("  - 门弧 ID = {}", ids.arc);
                println!("  - 房间 ID = {}", ids.room);
                println!("  - 说明文字 ID = {}", ids.label);
            }
        }
    }

    for (line, response) in &report.actions {
        let status = if response.success { "成功" } else { "失败" };
        match &response.message {
            Some(message) => println!("> {line}: {status}（{message}）"),
            None => println!("> {line}: {status}"),
        }
    }
    match report.drawn {
        Some(id) => println!("新绘制线段 {id}"),
        None => println!("未能绘制线段"),
    }
    if report.window_selection.is_empty() {
        println!("窗口框选未选中实体");
    } else {
        let ids: Vec<String> = report.window_selection.iter().map(|id| id.to_string()).collect();
        println!("窗口框选结果：{}", ids.join(", "));
    }
    for event in &report.events {
        if let EditorEvent::CommandRejected { command, message } = event {
            println!("命令 {command} 被拒绝：{message}");
        }
    }

    println!(
        "视图中心=({:.2}, {:.2}), 缩放={:.3}",
        report.center.x(),
        report.center.y(),
        report.scale
    );
    let frame = report
        .tick
        .frame
        .map_or_else(|| "-".to_string(), |frame| frame.to_string());
    println!(
        "帧 #{frame}：绘制命令 {} 条（背景 {} / 实体 {} / 覆盖 {}），裁剪 {} 个实体，重绘通道 [{}]",
        report.frame_commands,
        report.frame_stats.background,
        report.frame_stats.entities,
        report.frame_stats.overlays,
        report.frame_stats.culled,
        report.rendered_passes.join(", ")
    );
    println!(
        "可撤销 {} 步，日志 {} 条",
        report.undo_len, report.journal_len
    );

    println!("当前图层：");
    for layer in report.scene.layers() {
        println!(
            "  - {} (颜色 {}, 可见: {}, 锁定: {})",
            layer.name, layer.color.to_hex(), layer.is_visible, layer.is_locked
        );
    }
    println!("当前实体：");
    for entity in report.scene.entities() {
        println!(
            "  - {} {}, Layer={}",
            entity.id,
            describe(&entity.geometry),
            entity.layer
        );
    }

    let status = match report.export.status {
        ExportStatus::Success => "完整",
        ExportStatus::Partial => "部分",
    };
    println!(
        "导出 {}（{status}）：{} / {} 个实体，跳过 {}，校验失败 {}，{} 字节",
        report.export.filename,
        report.export.stats.exported_entities,
        report.export.stats.total_entities,
        report.export.stats.skipped_entities,
        report.export.stats.failed_entities,
        report.export.bytes
    );
}

fn describe(geometry: &Geometry) -> String {
    match geometry {
        Geometry::Line(line) => format!(
            "线段 起点=({:.2}, {:.2}) 终点=({:.2}, {:.2})",
            line.start.x(),
            line.start.y(),
            line.end.x(),
            line.end.y()
        ),
        Geometry::Circle(circle) => format!(
            "圆 圆心=({:.2}, {:.2}) 半径={:.2}",
            circle.center.x(),
            circle.center.y(),
            circle.radius
        ),
        Geometry::Arc(arc) => format!(
            "圆弧 圆心=({:.2}, {:.2}) 半径={:.2} 起始角={:.1}° 结束角={:.1}°",
            arc.center.x(),
            arc.center.y(),
            arc.radius,
            arc.start_angle.to_degrees(),
            arc.end_angle.to_degrees()
        ),
        Geometry::Ellipse(ellipse) => format!(
            "椭圆 圆心=({:.2}, {:.2}) 比例={:.3}",
            ellipse.center.x(),
            ellipse.center.y(),
            ellipse.ratio
        ),
        Geometry::Polyline(polyline) => format!(
            "多段线 顶点 {} 个{}",
            polyline.vertices.len(),
            if polyline.is_closed { "（闭合）" } else { "" }
        ),
        Geometry::Rectangle(rect) => {
            let bounds = rect.bounds();
            format!("矩形 {:.2} × {:.2}", bounds.width(), bounds.height())
        }
        Geometry::Point(point) => format!(
            "点 ({:.2}, {:.2})",
            point.position.x(),
            point.position.y()
        ),
        Geometry::Text(text) => format!("文字 \"{}\" 字高={:.2}", text.content, text.height),
        Geometry::Spline(spline) => format!(
            "样条 阶数={} 控制点 {} 个",
            spline.degree,
            spline.control_points.len()
        ),
        Geometry::Dimension(dimension) => format!(
            "标注 测量值={:.2}",
            dimension.start.distance_to(dimension.end)
        ),
        Geometry::BlockReference(reference) => format!(
            "块参照 {:?} 插入点=({:.2}, {:.2})",
            reference.block,
            reference.insert.x(),
            reference.insert.y()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxv_core::document::Line;

    fn demo_report() -> DemoReport {
        let mut config = AppConfig::default();
        config.frontend.scene_path = None;
        run_demo(&config, None).expect("demo runs")
    }

    #[test]
    fn scripted_session_draws_and_selects() {
        let report = demo_report();
        if report.source != DocumentSource::Demo {
            return;
        }
        let ids = report.demo_entities.unwrap();
        let drawn = report.drawn.expect("line drawn");
        assert!(report.scene.contains(drawn));
        assert!(matches!(
            report.scene.entity(drawn).map(|e| &e.geometry),
            Some(Geometry::Line(_))
        ));
        assert_eq!(report.window_selection, vec![ids.room]);
        assert!(report.actions.iter().all(|(_, response)| response.success));
    }

    #[test]
    fn grip_drag_moves_baseline_start() {
        let report = demo_report();
        let Some(ids) = report.demo_entities else {
            return;
        };
        let baseline = report.scene.entity(ids.baseline).unwrap();
        let Geometry::Line(Line { start, end }) = &baseline.geometry else {
            panic!("baseline is a line");
        };
        assert!((start.x() + 20.0).abs() < 1e-6);
        assert!((end.x() - 400.0).abs() < 1e-6);
    }

    #[test]
    fn report_includes_frame_and_export() {
        let report = demo_report();
        assert!(report.frame_commands > 0);
        assert!(report.rendered_passes.contains(&"entities"));
        assert!(report.journal_len >= report.undo_len);
        assert!(report.export.bytes > 0);
        assert!(report.export.filename.ends_with("_basic.json"));
    }
}
