use std::env;
use std::path::PathBuf;

use dxv_config::AppConfig;
use dxv_core::document::{
    Arc, Circle, Color, Dimension, EntityDraft, EntityId, Geometry, Layer, Line, Polyline,
    Rectangle, Scene, SceneError, Text, Units,
};
use dxv_core::geometry::Point2;
use dxv_io::{ImportTask, JsonSceneParser};
use tracing::{info, warn};

/// 覆盖配置中场景路径的环境变量。
pub const SCENE_ENV: &str = "DXV_SCENE";

/// 文档来源，便于前端呈现加载信息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Snapshot(PathBuf),
    Demo,
}

/// 内置示例中各图元的 ID。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoEntities {
    pub baseline: EntityId,
    pub circle: EntityId,
    pub arc: EntityId,
    pub outline: EntityId,
    pub room: EntityId,
    pub dimension: EntityId,
    pub label: EntityId,
}

/// 统一封装加载后的场景与元信息。
#[derive(Debug)]
pub struct LoadedScene {
    pub scene: Scene,
    pub source: DocumentSource,
    pub demo_entities: Option<DemoEntities>,
    /// 快照加载失败时的原始错误信息。
    pub failure: Option<String>,
}

/// `DXV_SCENE` 优先于配置文件中的 `frontend.scene_path`。
pub fn resolve_scene_path(config: &AppConfig) -> Option<PathBuf> {
    env::var_os(SCENE_ENV)
        .map(PathBuf::from)
        .or_else(|| config.frontend.scene_path.clone())
}

/// 加载快照；未指定或失败时回退到内置示例。
pub fn load_from(path: Option<PathBuf>) -> Result<LoadedScene, SceneError> {
    let mut failure = None;
    if let Some(path) = path {
        match ImportTask::spawn_file(JsonSceneParser, path.clone()).wait() {
            Ok(scene) => {
                info!(path = %path.display(), entities = scene.len(), "从快照加载场景成功");
                return Ok(LoadedScene {
                    scene,
                    source: DocumentSource::Snapshot(path),
                    demo_entities: None,
                    failure: None,
                });
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "加载快照失败，回退到内置示例");
                failure = Some(err.to_string());
            }
        }
    }

    let (scene, ids) = demo_scene()?;
    Ok(LoadedScene {
        scene,
        source: DocumentSource::Demo,
        demo_entities: Some(ids),
        failure,
    })
}

/// 一张小平面图：墙线、柱、门弧、房间轮廓、标注与说明文字。
pub fn demo_scene() -> Result<(Scene, DemoEntities), SceneError> {
    let mut scene = Scene::new();
    scene.set_units(Units::Millimeters);
    scene.add_layer(Layer::new("walls").with_color(Color::rgb(0xE0, 0xE0, 0xE0)))?;
    scene.add_layer(Layer::new("annotations").with_color(Color::rgb(0x4F, 0xC3, 0xF7)))?;

    let baseline = scene.add_entity(EntityDraft::new(
        "walls",
        Geometry::Line(Line {
            start: Point2::new(0.0, 0.0),
            end: Point2::new(400.0, 0.0),
        }),
    ))?;
    let circle = scene.add_entity(EntityDraft::new(
        "walls",
        Geometry::Circle(Circle {
            center: Point2::new(200.0, 150.0),
            radius: 20.0,
        }),
    ))?;
    let arc = scene.add_entity(EntityDraft::new(
        "walls",
        Geometry::Arc(Arc {
            center: Point2::new(400.0, 0.0),
            radius: 80.0,
            start_angle: std::f64::consts::FRAC_PI_2,
            end_angle: std::f64::consts::PI,
        }),
    ))?;
    let outline = scene.add_entity(EntityDraft::new(
        "walls",
        Geometry::Polyline(Polyline::from_points(
            [
                Point2::new(0.0, 0.0),
                Point2::new(0.0, 300.0),
                Point2::new(400.0, 300.0),
                Point2::new(400.0, 80.0),
            ],
            false,
        )),
    ))?;
    let room = scene.add_entity(EntityDraft::new(
        "0",
        Geometry::Rectangle(Rectangle {
            first: Point2::new(40.0, 40.0),
            second: Point2::new(160.0, 120.0),
        }),
    ))?;
    let dimension = scene.add_entity(EntityDraft::new(
        "annotations",
        Geometry::Dimension(Dimension {
            start: Point2::new(0.0, 0.0),
            end: Point2::new(400.0, 0.0),
            offset: -40.0,
            text: None,
        }),
    ))?;
    let label = scene.add_entity(EntityDraft::new(
        "annotations",
        Geometry::Text(Text {
            insert: Point2::new(60.0, 200.0),
            content: "Living room".to_string(),
            height: 12.0,
            rotation: 0.0,
        }),
    ))?;

    Ok((
        scene,
        DemoEntities {
            baseline,
            circle,
            arc,
            outline,
            room,
            dimension,
            label,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxv_io::{JsonSnapshotStore, SceneSaver};

    #[test]
    fn demo_scene_is_valid() {
        let (scene, ids) = demo_scene().unwrap();
        assert_eq!(scene.len(), 7);
        assert!(scene.contains(ids.label));
        assert!(scene.layer("walls").is_some());
        for entity in scene.entities() {
            assert!(entity.geometry.validate().is_ok(), "{:?}", entity.geometry);
        }
    }

    #[test]
    fn snapshot_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        let (scene, _) = demo_scene().unwrap();
        JsonSnapshotStore::new().save(&scene, &path).unwrap();

        let loaded = load_from(Some(path.clone())).unwrap();
        assert_eq!(loaded.source, DocumentSource::Snapshot(path));
        assert_eq!(loaded.scene, scene);
        assert!(loaded.demo_entities.is_none());
        assert!(loaded.failure.is_none());
    }

    #[test]
    fn unreadable_snapshot_falls_back_to_demo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ \"layers\": ").unwrap();

        let loaded = load_from(Some(path)).unwrap();
        assert_eq!(loaded.source, DocumentSource::Demo);
        assert!(loaded.demo_entities.is_some());
        assert!(loaded.failure.unwrap().starts_with("line "));
    }
}
