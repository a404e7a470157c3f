use std::fs;

use dxv_core::document::{
    Arc, BlockReference, Circle, EntityDraft, Geometry, Layer, Line, Scene, SceneError, Units,
};
use dxv_core::geometry::{Point2, Vector2};
use dxv_io::{
    ImportTask, IoError, JsonSceneEncoder, JsonSceneParser, JsonSnapshotStore, SceneEncoder,
    SceneLoader, SceneParser, SceneSaver, load_scene,
};
use serde_json::{Value, json};

fn sample_scene() -> Scene {
    let mut scene = Scene::new();
    scene.set_units(Units::Millimeters);
    scene.add_layer(Layer::new("walls")).unwrap();
    scene
        .add_entity(EntityDraft::new(
            "walls",
            Geometry::Line(Line {
                start: Point2::new(0.0, 0.0),
                end: Point2::new(100.0, 0.0),
            }),
        ))
        .unwrap();
    scene
        .add_entity(EntityDraft::new(
            "0",
            Geometry::Arc(Arc {
                center: Point2::new(50.0, 50.0),
                radius: 10.0,
                start_angle: 0.0,
                end_angle: 1.5,
            }),
        ))
        .unwrap();
    let block = scene
        .add_block(
            "door",
            Point2::ORIGIN,
            vec![EntityDraft::new(
                "walls",
                Geometry::Circle(Circle {
                    center: Point2::new(1.0, 1.0),
                    radius: 1.0,
                }),
            )],
        )
        .unwrap();
    scene
        .add_entity(EntityDraft::new(
            "0",
            Geometry::BlockReference(BlockReference {
                block,
                insert: Point2::new(20.0, 20.0),
                scale: Vector2::new(1.0, 1.0),
                rotation: 0.0,
            }),
        ))
        .unwrap();
    scene
}

#[test]
fn snapshot_round_trip_through_disk() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("plan.json");
    let scene = sample_scene();

    JsonSnapshotStore::new().save(&scene, &path).expect("save");
    let loaded = load_scene(&path).expect("load");
    assert_eq!(loaded, scene);
    assert_eq!(loaded.next_entity_id(), scene.next_entity_id());
    assert!(loaded.bounds().is_some());
    assert!(!dir.path().join("plan.json.partial").exists());
}

#[test]
fn encoding_is_deterministic() {
    let scene = sample_scene();
    let encoder = JsonSceneEncoder::default();
    let first = encoder.encode(&scene).unwrap();
    let second = encoder.encode(&scene.snapshot()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn missing_and_corrupt_files_are_typed_errors() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let missing = dir.path().join("absent.json");
    assert!(matches!(
        JsonSnapshotStore::new().load(&missing),
        Err(IoError::ReadError { .. })
    ));

    let corrupt = dir.path().join("corrupt.json");
    fs::write(&corrupt, "{ not json").unwrap();
    assert!(matches!(
        load_scene(&corrupt),
        Err(IoError::Serialization { .. })
    ));

    let dxf = dir.path().join("plan.dxf");
    fs::write(&dxf, "0\nEOF\n").unwrap();
    assert!(matches!(load_scene(&dxf), Err(IoError::UnsupportedFeature(_))));
}

#[test]
fn background_import_from_file() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("plan.json");
    let scene = sample_scene();
    JsonSnapshotStore::new().save(&scene, &path).unwrap();

    let task = ImportTask::spawn_file(JsonSceneParser, &path);
    assert_eq!(task.wait().unwrap(), scene);

    let failing = ImportTask::spawn_file(JsonSceneParser, dir.path().join("nope.json"));
    let err = failing.wait().unwrap_err();
    assert!(err.to_string().starts_with("cannot read"));
}

fn tampered_snapshot(edit: impl FnOnce(&mut Value)) -> Vec<u8> {
    let mut value = serde_json::to_value(sample_scene()).unwrap();
    edit(&mut value);
    serde_json::to_vec(&value).unwrap()
}

fn rejection(bytes: &[u8]) -> String {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("plan.json");
    fs::write(&path, bytes).unwrap();
    match JsonSnapshotStore::new().load(&path) {
        Err(IoError::Serialization { source, .. }) => {
            assert!(source.is_data(), "{source}");
            source.to_string()
        }
        other => panic!("snapshot should be rejected: {other:?}"),
    }
}

#[test]
fn duplicate_entity_ids_are_rejected() {
    let bytes = tampered_snapshot(|value| {
        let entities = value["entities"].as_array_mut().unwrap();
        let first = entities[0].clone();
        entities.push(first);
    });
    let message = rejection(&bytes);
    assert!(message.starts_with("entity with id"), "{message}");
    assert!(message.contains("already exists"), "{message}");

    let err = JsonSceneParser.parse(&bytes).unwrap_err();
    assert!(err.message().contains("already exists"));
}

#[test]
fn degenerate_geometry_is_rejected() {
    let bytes = tampered_snapshot(|value| {
        let geometry = &mut value["entities"][0]["geometry"];
        geometry["end"] = geometry["start"].clone();
    });
    let message = rejection(&bytes);
    assert!(message.starts_with("invalid geometry"), "{message}");
}

#[test]
fn exhausted_and_dangling_ids_are_rejected() {
    let bytes = tampered_snapshot(|value| {
        value["entities"][0]["id"] = json!(u64::MAX);
    });
    let message = rejection(&bytes);
    assert!(message.contains(&SceneError::IdExhausted("entity").to_string()), "{message}");

    let bytes = tampered_snapshot(|value| {
        value["blocks"] = json!([]);
    });
    let message = rejection(&bytes);
    assert!(message.starts_with("block with id"), "{message}");
}

#[test]
fn failed_rename_leaves_no_staging_file() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("plan.json");
    fs::create_dir(&path).unwrap();
    fs::write(path.join("keep"), "occupied").unwrap();

    let err = JsonSnapshotStore::new().save(&sample_scene(), &path).unwrap_err();
    assert!(matches!(err, IoError::WriteError { .. }));
    assert!(!dir.path().join("plan.json.partial").exists());
    assert!(path.join("keep").exists());
}
