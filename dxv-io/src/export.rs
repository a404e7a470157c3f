//! 导出准备：按图层设置与筛选条件生成场景快照，预先校验并统计。
//!
//! 这里只处理“导出哪些内容、落在哪个图层”，字节格式由 [`SceneEncoder`] 决定。

use std::collections::{BTreeMap, BTreeSet};

use dxv_core::document::{DEFAULT_LAYER, EntityId, Geometry, Layer, Scene};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::snapshot::SceneEncoder;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to encode scene: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("no entity can be exported ({failed} failed validation)")]
    NothingExportable { failed: usize },
    #[error("invalid export settings: {0}")]
    InvalidSettings(String),
}

/// 目标格式能力档位。`Basic` 只接受最基本的图元。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportProfile {
    Basic,
    #[default]
    Full,
}

impl ExportProfile {
    pub fn name(self) -> &'static str {
        match self {
            ExportProfile::Basic => "basic",
            ExportProfile::Full => "full",
        }
    }

    pub fn supports(self, geometry: &Geometry) -> bool {
        match self {
            ExportProfile::Full => true,
            ExportProfile::Basic => matches!(
                geometry,
                Geometry::Line(_)
                    | Geometry::Polyline(_)
                    | Geometry::Circle(_)
                    | Geometry::Arc(_)
                    | Geometry::Text(_)
                    | Geometry::Point(_)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub profile: ExportProfile,
    /// 跳过隐藏图层上的实体。
    pub visible_only: bool,
    pub include_locked: bool,
    /// 设置后所有实体合并到该图层。
    pub flatten_to_layer: Option<String>,
    pub layer_mapping: BTreeMap<String, String>,
    pub default_layer: String,
    /// 用于建议文件名。
    pub name: Option<String>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            profile: ExportProfile::default(),
            visible_only: true,
            include_locked: false,
            flatten_to_layer: None,
            layer_mapping: BTreeMap::new(),
            default_layer: DEFAULT_LAYER.to_string(),
            name: None,
        }
    }
}

impl ExportSettings {
    fn target_layer(&self, layer: &str) -> String {
        if let Some(flat) = self.flatten_to_layer.as_deref().filter(|name| !name.is_empty()) {
            return flat.to_string();
        }
        let mapped = self
            .layer_mapping
            .get(layer)
            .map(String::as_str)
            .unwrap_or(layer);
        if mapped.is_empty() {
            self.default_layer.clone()
        } else {
            mapped.to_string()
        }
    }
}

/// 可选的实体与图层筛选，`None` 表示不限。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSelection {
    pub entity_ids: Option<BTreeSet<EntityId>>,
    pub layer_names: Option<BTreeSet<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub total_entities: usize,
    pub exported_entities: usize,
    /// 被筛选条件或图层设置排除的实体。
    pub skipped_entities: usize,
    /// 未通过校验的实体。
    pub failed_entities: usize,
    pub layers_exported: usize,
}

/// 按设置与筛选条件生成待导出的快照。源场景不受影响。
pub fn prepare_export(
    scene: &Scene,
    settings: &ExportSettings,
    selection: &ExportSelection,
) -> Result<(Scene, ExportStats), ExportError> {
    if settings.default_layer.is_empty() {
        return Err(ExportError::InvalidSettings(
            "default_layer must not be empty".to_string(),
        ));
    }
    let mut snapshot = scene.snapshot();
    let mut dropped = Vec::new();
    for entity in scene.entities() {
        let layer = scene.resolve_layer(&entity.layer).ok();
        let keep = selection
            .entity_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&entity.id))
            && selection
                .layer_names
                .as_ref()
                .is_none_or(|names| names.contains(&entity.layer))
            && layer.is_some_and(|layer| {
                (!settings.visible_only || layer.is_visible)
                    && (settings.include_locked || !layer.is_locked)
            });
        if !keep {
            dropped.push(entity.id);
        }
    }
    for id in &dropped {
        if let Err(err) = snapshot.remove_entity(*id) {
            warn!(entity = %id, error = %err, "导出快照移除实体失败");
        }
    }

    let moves: Vec<(EntityId, String, String)> = snapshot
        .entities()
        .map(|entity| {
            (
                entity.id,
                entity.layer.clone(),
                settings.target_layer(&entity.layer),
            )
        })
        .filter(|(_, from, to)| from != to)
        .collect();
    for (id, from, to) in moves {
        if snapshot.layer(&to).is_none() {
            let template = snapshot
                .layer(&from)
                .cloned()
                .unwrap_or_else(|| Layer::new(&to));
            let _ = snapshot.add_layer(Layer {
                name: to.clone(),
                ..template
            });
        }
        if let Err(err) = snapshot.set_entity_layer(id, to) {
            warn!(entity = %id, error = %err, "导出快照改写图层失败");
        }
    }
    snapshot.ensure_layer(
        settings
            .flatten_to_layer
            .as_deref()
            .unwrap_or(settings.default_layer.as_str()),
    );

    let unused: Vec<String> = snapshot
        .layers()
        .map(|layer| layer.name.clone())
        .filter(|name| !snapshot.layer_in_use(name))
        .collect();
    for name in unused {
        let keep = name == DEFAULT_LAYER
            || Some(name.as_str()) == settings.flatten_to_layer.as_deref()
            || name == settings.default_layer;
        if !keep {
            let _ = snapshot.remove_layer(&name);
        }
    }

    let stats = ExportStats {
        total_entities: scene.len(),
        exported_entities: snapshot.len(),
        skipped_entities: dropped.len(),
        failed_entities: 0,
        layers_exported: snapshot.layers().count(),
    };
    debug!(?stats, "导出快照已生成");
    Ok((snapshot, stats))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub code: &'static str,
    pub message: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityValidation {
    pub entity_id: EntityId,
    pub kind: &'static str,
    pub exportable: bool,
    pub issues: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssueSummary {
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// 没有任何错误级问题。
    pub valid: bool,
    pub profile: ExportProfile,
    pub total_entities: usize,
    pub exportable_entities: usize,
    pub entities: Vec<EntityValidation>,
    pub summary: IssueSummary,
}

impl ValidationReport {
    pub fn non_exportable(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities
            .iter()
            .filter(|result| !result.exportable)
            .map(|result| result.entity_id)
    }
}

/// 不生成字节，只检查每个实体能否按目标档位导出。
pub fn validate_scene(scene: &Scene, profile: ExportProfile) -> ValidationReport {
    let mut entities = Vec::with_capacity(scene.len());
    let mut summary = IssueSummary::default();
    for entity in scene.entities() {
        let kind = entity.geometry.kind_name();
        let mut issues = Vec::new();
        if let Err(err) = entity.geometry.validate() {
            issues.push(ValidationIssue {
                severity: IssueSeverity::Error,
                code: "INVALID_GEOMETRY",
                message: err.to_string(),
                suggestion: Some("fix or delete the entity before exporting".to_string()),
            });
        }
        if !profile.supports(&entity.geometry) {
            issues.push(ValidationIssue {
                severity: IssueSeverity::Error,
                code: "PROFILE_INCOMPATIBLE",
                message: format!("`{kind}` is not supported by the {} profile", profile.name()),
                suggestion: Some("export with the full profile".to_string()),
            });
        }
        if let Geometry::BlockReference(reference) = &entity.geometry {
            if scene.block(reference.block).is_none() {
                issues.push(ValidationIssue {
                    severity: IssueSeverity::Warning,
                    code: "UNKNOWN_BLOCK",
                    message: format!("block {} is missing", reference.block.get()),
                    suggestion: None,
                });
            }
        }
        if scene
            .resolve_layer(&entity.layer)
            .is_ok_and(|layer| !layer.is_visible)
        {
            issues.push(ValidationIssue {
                severity: IssueSeverity::Info,
                code: "HIDDEN_LAYER",
                message: format!("layer `{}` is hidden", entity.layer),
                suggestion: Some("skipped unless visible_only is disabled".to_string()),
            });
        }
        for issue in &issues {
            match issue.severity {
                IssueSeverity::Error => summary.errors += 1,
                IssueSeverity::Warning => summary.warnings += 1,
                IssueSeverity::Info => summary.info += 1,
            }
        }
        let exportable = issues
            .iter()
            .all(|issue| issue.severity < IssueSeverity::Warning);
        entities.push(EntityValidation {
            entity_id: entity.id,
            kind,
            exportable,
            issues,
        });
    }
    let exportable_entities = entities.iter().filter(|result| result.exportable).count();
    ValidationReport {
        valid: summary.errors == 0,
        profile,
        total_entities: scene.len(),
        exportable_entities,
        entities,
        summary,
    }
}

/// 由场景名与档位生成安全的文件名，例如 `floor_plan_full.json`。
pub fn suggested_filename(name: Option<&str>, profile: ExportProfile, extension: &str) -> String {
    let safe: String = name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("export")
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{safe}_{}.{extension}", profile.name())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Success,
    /// 部分实体未通过校验被跳过。
    Partial,
}

#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub status: ExportStatus,
    pub bytes: Vec<u8>,
    pub filename: String,
    pub stats: ExportStats,
    pub report: ValidationReport,
}

/// 完整导出流程：筛选、校验、剔除失败实体、编码。
pub fn export_scene(
    scene: &Scene,
    settings: &ExportSettings,
    selection: &ExportSelection,
    encoder: &dyn SceneEncoder,
) -> Result<ExportOutcome, ExportError> {
    let (mut snapshot, mut stats) = prepare_export(scene, settings, selection)?;
    let report = validate_scene(&snapshot, settings.profile);
    let failed: Vec<EntityId> = report.non_exportable().collect();
    for id in &failed {
        let _ = snapshot.remove_entity(*id);
    }
    stats.failed_entities = failed.len();
    stats.exported_entities = snapshot.len();
    if stats.exported_entities == 0 && stats.failed_entities > 0 {
        return Err(ExportError::NothingExportable {
            failed: stats.failed_entities,
        });
    }
    let status = if failed.is_empty() {
        ExportStatus::Success
    } else {
        ExportStatus::Partial
    };
    let bytes = encoder.encode(&snapshot)?;
    let filename = suggested_filename(
        settings.name.as_deref(),
        settings.profile,
        encoder.extension(),
    );
    info!(
        status = ?status,
        exported = stats.exported_entities,
        skipped = stats.skipped_entities,
        failed = stats.failed_entities,
        bytes = bytes.len(),
        "场景导出完成"
    );
    Ok(ExportOutcome {
        status,
        bytes,
        filename,
        stats,
        report,
    })
}
