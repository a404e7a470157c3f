//! 命令日志：按顺序记录每次执行、撤销、重做，可从已知快照回放重建场景。
//!
//! 每条记录的 `forward` 是动作完成后的命令（含捕获状态），`inverse` 是对应的逆命令，
//! 编码为 JSON Lines，每行一条。

use chrono::{DateTime, Utc};
use dxv_core::document::Scene;
use serde::{Deserialize, Serialize};

use super::{Command, SceneCommand};
use crate::errors::{CommandError, ReplayError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalAction {
    Execute,
    Undo,
    Redo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub action: JournalAction,
    pub label: String,
    pub forward: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<serde_json::Value>,
}

impl JournalEntry {
    pub fn command(&self) -> Result<SceneCommand, CommandError> {
        Ok(serde_json::from_value(self.forward.clone())?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Journal {
    author: String,
    entries: Vec<JournalEntry>,
    next_id: u64,
}

impl Journal {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            entries: Vec::new(),
            next_id: 1,
        }
    }

    #[inline]
    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = author.into();
    }

    pub fn record(
        &mut self,
        action: JournalAction,
        command: &SceneCommand,
    ) -> Result<&JournalEntry, CommandError> {
        let forward = command.to_value()?;
        let inverse = command
            .inverse()
            .map(|inverse| inverse.to_value())
            .transpose()?;
        let entry = JournalEntry {
            id: self.next_id.max(1),
            timestamp: Utc::now(),
            author: self.author.clone(),
            action,
            label: command.label().to_string(),
            forward,
            inverse,
        };
        self.next_id = entry.id + 1;
        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    #[inline]
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 交出已记录的条目，供外部审计或回放保存。编号继续递增，不会复用。
    pub fn drain(&mut self) -> Vec<JournalEntry> {
        std::mem::take(&mut self.entries)
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        encode_jsonl(&self.entries)
    }
}

pub fn encode_jsonl(entries: &[JournalEntry]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&serde_json::to_string(entry)?);
        out.push('\n');
    }
    Ok(out)
}

/// 解析 JSON Lines，空行忽略；行号从 1 开始计。
pub fn decode_jsonl(text: &str) -> Result<Vec<JournalEntry>, ReplayError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| ReplayError::Decode {
                line: index + 1,
                source,
            })
        })
        .collect()
}

/// 从快照出发按顺序重放日志。执行与重做正向执行，撤销则调用记录中命令的 `undo`。
pub fn replay(snapshot: &Scene, entries: &[JournalEntry]) -> Result<Scene, ReplayError> {
    let mut scene = snapshot.clone();
    for entry in entries {
        let fail = |source| ReplayError::Command {
            entry: entry.id,
            source,
        };
        let mut command = entry.command().map_err(fail)?;
        let applied = match entry.action {
            JournalAction::Execute | JournalAction::Redo => command.execute(&mut scene),
            JournalAction::Undo => command.undo(&mut scene),
        };
        applied.map_err(fail)?;
    }
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{AddEntity, MoveEntities};
    use dxv_core::document::{EntityDraft, Geometry, Point};
    use dxv_core::geometry::{Point2, Vector2};

    fn point_draft(x: f64) -> EntityDraft {
        EntityDraft::new(
            "0",
            Geometry::Point(Point {
                position: Point2::new(x, 0.0),
            }),
        )
    }

    #[test]
    fn entries_carry_author_and_increasing_ids() {
        let mut scene = Scene::new();
        let mut journal = Journal::new("alice");
        let mut command = SceneCommand::from(AddEntity::new(point_draft(1.0)));
        command.execute(&mut scene).unwrap();
        journal.record(JournalAction::Execute, &command).unwrap();
        command.undo(&mut scene).unwrap();
        journal.record(JournalAction::Undo, &command).unwrap();
        let ids: Vec<u64> = journal.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(journal.entries().iter().all(|e| e.author == "alice"));
        assert!(journal.entries()[0].inverse.is_some());
    }

    #[test]
    fn jsonl_round_trip_and_replay() {
        let snapshot = Scene::new();
        let mut scene = snapshot.clone();
        let mut journal = Journal::new("local");

        let mut add = SceneCommand::from(AddEntity::new(point_draft(1.0)));
        add.execute(&mut scene).unwrap();
        journal.record(JournalAction::Execute, &add).unwrap();

        let id = add.affected_entities()[0];
        let mut nudge = SceneCommand::from(MoveEntities::new([id], Vector2::new(0.5, 2.0)));
        nudge.execute(&mut scene).unwrap();
        journal.record(JournalAction::Execute, &nudge).unwrap();
        nudge.undo(&mut scene).unwrap();
        journal.record(JournalAction::Undo, &nudge).unwrap();

        let text = journal.to_jsonl().unwrap();
        assert_eq!(text.lines().count(), 3);
        let decoded = decode_jsonl(&text).unwrap();
        assert_eq!(decoded, journal.entries());
        assert_eq!(replay(&snapshot, &decoded).unwrap(), scene);
        assert_eq!(replay(&snapshot, &decoded[..2]).unwrap().len(), 1);
    }

    #[test]
    fn drained_entries_keep_ids_monotonic() {
        let mut scene = Scene::new();
        let mut journal = Journal::new("local");
        let mut add = SceneCommand::from(AddEntity::new(point_draft(1.0)));
        add.execute(&mut scene).unwrap();
        journal.record(JournalAction::Execute, &add).unwrap();
        add.undo(&mut scene).unwrap();
        journal.record(JournalAction::Undo, &add).unwrap();

        let first = journal.drain();
        assert_eq!(first.len(), 2);
        assert!(journal.is_empty());

        add.execute(&mut scene).unwrap();
        journal.record(JournalAction::Redo, &add).unwrap();
        let second = journal.drain();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, 3);
        assert!(journal.drain().is_empty());

        let all: Vec<JournalEntry> = first.into_iter().chain(second).collect();
        assert_eq!(replay(&Scene::new(), &all).unwrap(), scene);
    }

    #[test]
    fn malformed_line_reports_position() {
        let err = decode_jsonl("\n{not json}\n").unwrap_err();
        assert!(matches!(err, ReplayError::Decode { line: 2, .. }));
    }
}
