use std::collections::VecDeque;

use dxv_config::HistoryConfig;
use dxv_core::document::Scene;
use tracing::{debug, warn};

use super::journal::{Journal, JournalAction, JournalEntry};
use super::{Command, SceneCommand};
use crate::errors::CommandError;

/// 线性撤销/重做历史。
///
/// 撤销栈超过深度时丢弃最早的命令；执行新命令会清空重做栈。
/// 命令失败时场景与两个栈都保持不变。
#[derive(Debug)]
pub struct CommandManager {
    undo_stack: VecDeque<SceneCommand>,
    redo_stack: Vec<SceneCommand>,
    depth: usize,
    journal: Journal,
}

impl Default for CommandManager {
    fn default() -> Self {
        Self::from_config(&HistoryConfig::default())
    }
}

impl CommandManager {
    pub fn new(depth: usize, author: impl Into<String>) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            depth,
            journal: Journal::new(author),
        }
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(config.depth, config.author.clone())
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
        self.evict();
    }

    #[inline]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[inline]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    #[inline]
    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    #[inline]
    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn undo_label(&self) -> Option<&'static str> {
        self.undo_stack.back().map(|command| command.label())
    }

    pub fn redo_label(&self) -> Option<&'static str> {
        self.redo_stack.last().map(|command| command.label())
    }

    /// 最近一次执行或重做的命令（含执行时捕获的状态）。
    pub fn last_command(&self) -> Option<&SceneCommand> {
        self.undo_stack.back()
    }

    #[inline]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// 取走尚未交付的日志条目。
    pub fn drain_journal(&mut self) -> Vec<JournalEntry> {
        self.journal.drain()
    }

    /// 清空历史（例如加载新场景后），日志保留。
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn execute(
        &mut self,
        scene: &mut Scene,
        command: impl Into<SceneCommand>,
    ) -> Result<(), CommandError> {
        let mut command = command.into();
        if let Err(err) = command.execute(scene) {
            warn!(command = command.label(), error = %err, "命令被拒绝");
            return Err(err);
        }
        debug!(
            command = command.label(),
            entities = command.affected_entities().len(),
            "命令已执行"
        );
        self.log(JournalAction::Execute, &command);
        self.undo_stack.push_back(command);
        self.redo_stack.clear();
        self.evict();
        Ok(())
    }

    /// 撤销最近一条命令；历史为空时返回 `Ok(false)`。
    pub fn undo(&mut self, scene: &mut Scene) -> Result<bool, CommandError> {
        let Some(mut command) = self.undo_stack.pop_back() else {
            return Ok(false);
        };
        if let Err(err) = command.undo(scene) {
            warn!(command = command.label(), error = %err, "撤销失败");
            self.undo_stack.push_back(command);
            return Err(err);
        }
        debug!(command = command.label(), "命令已撤销");
        self.log(JournalAction::Undo, &command);
        self.redo_stack.push(command);
        Ok(true)
    }

    pub fn redo(&mut self, scene: &mut Scene) -> Result<bool, CommandError> {
        let Some(mut command) = self.redo_stack.pop() else {
            return Ok(false);
        };
        if let Err(err) = command.execute(scene) {
            warn!(command = command.label(), error = %err, "重做失败");
            self.redo_stack.push(command);
            return Err(err);
        }
        debug!(command = command.label(), "命令已重做");
        self.log(JournalAction::Redo, &command);
        self.undo_stack.push_back(command);
        self.evict();
        Ok(true)
    }

    fn log(&mut self, action: JournalAction, command: &SceneCommand) {
        if let Err(err) = self.journal.record(action, command) {
            warn!(command = command.label(), error = %err, "命令日志写入失败");
        }
    }

    fn evict(&mut self) {
        while self.undo_stack.len() > self.depth {
            if let Some(oldest) = self.undo_stack.pop_front() {
                debug!(command = oldest.label(), depth = self.depth, "历史已满，丢弃最早的命令");
            }
        }
    }
}
