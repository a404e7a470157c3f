use dxv_core::document::{EntityId, Layer, Scene};
use serde::{Deserialize, Serialize};

use super::{Command, SceneCommand};
use crate::errors::CommandError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddLayer {
    pub layer: Layer,
}

impl AddLayer {
    pub fn new(layer: Layer) -> Self {
        Self { layer }
    }
}

impl Command for AddLayer {
    fn label(&self) -> &'static str {
        "add_layer"
    }

    fn execute(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        scene.add_layer(self.layer.clone())?;
        Ok(())
    }

    fn undo(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        scene.remove_layer(&self.layer.name)?;
        Ok(())
    }

    fn inverse(&self) -> Option<SceneCommand> {
        Some(RemoveLayer::new(self.layer.name.clone()).into())
    }

    fn affected_entities(&self) -> Vec<EntityId> {
        Vec::new()
    }
}

/// 修改图层的可见、锁定或颜色属性。图层名是键，不可通过本命令改名。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateLayer {
    pub layer: Layer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Layer>,
}

impl UpdateLayer {
    pub fn new(layer: Layer) -> Self {
        Self {
            layer,
            previous: None,
        }
    }
}

impl Command for UpdateLayer {
    fn label(&self) -> &'static str {
        "update_layer"
    }

    fn execute(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        let previous = scene.replace_layer(self.layer.clone())?;
        self.previous = Some(previous);
        Ok(())
    }

    fn undo(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        let previous = self.previous.clone().ok_or(CommandError::NotExecuted)?;
        scene.replace_layer(previous)?;
        Ok(())
    }

    fn inverse(&self) -> Option<SceneCommand> {
        self.previous
            .as_ref()
            .map(|previous| UpdateLayer::new(previous.clone()).into())
    }

    fn affected_entities(&self) -> Vec<EntityId> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveLayer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<Layer>,
}

impl RemoveLayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            removed: None,
        }
    }
}

impl Command for RemoveLayer {
    fn label(&self) -> &'static str {
        "remove_layer"
    }

    fn execute(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        let removed = scene.remove_layer(&self.name)?;
        self.removed = Some(removed);
        Ok(())
    }

    fn undo(&mut self, scene: &mut Scene) -> Result<(), CommandError> {
        let removed = self.removed.clone().ok_or(CommandError::NotExecuted)?;
        scene.add_layer(removed)?;
        Ok(())
    }

    fn inverse(&self) -> Option<SceneCommand> {
        self.removed
            .as_ref()
            .map(|layer| AddLayer::new(layer.clone()).into())
    }

    fn affected_entities(&self) -> Vec<EntityId> {
        Vec::new()
    }
}
