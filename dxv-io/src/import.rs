//! 导入边界：在后台线程解析文档，结果经一次性通道交付给编辑器。

use std::error::Error as StdError;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use dxv_core::document::Scene;
use thiserror::Error;
use tracing::{debug, info, warn};

/// 解析失败。消息原样转交给宿主界面，核心不做解释。
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ParseError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub trait SceneParser {
    fn parse(&self, bytes: &[u8]) -> Result<Scene, ParseError>;
}

/// 解析原生 JSON 快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSceneParser;

impl SceneParser for JsonSceneParser {
    fn parse(&self, bytes: &[u8]) -> Result<Scene, ParseError> {
        serde_json::from_slice(bytes).map_err(|err| {
            ParseError::with_source(
                format!("line {}, column {}: {err}", err.line(), err.column()),
                err,
            )
        })
    }
}

/// 一次性导入任务。结果只交付一次，之后 `poll` 恒为 `None`。
#[derive(Debug)]
pub struct ImportTask {
    receiver: Receiver<Result<Scene, ParseError>>,
    delivered: bool,
}

impl ImportTask {
    pub fn spawn<P>(parser: P, bytes: Vec<u8>) -> Self
    where
        P: SceneParser + Send + 'static,
    {
        Self::run(move || parser.parse(&bytes))
    }

    /// 读取文件与解析都在后台线程完成；读取失败同样以 `ParseError` 交付。
    pub fn spawn_file<P>(parser: P, path: impl Into<PathBuf>) -> Self
    where
        P: SceneParser + Send + 'static,
    {
        let path = path.into();
        Self::run(move || {
            let bytes = fs::read(&path).map_err(|err| {
                ParseError::with_source(format!("cannot read {}: {err}", path.display()), err)
            })?;
            parser.parse(&bytes)
        })
    }

    fn run<F>(job: F) -> Self
    where
        F: FnOnce() -> Result<Scene, ParseError> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let worker_sender = sender.clone();
        let spawned = thread::Builder::new()
            .name("dxv-import".to_string())
            .spawn(move || {
                let result = job();
                match &result {
                    Ok(scene) => info!(entities = scene.len(), "导入完成"),
                    Err(err) => warn!(error = %err, "导入失败"),
                }
                let _ = worker_sender.send(result);
            });
        if let Err(err) = spawned {
            let _ = sender.send(Err(ParseError::with_source("cannot start import worker", err)));
        }
        Self {
            receiver,
            delivered: false,
        }
    }

    /// 非阻塞查询。完成时返回结果，仍在解析时返回 `None`。
    pub fn poll(&mut self) -> Option<Result<Scene, ParseError>> {
        if self.delivered {
            return None;
        }
        match self.receiver.try_recv() {
            Ok(result) => {
                self.delivered = true;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.delivered = true;
                Some(Err(ParseError::new("import worker exited without a result")))
            }
        }
    }

    #[inline]
    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    /// 阻塞等待结果。
    pub fn wait(self) -> Result<Scene, ParseError> {
        if self.delivered {
            return Err(ParseError::new("import result already delivered"));
        }
        debug!("等待导入结果");
        self.receiver
            .recv()
            .unwrap_or_else(|_| Err(ParseError::new("import worker exited without a result")))
    }
}
