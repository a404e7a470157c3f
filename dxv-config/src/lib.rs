use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "DXV_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub frontend: FrontendConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub snapping: SnappingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub grips: GripConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub spatial: SpatialConfig,
    #[serde(default)]
    pub drawing: DrawingConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 自动发现配置文件：优先读取环境变量 `DXV_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    /// CLI 启动时加载的场景快照。
    #[serde(default)]
    pub scene_path: Option<PathBuf>,
    #[serde(default = "FrontendConfig::default_viewport_width")]
    pub viewport_width: f64,
    #[serde(default = "FrontendConfig::default_viewport_height")]
    pub viewport_height: f64,
}

impl FrontendConfig {
    fn default_viewport_width() -> f64 {
        1280.0
    }

    fn default_viewport_height() -> f64 {
        800.0
    }
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            scene_path: None,
            viewport_width: Self::default_viewport_width(),
            viewport_height: Self::default_viewport_height(),
        }
    }
}

/// 视口参数。`ruler_size` 是左侧与顶部标尺带的像素宽度。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_step: f64,
    pub ruler_size: f64,
    pub fit_padding: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.01,
            max_zoom: 1_000.0,
            zoom_step: 1.2,
            ruler_size: 24.0,
            fit_padding: 0.05,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnappingConfig {
    pub radius_px: f64,
    pub grid_spacing: f64,
    /// 启用的捕捉策略名，例如 `endpoint`、`grid`。
    pub enabled: Vec<String>,
}

impl Default for SnappingConfig {
    fn default() -> Self {
        Self {
            radius_px: 10.0,
            grid_spacing: 10.0,
            enabled: [
                "grid",
                "endpoint",
                "midpoint",
                "center",
                "intersection",
                "perpendicular",
                "tangent",
            ]
            .iter()
            .map(|name| name.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub depth: usize,
    pub author: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            depth: 100,
            author: "local".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GripConfig {
    pub base_size_px: f64,
    pub warm_multiplier: f64,
    pub hot_multiplier: f64,
}

impl Default for GripConfig {
    fn default() -> Self {
        Self {
            base_size_px: 8.0,
            warm_multiplier: 1.25,
            hot_multiplier: 1.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub target_fps: f64,
    pub fps_window: usize,
    pub skip_frames_when_over_budget: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            fps_window: 60,
            skip_frames_when_over_budget: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    pub initial_cell_size: f64,
    pub target_per_cell: f64,
    pub rebuild_factor: f64,
    pub min_cell_size: f64,
    pub max_cell_size: f64,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            initial_cell_size: 50.0,
            target_per_cell: 8.0,
            rebuild_factor: 2.0,
            min_cell_size: 1.0,
            max_cell_size: 10_000.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DrawingConfig {
    /// 标注文字两侧尺寸线断开的总宽度（世界单位）。
    pub dimension_label_gap: f64,
    pub pick_tolerance_px: f64,
    /// 提交后保持工具处于待命状态，便于连续绘制。
    pub continuous_tools: bool,
    pub default_layer: String,
}

impl Default for DrawingConfig {
    fn default() -> Self {
        Self {
            dimension_label_gap: 30.0,
            pick_tolerance_px: 5.0,
            continuous_tools: false,
            default_layer: "0".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
