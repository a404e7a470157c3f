//! 世界坐标与屏幕像素之间的换算。
//!
//! 约定：`screen.x = world.x * scale + offset.x`，`screen.y = offset.y - world.y * scale`。
//! Y 轴翻转只在这里发生一次；屏幕坐标以视口左上角为原点，包含标尺边距。

use dxv_config::ViewportConfig;
use dxv_core::geometry::{Bounds2D, Point2, Vector2};
use dxv_core::tolerance::DEGENERACY;
use tracing::debug;

use crate::errors::TransformError;

/// 固定 UI 占用的边距（像素），属于视口而不是变换。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Margins {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Margins {
    /// 左侧与顶部的标尺带。
    pub fn rulers(size: f64) -> Self {
        Self {
            left: size,
            top: size,
            right: 0.0,
            bottom: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub margins: Margins,
}

impl Viewport {
    pub fn new(width: f64, height: f64, margins: Margins) -> Self {
        Self {
            width,
            height,
            margins,
        }
    }

    /// 扣除边距后的绘图区域（屏幕坐标）。
    pub fn drawing_area(&self) -> Bounds2D {
        Bounds2D::from_corners(
            Point2::new(self.margins.left, self.margins.top),
            Point2::new(
                self.width - self.margins.right,
                self.height - self.margins.bottom,
            ),
        )
    }

    fn drawing_size(&self) -> (f64, f64) {
        (
            self.width - self.margins.left - self.margins.right,
            self.height - self.margins.top - self.margins.bottom,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportState {
    NotReady,
    Ready(Viewport),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLimits {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub fit_padding: f64,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self::from(&ViewportConfig::default())
    }
}

impl From<&ViewportConfig> for ZoomLimits {
    fn from(config: &ViewportConfig) -> Self {
        let min = config.min_zoom.max(f64::MIN_POSITIVE);
        Self {
            min,
            max: config.max_zoom.max(min),
            step: if config.zoom_step > 1.0 {
                config.zoom_step
            } else {
                1.2
            },
            fit_padding: config.fit_padding.clamp(0.0, 0.45),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewTransform {
    scale: f64,
    offset: Vector2,
    viewport: ViewportState,
    limits: ZoomLimits,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::new(ZoomLimits::default())
    }
}

impl ViewTransform {
    pub fn new(limits: ZoomLimits) -> Self {
        Self {
            scale: 1.0_f64.clamp(limits.min, limits.max),
            offset: Vector2::ZERO,
            viewport: ViewportState::NotReady,
            limits,
        }
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[inline]
    pub fn offset(&self) -> Vector2 {
        self.offset
    }

    #[inline]
    pub fn limits(&self) -> ZoomLimits {
        self.limits
    }

    #[inline]
    pub fn state(&self) -> ViewportState {
        self.viewport
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self.viewport, ViewportState::Ready(_))
    }

    pub fn viewport(&self) -> Result<Viewport, TransformError> {
        match self.viewport {
            ViewportState::Ready(viewport) => Ok(viewport),
            ViewportState::NotReady => Err(TransformError::ViewportNotReady),
        }
    }

    /// 接收一次布局测量。绘图区域为空时回到 `NotReady` 并报错。
    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<(), TransformError> {
        let (width, height) = viewport.drawing_size();
        if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
            self.viewport = ViewportState::NotReady;
            return Err(TransformError::ZeroAreaViewport { width, height });
        }
        debug!(width = viewport.width, height = viewport.height, "视口尺寸已更新");
        self.viewport = ViewportState::Ready(viewport);
        Ok(())
    }

    pub fn invalidate_viewport(&mut self) {
        self.viewport = ViewportState::NotReady;
    }

    /// 直接设置缩放与偏移，缩放超界时截断。
    pub fn set_view(&mut self, scale: f64, offset: Vector2) {
        self.scale = self.clamp_scale(scale);
        self.offset = offset;
    }

    pub fn world_to_screen(&self, world: Point2) -> Result<Point2, TransformError> {
        self.viewport()?;
        Ok(Point2::new(
            world.x() * self.scale + self.offset.x(),
            self.offset.y() - world.y() * self.scale,
        ))
    }

    pub fn screen_to_world(&self, screen: Point2) -> Result<Point2, TransformError> {
        self.viewport()?;
        Ok(Point2::new(
            (screen.x() - self.offset.x()) / self.scale,
            (self.offset.y() - screen.y()) / self.scale,
        ))
    }

    /// 像素长度折算成世界长度。
    #[inline]
    pub fn pixels_to_world(&self, pixels: f64) -> f64 {
        pixels / self.scale
    }

    #[inline]
    pub fn world_to_pixels(&self, length: f64) -> f64 {
        length * self.scale
    }

    fn clamp_scale(&self, scale: f64) -> f64 {
        if scale.is_finite() {
            scale.clamp(self.limits.min, self.limits.max)
        } else if scale > 0.0 {
            self.limits.max
        } else {
            self.limits.min
        }
    }

    /// 以光标为锚点缩放：缩放前后光标下的世界点保持不动。返回新的缩放值。
    pub fn zoom_at(&mut self, cursor: Point2, factor: f64) -> Result<f64, TransformError> {
        let anchor = self.screen_to_world(cursor)?;
        let factor = if factor.is_finite() && factor > 0.0 {
            factor
        } else {
            1.0
        };
        self.scale = self.clamp_scale(self.scale * factor);
        self.offset = Vector2::new(
            cursor.x() - anchor.x() * self.scale,
            cursor.y() + anchor.y() * self.scale,
        );
        Ok(self.scale)
    }

    pub fn zoom_in(&mut self, cursor: Point2) -> Result<f64, TransformError> {
        self.zoom_at(cursor, self.limits.step)
    }

    pub fn zoom_out(&mut self, cursor: Point2) -> Result<f64, TransformError> {
        self.zoom_at(cursor, 1.0 / self.limits.step)
    }

    /// 绘图区域中心，作为键盘缩放的锚点。
    pub fn center(&self) -> Result<Point2, TransformError> {
        Ok(self.viewport()?.drawing_area().center())
    }

    /// 屏幕方向平移（像素）。
    pub fn pan(&mut self, dx: f64, dy: f64) {
        if dx.is_finite() && dy.is_finite() {
            self.offset = Vector2::new(self.offset.x() + dx, self.offset.y() + dy);
        }
    }

    /// 缩放并居中，使 `bounds` 完整落在绘图区域内（四周留出 `fit_padding` 比例的空白）。
    pub fn fit_to_bounds(&mut self, bounds: &Bounds2D) -> Result<(), TransformError> {
        let area = self.viewport()?.drawing_area();
        if bounds.is_empty() {
            return Ok(());
        }
        let usable = 1.0 - 2.0 * self.limits.fit_padding;
        let sx = (bounds.width() > DEGENERACY).then(|| area.width() * usable / bounds.width());
        let sy = (bounds.height() > DEGENERACY).then(|| area.height() * usable / bounds.height());
        let scale = match (sx, sy) {
            (Some(sx), Some(sy)) => sx.min(sy),
            (Some(s), None) | (None, Some(s)) => s,
            (None, None) => self.scale,
        };
        self.scale = self.clamp_scale(scale);
        let world_center = bounds.center();
        let screen_center = area.center();
        self.offset = Vector2::new(
            screen_center.x() - world_center.x() * self.scale,
            screen_center.y() + world_center.y() * self.scale,
        );
        debug!(scale = self.scale, "视图已适配范围");
        Ok(())
    }

    /// 绘图区域覆盖的世界范围，用于渲染裁剪。
    pub fn visible_world_bounds(&self) -> Result<Bounds2D, TransformError> {
        let area = self.viewport()?.drawing_area();
        let a = self.screen_to_world(area.min())?;
        let b = self.screen_to_world(area.max())?;
        Ok(Bounds2D::from_corners(a, b))
    }

    /// 屏幕点是否落在绘图区域内（标尺带之外）。
    pub fn in_drawing_area(&self, screen: Point2) -> Result<bool, TransformError> {
        Ok(self.viewport()?.drawing_area().contains_point(screen))
    }
}
