use std::f64::consts::TAU;

use glam::DVec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tolerance::{DEGENERACY, DUPLICATE_VERTEX};

/// 几何内核的错误类型。调用方负责决定是否将其升级为用户可见提示。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("vector has zero length")]
    ZeroLengthVector,
    #[error("points are coincident")]
    CoincidentPoints,
    #[error("radius must be positive, got {0}")]
    NonPositiveRadius(f64),
    #[error("at least {required} points are required, got {actual}")]
    InsufficientPoints { required: usize, actual: usize },
    #[error("points are collinear")]
    Collinear,
    #[error("polygon has zero area")]
    ZeroArea,
    #[error("non-finite coordinate")]
    NonFinite,
}

/// 二维点，内部以 `glam::DVec2` 表示。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2(pub DVec2);

impl Point2 {
    pub const ORIGIN: Point2 = Point2(DVec2::ZERO);

    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self(DVec2::new(x, y))
    }

    #[inline]
    pub fn from_vec(vec: DVec2) -> Self {
        Self(vec)
    }

    #[inline]
    pub fn x(self) -> f64 {
        self.0.x
    }

    #[inline]
    pub fn y(self) -> f64 {
        self.0.y
    }

    #[inline]
    pub fn translate(self, offset: Vector2) -> Self {
        Self(self.0 + offset.0)
    }

    #[inline]
    pub fn vector_to(self, other: Point2) -> Vector2 {
        Vector2(other.0 - self.0)
    }

    #[inline]
    pub fn distance_to(self, other: Point2) -> f64 {
        self.0.distance(other.0)
    }

    #[inline]
    pub fn lerp(self, other: Point2, t: f64) -> Point2 {
        Self(self.0.lerp(other.0, t))
    }

    #[inline]
    pub fn as_vec2(self) -> DVec2 {
        self.0
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl From<DVec2> for Point2 {
    fn from(value: DVec2) -> Self {
        Self::from_vec(value)
    }
}

/// 二维向量。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector2(pub DVec2);

impl Vector2 {
    pub const ZERO: Vector2 = Vector2(DVec2::ZERO);

    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self(DVec2::new(x, y))
    }

    #[inline]
    pub fn from_points(start: Point2, end: Point2) -> Self {
        Self(end.0 - start.0)
    }

    #[inline]
    pub fn from_angle(angle: f64) -> Self {
        Self(DVec2::new(angle.cos(), angle.sin()))
    }

    #[inline]
    pub fn length(self) -> f64 {
        self.0.length()
    }

    #[inline]
    pub fn length_squared(self) -> f64 {
        self.0.length_squared()
    }

    /// 零向量返回 `None`。
    #[inline]
    pub fn normalize(self) -> Option<Self> {
        let len = self.0.length();
        if len <= DEGENERACY {
            None
        } else {
            Some(Self(self.0 / len))
        }
    }

    #[inline]
    pub fn dot(self, other: Vector2) -> f64 {
        self.0.dot(other.0)
    }

    /// 二维叉积（z 分量）。
    #[inline]
    pub fn cross(self, other: Vector2) -> f64 {
        self.0.perp_dot(other.0)
    }

    #[inline]
    pub fn scale(self, factor: f64) -> Self {
        Self(self.0 * factor)
    }

    /// 逆时针旋转 90°。
    #[inline]
    pub fn perp(self) -> Self {
        Self(self.0.perp())
    }

    #[inline]
    pub fn angle(self) -> f64 {
        self.0.y.atan2(self.0.x)
    }

    #[inline]
    pub fn as_vec2(self) -> DVec2 {
        self.0
    }

    #[inline]
    pub fn x(self) -> f64 {
        self.0.x
    }

    #[inline]
    pub fn y(self) -> f64 {
        self.0.y
    }
}

impl From<DVec2> for Vector2 {
    fn from(value: DVec2) -> Self {
        Self(value)
    }
}

/// 轴对齐边界框，用于估算文档/实体范围以及空间索引。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds2D {
    min: Point2,
    max: Point2,
}

impl Bounds2D {
    #[inline]
    pub fn new(min: Point2, max: Point2) -> Self {
        Self { min, max }
    }

    /// 由任意两个对角点构造规范化矩形。
    #[inline]
    pub fn from_corners(a: Point2, b: Point2) -> Self {
        Self {
            min: Point2::from_vec(a.0.min(b.0)),
            max: Point2::from_vec(a.0.max(b.0)),
        }
    }

    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point2>,
    {
        let mut bounds = Self::empty();
        for point in points {
            bounds.include_point(point);
        }
        if bounds.is_empty() { None } else { Some(bounds) }
    }

    #[inline]
    pub fn empty() -> Self {
        Self {
            min: Point2::new(f64::INFINITY, f64::INFINITY),
            max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x() > self.max.x() || self.min.y() > self.max.y()
    }

    #[inline]
    pub fn min(&self) -> Point2 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> Point2 {
        self.max
    }

    #[inline]
    pub fn width(&self) -> f64 {
        (self.max.x() - self.min.x()).max(0.0)
    }

    #[inline]
    pub fn height(&self) -> f64 {
        (self.max.y() - self.min.y()).max(0.0)
    }

    pub fn include_point(&mut self, point: Point2) {
        if self.is_empty() {
            self.min = point;
            self.max = point;
            return;
        }
        let min_vec = self.min.as_vec2().min(point.as_vec2());
        let max_vec = self.max.as_vec2().max(point.as_vec2());
        self.min = Point2::from_vec(min_vec);
        self.max = Point2::from_vec(max_vec);
    }

    pub fn include_bounds(&mut self, other: &Bounds2D) {
        if other.is_empty() {
            return;
        }
        self.include_point(other.min);
        self.include_point(other.max);
    }

    #[inline]
    pub fn center(&self) -> Point2 {
        debug_assert!(!self.is_empty());
        let center = (self.min.as_vec2() + self.max.as_vec2()) * 0.5;
        Point2::from_vec(center)
    }

    #[inline]
    pub fn contains_point(&self, point: Point2) -> bool {
        point.x() >= self.min.x()
            && point.x() <= self.max.x()
            && point.y() >= self.min.y()
            && point.y() <= self.max.y()
    }

    /// `other` 完全落在当前范围内（边界重合视为包含）。
    #[inline]
    pub fn contains_bounds(&self, other: &Bounds2D) -> bool {
        !other.is_empty() && self.contains_point(other.min) && self.contains_point(other.max)
    }

    #[inline]
    pub fn intersects(&self, other: &Bounds2D) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min.x() <= other.max.x()
            && self.max.x() >= other.min.x()
            && self.min.y() <= other.max.y()
            && self.max.y() >= other.min.y()
    }

    #[inline]
    pub fn expanded(&self, margin: f64) -> Bounds2D {
        if self.is_empty() {
            return *self;
        }
        let delta = DVec2::splat(margin);
        Bounds2D {
            min: Point2::from_vec(self.min.0 - delta),
            max: Point2::from_vec(self.max.0 + delta),
        }
    }

    /// 逆时针顺序：左下、右下、右上、左上。
    pub fn corners(&self) -> [Point2; 4] {
        [
            self.min,
            Point2::new(self.max.x(), self.min.y()),
            self.max,
            Point2::new(self.min.x(), self.max.y()),
        ]
    }
}

/// 逆时针圆弧参数（弧度）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularArc {
    pub center: Point2,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
}

/// 多段线凸度段对应的圆弧，`sweep` 带符号（负值表示顺时针）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulgeArc {
    pub center: Point2,
    pub radius: f64,
    pub start_angle: f64,
    pub sweep: f64,
}

#[inline]
pub fn distance(a: Point2, b: Point2) -> f64 {
    a.distance_to(b)
}

#[inline]
pub fn magnitude(vector: Vector2) -> f64 {
    vector.length()
}

#[inline]
pub fn dot(a: Vector2, b: Vector2) -> f64 {
    a.dot(b)
}

#[inline]
pub fn cross(a: Vector2, b: Vector2) -> f64 {
    a.cross(b)
}

/// 两向量之间的无符号夹角，范围 `[0, π]`。
pub fn angle_between(a: Vector2, b: Vector2) -> Result<f64, GeometryError> {
    let (Some(a), Some(b)) = (a.normalize(), b.normalize()) else {
        return Err(GeometryError::ZeroLengthVector);
    };
    Ok(a.dot(b).clamp(-1.0, 1.0).acos())
}

/// 从 `a` 逆时针旋转到 `b` 的带符号夹角，范围 `(-π, π]`。
pub fn signed_angle_between(a: Vector2, b: Vector2) -> Result<f64, GeometryError> {
    if a.length() <= DEGENERACY || b.length() <= DEGENERACY {
        return Err(GeometryError::ZeroLengthVector);
    }
    Ok(a.cross(b).atan2(a.dot(b)))
}

/// 归一化到 `[0, 2π)`。
pub fn normalize_angle(angle: f64) -> f64 {
    let mut result = angle % TAU;
    if result < 0.0 {
        result += TAU;
    }
    if result >= TAU { 0.0 } else { result }
}

/// 归一化到 `[0, 360)`。
pub fn normalize_angle_degrees(angle: f64) -> f64 {
    let mut result = angle % 360.0;
    if result < 0.0 {
        result += 360.0;
    }
    if result >= 360.0 { 0.0 } else { result }
}

/// 把任意起止角规整成 `start ∈ [0, 2π)`、`end ∈ (start, start + 2π]` 的逆时针区间。
pub fn canonical_interval(start: f64, end: f64) -> (f64, f64) {
    let start = normalize_angle(start);
    let mut end = normalize_angle(end);
    if (end - start).abs() < DEGENERACY {
        end = start + TAU;
    } else if end < start {
        end += TAU;
    }
    (start, end)
}

/// 判断 `angle` 是否落在逆时针扫掠 `[start, end]` 内。
pub fn angle_in_sweep(angle: f64, start: f64, end: f64) -> bool {
    let (start, end) = canonical_interval(start, end);
    let mut angle = normalize_angle(angle);
    if angle < start - DEGENERACY {
        angle += TAU;
    }
    angle <= end + DEGENERACY
}

#[inline]
pub fn point_on_circle(center: Point2, radius: f64, angle: f64) -> Point2 {
    center.translate(Vector2::from_angle(angle).scale(radius))
}

#[inline]
pub fn rect_from_two_points(a: Point2, b: Point2) -> Bounds2D {
    Bounds2D::from_corners(a, b)
}

#[inline]
pub fn midpoint(a: Point2, b: Point2) -> Point2 {
    a.lerp(b, 0.5)
}

/// 线段上离 `point` 最近的点。
pub fn closest_point_on_segment(point: Point2, start: Point2, end: Point2) -> Point2 {
    let seg = end.0 - start.0;
    let len_sq = seg.length_squared();
    if len_sq <= DEGENERACY * DEGENERACY {
        return start;
    }
    let t = ((point.0 - start.0).dot(seg) / len_sq).clamp(0.0, 1.0);
    Point2::from_vec(start.0 + seg * t)
}

#[inline]
pub fn distance_to_segment(point: Point2, start: Point2, end: Point2) -> f64 {
    point.distance_to(closest_point_on_segment(point, start, end))
}

/// 点在无限直线上的垂足，同时返回参数 `t`（0 对应 `start`，1 对应 `end`）。
pub fn project_onto_line(
    point: Point2,
    start: Point2,
    end: Point2,
) -> Result<(Point2, f64), GeometryError> {
    let dir = end.0 - start.0;
    let len_sq = dir.length_squared();
    if len_sq <= DEGENERACY * DEGENERACY {
        return Err(GeometryError::CoincidentPoints);
    }
    let t = (point.0 - start.0).dot(dir) / len_sq;
    Ok((Point2::from_vec(start.0 + dir * t), t))
}

/// 两条无限直线的交点；平行（含重合）时返回 `None`。
pub fn line_intersection(a1: Point2, a2: Point2, b1: Point2, b2: Point2) -> Option<Point2> {
    line_intersection_params(a1, a2, b1, b2).map(|(t, _)| Point2::from_vec(a1.0 + (a2.0 - a1.0) * t))
}

/// 两条线段的交点（端点接触算作相交）。
pub fn segment_intersection(a1: Point2, a2: Point2, b1: Point2, b2: Point2) -> Option<Point2> {
    let (t, u) = line_intersection_params(a1, a2, b1, b2)?;
    let range = -DEGENERACY..=1.0 + DEGENERACY;
    if range.contains(&t) && range.contains(&u) {
        Some(Point2::from_vec(a1.0 + (a2.0 - a1.0) * t))
    } else {
        None
    }
}

fn line_intersection_params(a1: Point2, a2: Point2, b1: Point2, b2: Point2) -> Option<(f64, f64)> {
    let r = a2.0 - a1.0;
    let s = b2.0 - b1.0;
    let denom = r.perp_dot(s);
    if denom.abs() <= DEGENERACY {
        return None;
    }
    let qp = b1.0 - a1.0;
    let t = qp.perp_dot(s) / denom;
    let u = qp.perp_dot(r) / denom;
    Some((t, u))
}

/// 无限直线与圆的交点参数，按 `t` 升序。
fn line_circle_params(start: Point2, end: Point2, center: Point2, radius: f64) -> Vec<f64> {
    let d = end.0 - start.0;
    let f = start.0 - center.0;
    let a = d.dot(d);
    if a <= DEGENERACY * DEGENERACY {
        return Vec::new();
    }
    let b = 2.0 * f.dot(d);
    let c = f.dot(f) - radius * radius;
    let disc = b * b - 4.0 * a * c;
    let scale = (b * b).max((4.0 * a * c).abs()).max(1.0);
    if disc < -DEGENERACY * scale {
        Vec::new()
    } else if disc.abs() <= DEGENERACY * scale {
        vec![-b / (2.0 * a)]
    } else {
        let root = disc.sqrt();
        vec![(-b - root) / (2.0 * a), (-b + root) / (2.0 * a)]
    }
}

pub fn line_circle_intersections(
    start: Point2,
    end: Point2,
    center: Point2,
    radius: f64,
) -> Vec<Point2> {
    line_circle_params(start, end, center, radius)
        .into_iter()
        .map(|t| start.lerp(end, t))
        .collect()
}

pub fn segment_circle_intersections(
    start: Point2,
    end: Point2,
    center: Point2,
    radius: f64,
) -> Vec<Point2> {
    line_circle_params(start, end, center, radius)
        .into_iter()
        .filter(|t| (-DEGENERACY..=1.0 + DEGENERACY).contains(t))
        .map(|t| start.lerp(end, t))
        .collect()
}

/// 两圆交点。同心圆（含重合）返回空。
pub fn circle_circle_intersections(
    c1: Point2,
    r1: f64,
    c2: Point2,
    r2: f64,
) -> Vec<Point2> {
    let delta = c2.0 - c1.0;
    let d = delta.length();
    if d <= DEGENERACY {
        return Vec::new();
    }
    if d > r1 + r2 + DEGENERACY || d < (r1 - r2).abs() - DEGENERACY {
        return Vec::new();
    }
    let a = (r1 * r1 - r2 * r2 + d * d) / (2.0 * d);
    let h_sq = r1 * r1 - a * a;
    let dir = delta / d;
    let base = c1.0 + dir * a;
    if h_sq <= DEGENERACY {
        return vec![Point2::from_vec(base)];
    }
    let h = h_sq.sqrt();
    let offset = dir.perp() * h;
    vec![Point2::from_vec(base + offset), Point2::from_vec(base - offset)]
}

/// 从外部点到圆的切点。点在圆内时返回空，恰在圆上时返回该点本身。
pub fn tangent_points(from: Point2, center: Point2, radius: f64) -> Vec<Point2> {
    let delta = from.0 - center.0;
    let d = delta.length();
    if radius <= DEGENERACY || d < radius - DUPLICATE_VERTEX {
        return Vec::new();
    }
    if (d - radius).abs() <= DUPLICATE_VERTEX {
        return vec![from];
    }
    let base = delta.y.atan2(delta.x);
    let alpha = (radius / d).clamp(-1.0, 1.0).acos();
    vec![
        point_on_circle(center, radius, base + alpha),
        point_on_circle(center, radius, base - alpha),
    ]
}

/// 鞋带公式求带符号面积，逆时针为正。
pub fn polygon_area(points: &[Point2]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, current) in points.iter().enumerate() {
        let next = points[(i + 1) % points.len()];
        sum += current.x() * next.y() - next.x() * current.y();
    }
    sum * 0.5
}

pub fn polygon_centroid(points: &[Point2]) -> Result<Point2, GeometryError> {
    if points.len() < 3 {
        return Err(GeometryError::InsufficientPoints {
            required: 3,
            actual: points.len(),
        });
    }
    let area = polygon_area(points);
    if area.abs() <= DEGENERACY {
        return Err(GeometryError::ZeroArea);
    }
    let mut cx = 0.0;
    let mut cy = 0.0;
    for (i, current) in points.iter().enumerate() {
        let next = points[(i + 1) % points.len()];
        let factor = current.x() * next.y() - next.x() * current.y();
        cx += (current.x() + next.x()) * factor;
        cy += (current.y() + next.y()) * factor;
    }
    Ok(Point2::new(cx / (6.0 * area), cy / (6.0 * area)))
}

/// 过三点求逆时针圆弧，`through` 决定弧的走向。
pub fn arc_through_points(
    start: Point2,
    through: Point2,
    end: Point2,
) -> Result<CircularArc, GeometryError> {
    let (ax, ay) = (start.x(), start.y());
    let (bx, by) = (through.x(), through.y());
    let (cx, cy) = (end.x(), end.y());
    let d = 2.0 * (ax * (by - cy) + bx * (cy - ay) + cx * (ay - by));
    if d.abs() <= DEGENERACY {
        return Err(GeometryError::Collinear);
    }
    let a_sq = ax * ax + ay * ay;
    let b_sq = bx * bx + by * by;
    let c_sq = cx * cx + cy * cy;
    let ux = (a_sq * (by - cy) + b_sq * (cy - ay) + c_sq * (ay - by)) / d;
    let uy = (a_sq * (cx - bx) + b_sq * (ax - cx) + c_sq * (bx - ax)) / d;
    let center = Point2::new(ux, uy);
    let radius = center.distance_to(start);

    let angle_of = |p: Point2| center.vector_to(p).angle();
    let a_start = angle_of(start);
    let a_mid = angle_of(through);
    let a_end = angle_of(end);
    let (start_angle, end_angle) = if angle_in_sweep(a_mid, a_start, a_end) {
        (a_start, a_end)
    } else {
        (a_end, a_start)
    };
    Ok(CircularArc {
        center,
        radius,
        start_angle: normalize_angle(start_angle),
        end_angle: normalize_angle(end_angle),
    })
}

/// 多段线凸度段换算为圆弧。凸度接近 0 或弦长为零时视为直线段。
pub fn bulge_to_arc(start: Point2, end: Point2, bulge: f64) -> Option<BulgeArc> {
    if bulge.abs() <= DEGENERACY {
        return None;
    }
    let chord = end.0 - start.0;
    let chord_len = chord.length();
    if chord_len <= DEGENERACY {
        return None;
    }
    let theta = 4.0 * bulge.atan();
    let half = theta / 2.0;
    let sin_half = half.sin();
    if sin_half.abs() <= DEGENERACY {
        return None;
    }
    let radius = (chord_len / (2.0 * sin_half)).abs();
    let left = chord.perp() / chord_len;
    let offset = (chord_len / 2.0) / half.tan();
    let center = (start.0 + end.0) * 0.5 + left * offset;
    let start_dir = start.0 - center;
    Some(BulgeArc {
        center: Point2::from_vec(center),
        radius,
        start_angle: start_dir.y.atan2(start_dir.x),
        sweep: theta,
    })
}

/// 判定两点在重复顶点容差内重合。
#[inline]
pub fn points_coincide(a: Point2, b: Point2) -> bool {
    a.distance_to(b) <= DUPLICATE_VERTEX
}
