//! 把实体分解为精确图元（线段、圆、圆弧）或采样折线。
//!
//! 命中测试、求交与捕捉使用精确图元；椭圆与样条没有封闭形式，按弦高误差采样成线段。

use std::f64::consts::TAU;

use glam::DVec2;

use crate::document::{ComposedPlacement, Ellipse, Geometry, MAX_BLOCK_DEPTH, Scene, Spline};
use crate::geometry::{
    Bounds2D, Point2, angle_in_sweep, bulge_to_arc, canonical_interval,
    circle_circle_intersections, closest_point_on_segment, point_on_circle,
    segment_circle_intersections, segment_intersection,
};
use crate::tolerance::DEGENERACY;

/// 世界坐标下默认的弦高误差。
pub const DEFAULT_CHORD_TOLERANCE: f64 = 0.01;
const MIN_ARC_SEGMENTS: usize = 4;
const MAX_ARC_SEGMENTS: usize = 256;
const ELLIPSE_SEGMENTS: usize = 64;
const SPLINE_SEGMENTS_PER_SPAN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Segment {
        start: Point2,
        end: Point2,
    },
    Circle {
        center: Point2,
        radius: f64,
    },
    /// 逆时针圆弧。
    Arc {
        center: Point2,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
    },
}

impl Primitive {
    pub fn closest_point(&self, point: Point2) -> Point2 {
        match *self {
            Primitive::Segment { start, end } => closest_point_on_segment(point, start, end),
            Primitive::Circle { center, radius } => radial_projection(point, center, radius),
            Primitive::Arc {
                center,
                radius,
                start_angle,
                end_angle,
            } => {
                let angle = center.vector_to(point).angle();
                if angle_in_sweep(angle, start_angle, end_angle) {
                    radial_projection(point, center, radius)
                } else {
                    let a = point_on_circle(center, radius, start_angle);
                    let b = point_on_circle(center, radius, end_angle);
                    if a.distance_to(point) <= b.distance_to(point) { a } else { b }
                }
            }
        }
    }

    #[inline]
    pub fn distance_to(&self, point: Point2) -> f64 {
        self.closest_point(point).distance_to(point)
    }

    /// 开放图元的两个端点；整圆没有端点。
    pub fn endpoints(&self) -> Option<(Point2, Point2)> {
        match *self {
            Primitive::Segment { start, end } => Some((start, end)),
            Primitive::Circle { .. } => None,
            Primitive::Arc {
                center,
                radius,
                start_angle,
                end_angle,
            } => Some((
                point_on_circle(center, radius, start_angle),
                point_on_circle(center, radius, end_angle),
            )),
        }
    }

    pub fn midpoint(&self) -> Option<Point2> {
        match *self {
            Primitive::Segment { start, end } => Some(start.lerp(end, 0.5)),
            Primitive::Circle { .. } => None,
            Primitive::Arc {
                center,
                radius,
                start_angle,
                end_angle,
            } => {
                let (start, end) = canonical_interval(start_angle, end_angle);
                Some(point_on_circle(center, radius, (start + end) * 0.5))
            }
        }
    }

    pub fn intersections(&self, other: &Primitive) -> Vec<Point2> {
        use Primitive::*;
        match (*self, *other) {
            (Segment { start: a1, end: a2 }, Segment { start: b1, end: b2 }) => {
                segment_intersection(a1, a2, b1, b2).into_iter().collect()
            }
            (Segment { start, end }, round) | (round, Segment { start, end }) => {
                let (center, radius) = round.circle_params();
                segment_circle_intersections(start, end, center, radius)
                    .into_iter()
                    .filter(|p| round.contains_angle_of(*p))
                    .collect()
            }
            (a, b) => {
                let (c1, r1) = a.circle_params();
                let (c2, r2) = b.circle_params();
                circle_circle_intersections(c1, r1, c2, r2)
                    .into_iter()
                    .filter(|p| a.contains_angle_of(*p) && b.contains_angle_of(*p))
                    .collect()
            }
        }
    }

    fn circle_params(&self) -> (Point2, f64) {
        match *self {
            Primitive::Circle { center, radius } | Primitive::Arc { center, radius, .. } => {
                (center, radius)
            }
            Primitive::Segment { start, .. } => (start, 0.0),
        }
    }

    fn contains_angle_of(&self, point: Point2) -> bool {
        match *self {
            Primitive::Arc {
                center,
                start_angle,
                end_angle,
                ..
            } => angle_in_sweep(center.vector_to(point).angle(), start_angle, end_angle),
            _ => true,
        }
    }

    /// 图元与矩形区域是否有几何交叠（含完全落入）。
    pub fn touches_rect(&self, rect: &Bounds2D) -> bool {
        if rect.is_empty() {
            return false;
        }
        if let Some((a, _)) = self.endpoints() {
            if rect.contains_point(a) {
                return true;
            }
        }
        if let Primitive::Circle { center, radius } = *self {
            if rect.contains_point(point_on_circle(center, radius, 0.0)) {
                return true;
            }
        }
        let corners = rect.corners();
        (0..4).any(|i| {
            let edge = Primitive::Segment {
                start: corners[i],
                end: corners[(i + 1) % 4],
            };
            !self.intersections(&edge).is_empty()
        })
    }

    pub fn bounds(&self) -> Bounds2D {
        match *self {
            Primitive::Segment { start, end } => Bounds2D::from_corners(start, end),
            Primitive::Circle { center, radius } => {
                Bounds2D::from_corners(center, center).expanded(radius)
            }
            Primitive::Arc { .. } => {
                let mut bounds = Bounds2D::empty();
                for point in self.to_points(DEFAULT_CHORD_TOLERANCE) {
                    bounds.include_point(point);
                }
                bounds
            }
        }
    }

    /// 采样为折线点列，首尾包含端点；整圆首尾重合。
    pub fn to_points(&self, chord_tolerance: f64) -> Vec<Point2> {
        match *self {
            Primitive::Segment { start, end } => vec![start, end],
            Primitive::Circle { center, radius } => {
                sample_arc(center, radius, 0.0, TAU, chord_tolerance)
            }
            Primitive::Arc {
                center,
                radius,
                start_angle,
                end_angle,
            } => {
                let (start, end) = canonical_interval(start_angle, end_angle);
                sample_arc(center, radius, start, end - start, chord_tolerance)
            }
        }
    }

    fn transformed(&self, placement: &ComposedPlacement, chord_tolerance: f64) -> Vec<Primitive> {
        if placement.is_identity() {
            return vec![*self];
        }
        match *self {
            Primitive::Segment { start, end } => vec![Primitive::Segment {
                start: placement.apply(start),
                end: placement.apply(end),
            }],
            Primitive::Circle { center, radius } => match placement.similarity() {
                Some((scale, _)) => vec![Primitive::Circle {
                    center: placement.apply(center),
                    radius: radius * scale,
                }],
                None => polyline_segments(
                    self.to_points(chord_tolerance)
                        .into_iter()
                        .map(|p| placement.apply(p))
                        .collect(),
                ),
            },
            Primitive::Arc {
                center,
                radius,
                start_angle,
                end_angle,
            } => match placement.similarity() {
                Some((scale, rotation)) => vec![Primitive::Arc {
                    center: placement.apply(center),
                    radius: radius * scale,
                    start_angle: start_angle + rotation,
                    end_angle: end_angle + rotation,
                }],
                None => polyline_segments(
                    self.to_points(chord_tolerance)
                        .into_iter()
                        .map(|p| placement.apply(p))
                        .collect(),
                ),
            },
        }
    }
}

fn radial_projection(point: Point2, center: Point2, radius: f64) -> Point2 {
    match center.vector_to(point).normalize() {
        Some(dir) => center.translate(dir.scale(radius)),
        None => point_on_circle(center, radius, 0.0),
    }
}

/// 给定弦高误差所需的圆弧分段数。
pub fn arc_segment_count(radius: f64, sweep: f64, chord_tolerance: f64) -> usize {
    let sweep = sweep.abs();
    if radius <= DEGENERACY || sweep <= DEGENERACY {
        return 1;
    }
    let tolerance = chord_tolerance.max(DEGENERACY).min(radius);
    let step = 2.0 * (1.0 - tolerance / radius).clamp(-1.0, 1.0).acos();
    let count = if step > DEGENERACY {
        (sweep / step).ceil() as usize
    } else {
        MAX_ARC_SEGMENTS
    };
    count.clamp(MIN_ARC_SEGMENTS, MAX_ARC_SEGMENTS)
}

/// 从 `start_angle` 起扫掠 `sweep`（可为负）采样圆弧。
pub fn sample_arc(
    center: Point2,
    radius: f64,
    start_angle: f64,
    sweep: f64,
    chord_tolerance: f64,
) -> Vec<Point2> {
    let count = arc_segment_count(radius, sweep, chord_tolerance);
    (0..=count)
        .map(|i| point_on_circle(center, radius, start_angle + sweep * i as f64 / count as f64))
        .collect()
}

pub fn sample_ellipse(ellipse: &Ellipse, segments: usize) -> Vec<Point2> {
    let (start, end) = canonical_interval(ellipse.start_parameter, ellipse.end_parameter);
    let segments = segments.max(MIN_ARC_SEGMENTS);
    (0..=segments)
        .map(|i| ellipse.point_at(start + (end - start) * i as f64 / segments as f64))
        .collect()
}

/// 样条采样：控制点足够时按钳制均匀 B 样条求值，否则经过拟合点做 Catmull-Rom 插值。
pub fn sample_spline(spline: &Spline, segments_per_span: usize) -> Vec<Point2> {
    let segments_per_span = segments_per_span.max(1);
    let mut points = if spline.control_points.len() >= 2
        && spline.control_points.len() > spline.degree.max(1) as usize
    {
        sample_bspline(&spline.control_points, spline.degree.max(1) as usize, segments_per_span)
    } else if spline.fit_points.len() >= 2 {
        sample_catmull_rom(&spline.fit_points, segments_per_span)
    } else {
        spline.control_points.clone()
    };
    if spline.is_closed {
        if let (Some(first), Some(last)) = (points.first().copied(), points.last().copied()) {
            if first.distance_to(last) > DEGENERACY {
                points.push(first);
            }
        }
    }
    points
}

fn sample_bspline(control: &[Point2], degree: usize, segments_per_span: usize) -> Vec<Point2> {
    let n = control.len();
    let p = degree.min(n - 1);
    let spans = n - p;
    let knots: Vec<f64> = (0..n + p + 1)
        .map(|i| {
            if i <= p {
                0.0
            } else if i >= n {
                1.0
            } else {
                (i - p) as f64 / spans as f64
            }
        })
        .collect();
    let samples = spans * segments_per_span;
    (0..=samples)
        .map(|s| {
            let u = s as f64 / samples as f64;
            de_boor(control, &knots, p, u)
        })
        .collect()
}

fn de_boor(control: &[Point2], knots: &[f64], p: usize, u: f64) -> Point2 {
    let n = control.len();
    let mut k = p;
    while k < n - 1 && u >= knots[k + 1] {
        k += 1;
    }
    let mut d: Vec<DVec2> = (0..=p).map(|j| control[j + k - p].as_vec2()).collect();
    for r in 1..=p {
        for j in (r..=p).rev() {
            let i = j + k - p;
            let denom = knots[i + p - r + 1] - knots[i];
            let alpha = if denom.abs() <= DEGENERACY {
                0.0
            } else {
                (u - knots[i]) / denom
            };
            d[j] = d[j - 1] * (1.0 - alpha) + d[j] * alpha;
        }
    }
    Point2::from_vec(d[p])
}

fn sample_catmull_rom(points: &[Point2], segments_per_span: usize) -> Vec<Point2> {
    let mut out = Vec::with_capacity((points.len() - 1) * segments_per_span + 1);
    let at = |i: isize| -> DVec2 {
        let clamped = i.clamp(0, points.len() as isize - 1) as usize;
        points[clamped].as_vec2()
    };
    for i in 0..points.len() - 1 {
        let (p0, p1, p2, p3) = (
            at(i as isize - 1),
            at(i as isize),
            at(i as isize + 1),
            at(i as isize + 2),
        );
        for s in 0..segments_per_span {
            let t = s as f64 / segments_per_span as f64;
            let t2 = t * t;
            let t3 = t2 * t;
            let value = ((p1 * 2.0)
                + (p2 - p0) * t
                + (p0 * 2.0 - p1 * 5.0 + p2 * 4.0 - p3) * t2
                + (p1 * 3.0 - p0 - p2 * 3.0 + p3) * t3)
                * 0.5;
            out.push(Point2::from_vec(value));
        }
    }
    if let Some(last) = points.last() {
        out.push(*last);
    }
    out
}

fn polyline_segments(points: Vec<Point2>) -> Vec<Primitive> {
    points
        .windows(2)
        .map(|pair| Primitive::Segment {
            start: pair[0],
            end: pair[1],
        })
        .collect()
}

/// 单个几何体的图元分解。块参照不在此展开，返回空列表。
pub fn primitives(geometry: &Geometry) -> Vec<Primitive> {
    match geometry {
        Geometry::Line(line) => vec![Primitive::Segment {
            start: line.start,
            end: line.end,
        }],
        Geometry::Circle(circle) => vec![Primitive::Circle {
            center: circle.center,
            radius: circle.radius,
        }],
        Geometry::Arc(arc) => vec![Primitive::Arc {
            center: arc.center,
            radius: arc.radius,
            start_angle: arc.start_angle,
            end_angle: arc.end_angle,
        }],
        Geometry::Ellipse(ellipse) => polyline_segments(sample_ellipse(ellipse, ELLIPSE_SEGMENTS)),
        Geometry::Polyline(polyline) => polyline
            .segments()
            .map(|(start, end, bulge)| match bulge_to_arc(start, end, bulge) {
                Some(arc) if arc.sweep >= 0.0 => Primitive::Arc {
                    center: arc.center,
                    radius: arc.radius,
                    start_angle: arc.start_angle,
                    end_angle: arc.start_angle + arc.sweep,
                },
                Some(arc) => Primitive::Arc {
                    center: arc.center,
                    radius: arc.radius,
                    start_angle: arc.start_angle + arc.sweep,
                    end_angle: arc.start_angle,
                },
                None => Primitive::Segment { start, end },
            })
            .collect(),
        Geometry::Rectangle(rect) => closed_outline(&rect.corners()),
        Geometry::Point(point) => vec![Primitive::Segment {
            start: point.position,
            end: point.position,
        }],
        Geometry::Text(text) => closed_outline(&text.outline()),
        Geometry::Spline(spline) => {
            polyline_segments(sample_spline(spline, SPLINE_SEGMENTS_PER_SPAN))
        }
        Geometry::Dimension(dimension) => match dimension.layout() {
            Some(layout) => {
                let mut out: Vec<Primitive> = layout
                    .extension_lines
                    .iter()
                    .map(|(start, end)| Primitive::Segment {
                        start: *start,
                        end: *end,
                    })
                    .collect();
                out.push(Primitive::Segment {
                    start: layout.dimension_line.0,
                    end: layout.dimension_line.1,
                });
                out
            }
            None => Vec::new(),
        },
        Geometry::BlockReference(_) => Vec::new(),
    }
}

fn closed_outline(corners: &[Point2]) -> Vec<Primitive> {
    (0..corners.len())
        .map(|i| Primitive::Segment {
            start: corners[i],
            end: corners[(i + 1) % corners.len()],
        })
        .collect()
}

/// 在场景上下文中分解几何体，块参照按放置链递归展开（带循环与深度保护）。
pub fn scene_primitives(scene: &Scene, geometry: &Geometry) -> Vec<Primitive> {
    let mut out = Vec::new();
    let mut stack = Vec::new();
    collect_primitives(
        scene,
        geometry,
        &ComposedPlacement::default(),
        &mut stack,
        &mut out,
    );
    out
}

fn collect_primitives(
    scene: &Scene,
    geometry: &Geometry,
    placement: &ComposedPlacement,
    stack: &mut Vec<crate::document::BlockId>,
    out: &mut Vec<Primitive>,
) {
    let Geometry::BlockReference(reference) = geometry else {
        for primitive in primitives(geometry) {
            out.extend(primitive.transformed(placement, DEFAULT_CHORD_TOLERANCE));
        }
        return;
    };
    let Some(block) = scene.block(reference.block) else {
        return;
    };
    if stack.len() >= MAX_BLOCK_DEPTH || stack.contains(&block.id) {
        return;
    }
    stack.push(block.id);
    let inner = placement.push_inner(reference.placement(block.base_point));
    for draft in &block.entities {
        collect_primitives(scene, &draft.geometry, &inner, stack, out);
    }
    stack.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{
        BlockReference, Circle, EntityDraft, Line, Polyline, PolylineVertex, Rectangle,
    };
    use crate::geometry::Vector2;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn arc_distance_respects_sweep() {
        let arc = Primitive::Arc {
            center: Point2::ORIGIN,
            radius: 10.0,
            start_angle: 0.0,
            end_angle: FRAC_PI_2,
        };
        assert!(arc.distance_to(Point2::new(7.0, 7.0)) < 0.11);
        let behind = arc.distance_to(Point2::new(-10.0, 0.0));
        assert!((behind - Point2::new(-10.0, 0.0).distance_to(Point2::new(0.0, 10.0))).abs() < 1e-9);
    }

    #[test]
    fn segment_arc_intersection_filters_by_sweep() {
        let arc = Primitive::Arc {
            center: Point2::ORIGIN,
            radius: 5.0,
            start_angle: 0.0,
            end_angle: PI,
        };
        let horizontal = Primitive::Segment {
            start: Point2::new(-10.0, 3.0),
            end: Point2::new(10.0, 3.0),
        };
        assert_eq!(arc.intersections(&horizontal).len(), 2);
        let below = Primitive::Segment {
            start: Point2::new(-10.0, -3.0),
            end: Point2::new(10.0, -3.0),
        };
        assert!(arc.intersections(&below).is_empty());
    }

    #[test]
    fn circle_touches_rect_only_when_curve_overlaps() {
        let circle = Primitive::Circle {
            center: Point2::new(10.0, 10.0),
            radius: 5.0,
        };
        let crossing = Bounds2D::from_corners(Point2::new(0.0, 0.0), Point2::new(10.0, 10.0));
        assert!(circle.touches_rect(&crossing));
        let enclosed = Bounds2D::from_corners(Point2::new(9.0, 9.0), Point2::new(11.0, 11.0));
        assert!(!circle.touches_rect(&enclosed));
    }

    #[test]
    fn bulged_polyline_yields_arc_primitive() {
        let polyline = Geometry::Polyline(Polyline {
            vertices: vec![
                PolylineVertex::with_bulge(Point2::new(0.0, 0.0), 1.0),
                PolylineVertex::new(Point2::new(2.0, 0.0)),
                PolylineVertex::new(Point2::new(2.0, 2.0)),
            ],
            is_closed: false,
        });
        let parts = primitives(&polyline);
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[0], Primitive::Arc { .. }));
        assert!(matches!(parts[1], Primitive::Segment { .. }));
    }

    #[test]
    fn arc_sampling_respects_chord_tolerance() {
        let coarse = arc_segment_count(100.0, TAU, 1.0);
        let fine = arc_segment_count(100.0, TAU, 0.01);
        assert!(fine > coarse);
        let points = sample_arc(Point2::ORIGIN, 1.0, 0.0, PI, 0.001);
        assert!(points.first().unwrap().distance_to(Point2::new(1.0, 0.0)) < 1e-12);
        assert!(points.last().unwrap().distance_to(Point2::new(-1.0, 0.0)) < 1e-12);
    }

    #[test]
    fn bspline_is_clamped_to_end_points() {
        let spline = Spline {
            degree: 3,
            control_points: vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 2.0),
                Point2::new(3.0, 2.0),
                Point2::new(4.0, 0.0),
                Point2::new(6.0, 1.0),
            ],
            fit_points: Vec::new(),
            is_closed: false,
        };
        let points = sample_spline(&spline, 8);
        assert!(points.first().unwrap().distance_to(Point2::new(0.0, 0.0)) < 1e-9);
        assert!(points.last().unwrap().distance_to(Point2::new(6.0, 1.0)) < 1e-9);
    }

    #[test]
    fn block_primitives_are_placed_and_cycles_terminate() {
        let mut scene = Scene::new();
        let block = scene
            .add_block(
                "UNIT",
                Point2::ORIGIN,
                vec![
                    EntityDraft::new(
                        "0",
                        Geometry::Line(Line {
                            start: Point2::new(0.0, 0.0),
                            end: Point2::new(1.0, 0.0),
                        }),
                    ),
                    EntityDraft::new(
                        "0",
                        Geometry::Circle(Circle {
                            center: Point2::new(0.0, 0.0),
                            radius: 1.0,
                        }),
                    ),
                ],
            )
            .unwrap();
        let reference = Geometry::BlockReference(BlockReference {
            block,
            insert: Point2::new(10.0, 0.0),
            scale: Vector2::new(2.0, 2.0),
            rotation: FRAC_PI_2,
        });
        let parts = scene_primitives(&scene, &reference);
        assert_eq!(parts.len(), 2);
        match parts[0] {
            Primitive::Segment { start, end } => {
                assert!(start.distance_to(Point2::new(10.0, 0.0)) < 1e-9);
                assert!(end.distance_to(Point2::new(10.0, 2.0)) < 1e-9);
            }
            other => panic!("unexpected primitive: {other:?}"),
        }
        match parts[1] {
            Primitive::Circle { radius, .. } => assert!((radius - 2.0).abs() < 1e-9),
            other => panic!("unexpected primitive: {other:?}"),
        }

        let rect = Geometry::Rectangle(Rectangle {
            first: Point2::ORIGIN,
            second: Point2::new(1.0, 1.0),
        });
        assert_eq!(primitives(&rect).len(), 4);
    }
}
