use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::document::EntityId;
use crate::geometry::{Bounds2D, Point2};

/// 单个实体最多登记的格子数，超过后放入"超大"列表，每次查询都返回。
const MAX_CELLS_PER_ENTITY: i64 = 1024;
/// 单次查询最多遍历的格子数，超过后退化为线性扫描。
const MAX_QUERY_CELLS: i64 = 4096;
/// 实体数量低于该值时不做密度调整。
const MIN_ENTITIES_FOR_RESIZE: usize = 32;

/// 网格索引参数。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSettings {
    pub initial_cell_size: f64,
    /// 期望每个格子容纳的实体数。
    pub target_per_cell: f64,
    /// 实体数量相对上次定尺时的偏离倍数，超过即重建。
    pub rebuild_factor: f64,
    pub min_cell_size: f64,
    pub max_cell_size: f64,
}

impl Default for GridSettings {
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

/// 均匀网格空间索引。查询结果是候选超集，调用方需要做精确测试。
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    settings: GridSettings,
    cell_size: f64,
    cells: HashMap<(i64, i64), Vec<EntityId>>,
    bounds: HashMap<EntityId, Bounds2D>,
    oversized: HashSet<EntityId>,
    sized_for: usize,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(GridSettings::default())
    }
}

impl SpatialIndex {
    pub fn new(settings: GridSettings) -> Self {
        let cell_size = settings
            .initial_cell_size
            .clamp(settings.min_cell_size, settings.max_cell_size);
        Self {
            settings,
            cell_size,
            cells: HashMap::new(),
            bounds: HashMap::new(),
            oversized: HashSet::new(),
            sized_for: 0,
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    #[inline]
    pub fn bounds_of(&self, id: EntityId) -> Option<Bounds2D> {
        self.bounds.get(&id).copied()
    }

    pub fn insert(&mut self, id: EntityId, bounds: Bounds2D) {
        if self.bounds.contains_key(&id) {
            self.unlink(id);
        }
        self.bounds.insert(id, bounds);
        self.link(id, &bounds);
        self.resize_if_drifted();
    }

    pub fn update(&mut self, id: EntityId, bounds: Bounds2D) {
        self.insert(id, bounds);
    }

    pub fn remove(&mut self, id: EntityId) {
        if self.bounds.contains_key(&id) {
            self.unlink(id);
            self.bounds.remove(&id);
            self.resize_if_drifted();
        }
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.bounds.clear();
        self.oversized.clear();
        self.sized_for = 0;
    }

    /// 用完整条目集重建索引，并按当前密度重新定尺。
    pub fn rebuild<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (EntityId, Bounds2D)>,
    {
        self.clear();
        self.bounds.extend(entries);
        self.cell_size = self.recommended_cell_size();
        self.sized_for = self.bounds.len();
        self.relink_all();
    }

    /// 与 `rect` 相交的候选实体，按 ID 升序。
    pub fn query_rect(&self, rect: &Bounds2D) -> Vec<EntityId> {
        if rect.is_empty() {
            return Vec::new();
        }
        let (min, max) = self.cell_range(rect);
        let span = cell_span(min, max);
        let mut found: HashSet<EntityId> = HashSet::new();
        if span > i128::from(MAX_QUERY_CELLS) {
            found.extend(self.bounds.keys().copied());
        } else {
            for cx in min.0..=max.0 {
                for cy in min.1..=max.1 {
                    if let Some(ids) = self.cells.get(&(cx, cy)) {
                        found.extend(ids.iter().copied());
                    }
                }
            }
            found.extend(self.oversized.iter().copied());
        }
        let mut result: Vec<EntityId> = found
            .into_iter()
            .filter(|id| {
                self.bounds
                    .get(id)
                    .is_some_and(|bounds| bounds.intersects(rect))
            })
            .collect();
        result.sort_unstable();
        result
    }

    pub fn query_point(&self, point: Point2, radius: f64) -> Vec<EntityId> {
        let rect = Bounds2D::from_corners(point, point).expanded(radius.max(0.0));
        self.query_rect(&rect)
    }

    fn cell_of(&self, point: Point2) -> (i64, i64) {
        (
            (point.x() / self.cell_size).floor() as i64,
            (point.y() / self.cell_size).floor() as i64,
        )
    }

    fn cell_range(&self, rect: &Bounds2D) -> ((i64, i64), (i64, i64)) {
        (self.cell_of(rect.min()), self.cell_of(rect.max()))
    }

    fn link(&mut self, id: EntityId, bounds: &Bounds2D) {
        let (min, max) = self.cell_range(bounds);
        if cell_span(min, max) > i128::from(MAX_CELLS_PER_ENTITY) {
            self.oversized.insert(id);
            return;
        }
        for cx in min.0..=max.0 {
            for cy in min.1..=max.1 {
                self.cells.entry((cx, cy)).or_default().push(id);
            }
        }
    }

    fn unlink(&mut self, id: EntityId) {
        if self.oversized.remove(&id) {
            return;
        }
        let Some(bounds) = self.bounds.get(&id).copied() else {
            return;
        };
        let (min, max) = self.cell_range(&bounds);
        for cx in min.0..=max.0 {
            for cy in min.1..=max.1 {
                if let Some(ids) = self.cells.get_mut(&(cx, cy)) {
                    ids.retain(|other| *other != id);
                    if ids.is_empty() {
                        self.cells.remove(&(cx, cy));
                    }
                }
            }
        }
    }

    fn relink_all(&mut self) {
        self.cells.clear();
        self.oversized.clear();
        let entries: Vec<(EntityId, Bounds2D)> =
            self.bounds.iter().map(|(id, bounds)| (*id, *bounds)).collect();
        for (id, bounds) in entries {
            self.link(id, &bounds);
        }
    }

    fn resize_if_drifted(&mut self) {
        let count = self.bounds.len();
        if count < MIN_ENTITIES_FOR_RESIZE {
            return;
        }
        let ratio = count as f64 / self.sized_for.max(1) as f64;
        let factor = self.settings.rebuild_factor.max(1.0);
        if ratio > factor || ratio < 1.0 / factor {
            self.cell_size = self.recommended_cell_size();
            self.sized_for = count;
            self.relink_all();
        }
    }

    /// 根据文档范围与实体数估算格子边长，使每格平均约 `target_per_cell` 个实体。
    fn recommended_cell_size(&self) -> f64 {
        let count = self.bounds.len();
        if count == 0 {
            return self.cell_size;
        }
        let mut extent = Bounds2D::empty();
        for bounds in self.bounds.values() {
            extent.include_bounds(bounds);
        }
        let (w, h) = (extent.width(), extent.height());
        let area = if w * h > f64::EPSILON {
            w * h
        } else {
            w.max(h).powi(2)
        };
        let size = (area * self.settings.target_per_cell / count as f64).sqrt();
        if size.is_finite() && size > 0.0 {
            size.clamp(self.settings.min_cell_size, self.settings.max_cell_size)
        } else {
            self.settings.min_cell_size
        }
    }
}

/// 闭区间格子数。`as i64` 对极大坐标会饱和，两端相减可能越出 i64，因此用 i128 计算。
fn cell_span(min: (i64, i64), max: (i64, i64)) -> i128 {
    let columns = i128::from(max.0) - i128::from(min.0) + 1;
    let rows = i128::from(max.1) - i128::from(min.1) + 1;
    columns.saturating_mul(rows)
}
