//! 帧调度器：唯一的动画循环，聚合脏标记，按优先级每帧调用一次各登记者的渲染回调。
//!
//! 单线程协作式，登记表用 `Rc<RefCell<..>>` 共享；回调执行期间不持有登记表的借用，
//! 因此回调内注销其他登记者会立即生效，本帧不再调用被注销者。

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use dxv_config::SchedulerConfig;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrantId(u64);

impl RegistrantId {
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 优先级层级，数值小的先渲染。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Background = 0,
    Entities = 1,
    Overlays = 2,
    Interface = 3,
}

/// 共享脏标记。多次 `mark` 在一帧内只触发一次渲染，同时唤醒调度循环。
#[derive(Debug, Clone)]
pub struct DirtyFlag {
    dirty: Rc<Cell<bool>>,
    wake: Rc<Cell<bool>>,
}

impl DirtyFlag {
    #[inline]
    pub fn mark(&self) {
        self.dirty.set(true);
        self.wake.set(true);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// 读取并清除。
    #[inline]
    pub fn take(&self) -> bool {
        self.dirty.replace(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame: u64,
    pub now: Instant,
    pub delta: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TickReport {
    pub frame: Option<u64>,
    pub rendered: Vec<RegistrantId>,
    pub skipped: bool,
}

impl TickReport {
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.frame.is_none() && !self.skipped
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    pub target_fps: f64,
    pub fps_window: usize,
    pub skip_frames_when_over_budget: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            target_fps: if config.target_fps > 0.0 {
                config.target_fps
            } else {
                60.0
            },
            fps_window: config.fps_window.max(1),
            skip_frames_when_over_budget: config.skip_frames_when_over_budget,
        }
    }
}

impl SchedulerSettings {
    /// 单帧预算，60 Hz 时约 16.67 ms。
    pub fn frame_budget(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps)
    }
}

type DirtyPredicate = Box<dyn FnMut() -> bool>;
type RenderCallback = Box<dyn FnMut(&FrameInfo)>;
type FpsCallback = Box<dyn FnMut(f64)>;

struct Slot {
    dirty: DirtyPredicate,
    render: RenderCallback,
}

struct Entry {
    id: RegistrantId,
    name: String,
    priority: Priority,
    slot: Rc<RefCell<Slot>>,
}

#[derive(Default)]
struct Registry {
    entries: Vec<Entry>,
    next_id: u64,
}

impl Registry {
    fn contains(&self, id: RegistrantId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    fn remove(&mut self, id: RegistrantId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }
}

/// 登记句柄，可在任意时刻（包括其他回调执行中）注销。
#[derive(Clone)]
pub struct SchedulerHandle {
    id: RegistrantId,
    registry: Weak<RefCell<Registry>>,
}

impl SchedulerHandle {
    #[inline]
    pub fn id(&self) -> RegistrantId {
        self.id
    }

    pub fn is_registered(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.borrow().contains(self.id))
    }

    pub fn unregister(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.borrow_mut().remove(self.id);
        if removed {
            debug!(id = %self.id, "注销渲染回调");
        }
        removed
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle").field("id", &self.id).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct FpsMeter {
    window: usize,
    intervals: VecDeque<Duration>,
    total: Duration,
    last: Option<Instant>,
}

impl FpsMeter {
    fn new(window: usize) -> Self {
        Self {
            window,
            intervals: VecDeque::with_capacity(window),
            total: Duration::ZERO,
            last: None,
        }
    }

    fn record(&mut self, now: Instant) -> Duration {
        let delta = self
            .last
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        if self.last.is_some() {
            self.intervals.push_back(delta);
            self.total += delta;
            while self.intervals.len() > self.window {
                if let Some(oldest) = self.intervals.pop_front() {
                    self.total -= oldest;
                }
            }
        }
        self.last = Some(now);
        delta
    }

    fn fps(&self) -> Option<f64> {
        if self.intervals.is_empty() || self.total.is_zero() {
            return None;
        }
        Some(self.intervals.len() as f64 / self.total.as_secs_f64())
    }

    /// 循环停止后下一帧的间隔不计入统计。
    fn pause(&mut self) {
        self.last = None;
    }
}

pub struct FrameScheduler {
    settings: SchedulerSettings,
    registry: Rc<RefCell<Registry>>,
    wake: Rc<Cell<bool>>,
    frame: u64,
    meter: FpsMeter,
    subscribers: Vec<(SubscriptionId, FpsCallback)>,
    next_subscription: u64,
    last_render_cost: Duration,
    skipped_last: bool,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(SchedulerSettings::default())
    }
}

impl FrameScheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        Self {
            meter: FpsMeter::new(settings.fps_window),
            settings,
            registry: Rc::new(RefCell::new(Registry::default())),
            wake: Rc::new(Cell::new(false)),
            frame: 0,
            subscribers: Vec::new(),
            next_subscription: 1,
            last_render_cost: Duration::ZERO,
            skipped_last: false,
        }
    }

    #[inline]
    pub fn settings(&self) -> SchedulerSettings {
        self.settings
    }

    /// 创建与本调度器关联的脏标记，标记时自动唤醒循环。
    pub fn dirty_flag(&self) -> DirtyFlag {
        DirtyFlag {
            dirty: Rc::new(Cell::new(false)),
            wake: Rc::clone(&self.wake),
        }
    }

    pub fn register<D, R>(
        &mut self,
        name: impl Into<String>,
        priority: Priority,
        dirty: D,
        render: R,
    ) -> SchedulerHandle
    where
        D: FnMut() -> bool + 'static,
        R: FnMut(&FrameInfo) + 'static,
    {
        let mut registry = self.registry.borrow_mut();
        registry.next_id += 1;
        let id = RegistrantId(registry.next_id);
        let name = name.into();
        debug!(id = %id, name = %name, ?priority, "登记渲染回调");
        registry.entries.push(Entry {
            id,
            name,
            priority,
            slot: Rc::new(RefCell::new(Slot {
                dirty: Box::new(dirty),
                render: Box::new(render),
            })),
        });
        self.wake.set(true);
        SchedulerHandle {
            id,
            registry: Rc::downgrade(&self.registry),
        }
    }

    /// 以共享脏标记为谓词登记，每次渲染前清除标记。
    pub fn register_flag<R>(
        &mut self,
        name: impl Into<String>,
        priority: Priority,
        flag: &DirtyFlag,
        render: R,
    ) -> SchedulerHandle
    where
        R: FnMut(&FrameInfo) + 'static,
    {
        let flag = flag.clone();
        self.register(name, priority, move || flag.take(), render)
    }

    pub fn unregister(&mut self, id: RegistrantId) -> bool {
        self.registry.borrow_mut().remove(id)
    }

    pub fn registrant_names(&self) -> Vec<String> {
        self.registry
            .borrow()
            .entries
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.wake.get()
    }

    /// 手动唤醒循环，例如视口尺寸变化后。
    pub fn start(&self) {
        self.wake.set(true);
    }

    pub fn stop(&mut self) {
        self.wake.set(false);
        self.meter.pause();
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn fps(&self) -> Option<f64> {
        self.meter.fps()
    }

    pub fn subscribe_fps<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(f64) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe_fps(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    /// 推进一帧。轮询全部脏谓词，每个脏登记者按优先级恰好渲染一次；
    /// 没有任何登记者为脏时循环停止。上一帧超出预算时跳过本帧（连续最多跳过一帧）。
    pub fn tick(&mut self, now: Instant) -> TickReport {
        if !self.is_running() {
            return TickReport::default();
        }
        if self.settings.skip_frames_when_over_budget
            && !self.skipped_last
            && self.last_render_cost > self.settings.frame_budget()
        {
            self.skipped_last = true;
            debug!(
                cost_us = self.last_render_cost.as_micros() as u64,
                "上一帧超出预算，跳过本帧"
            );
            return TickReport {
                frame: None,
                rendered: Vec::new(),
                skipped: true,
            };
        }
        self.skipped_last = false;

        let mut ordered: Vec<(Priority, RegistrantId, Rc<RefCell<Slot>>)> = self
            .registry
            .borrow()
            .entries
            .iter()
            .map(|entry| (entry.priority, entry.id, Rc::clone(&entry.slot)))
            .collect();
        ordered.sort_by_key(|(priority, id, _)| (*priority, *id));

        self.wake.set(false);
        let mut dirty = Vec::new();
        for (_, id, slot) in ordered {
            let is_dirty = (slot.borrow_mut().dirty)();
            if is_dirty {
                dirty.push((id, slot));
            }
        }
        if dirty.is_empty() {
            self.last_render_cost = Duration::ZERO;
            self.meter.pause();
            trace!("无脏登记者，循环停止");
            return TickReport::default();
        }

        self.frame += 1;
        let delta = self.meter.record(now);
        let info = FrameInfo {
            frame: self.frame,
            now,
            delta,
        };
        let started = Instant::now();
        let mut rendered = Vec::with_capacity(dirty.len());
        for (id, slot) in dirty {
            if !self.registry.borrow().contains(id) {
                continue;
            }
            (slot.borrow_mut().render)(&info);
            rendered.push(id);
        }
        self.last_render_cost = started.elapsed();
        // 本帧渲染后仍需下一帧确认是否还有脏登记者。
        self.wake.set(true);

        if let Some(fps) = self.meter.fps() {
            for (_, callback) in &mut self.subscribers {
                callback(fps);
            }
        }
        TickReport {
            frame: Some(self.frame),
            rendered,
            skipped: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnMut(&FrameInfo)>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let shared = Rc::clone(&log);
        let make = move |name: &'static str| -> Box<dyn FnMut(&FrameInfo)> {
            let log = Rc::clone(&shared);
            Box::new(move |_: &FrameInfo| log.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn dirty_signals_collapse_into_one_render() {
        let mut scheduler = FrameScheduler::default();
        let (log, make) = recorder();
        let flag = scheduler.dirty_flag();
        scheduler.register_flag("entities", Priority::Entities, &flag, make("entities"));
        flag.mark();
        flag.mark();
        flag.mark();
        let report = scheduler.tick(Instant::now());
        assert_eq!(report.rendered.len(), 1);
        assert_eq!(*log.borrow(), vec!["entities"]);
    }

    #[test]
    fn renders_in_priority_order() {
        let mut scheduler = FrameScheduler::default();
        let (log, make) = recorder();
        scheduler.register("overlay", Priority::Overlays, || true, make("overlay"));
        scheduler.register("background", Priority::Background, || true, make("background"));
        scheduler.register("entities", Priority::Entities, || true, make("entities"));
        scheduler.tick(Instant::now());
        assert_eq!(*log.borrow(), vec!["background", "entities", "overlay"]);
    }

    #[test]
    fn loop_stops_when_clean_and_restarts_on_mark() {
        let mut scheduler = FrameScheduler::default();
        let (log, make) = recorder();
        let flag = scheduler.dirty_flag();
        scheduler.register_flag("entities", Priority::Entities, &flag, make("entities"));
        let now = Instant::now();
        assert!(scheduler.is_running());
        assert!(scheduler.tick(now).is_idle());
        assert!(!scheduler.is_running());
        assert!(scheduler.tick(now).is_idle());
        flag.mark();
        assert!(scheduler.is_running());
        assert_eq!(scheduler.tick(now).frame, Some(1));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn unregister_mid_tick_takes_effect_immediately() {
        let mut scheduler = FrameScheduler::default();
        let (log, make) = recorder();
        let victim = scheduler.register("victim", Priority::Overlays, || true, make("victim"));
        let killer_log = Rc::clone(&log);
        let target = victim.clone();
        scheduler.register(
            "killer",
            Priority::Background,
            || true,
            move |_| {
                killer_log.borrow_mut().push("killer");
                target.unregister();
            },
        );
        let report = scheduler.tick(Instant::now());
        assert_eq!(*log.borrow(), vec!["killer"]);
        assert_eq!(report.rendered.len(), 1);
        assert!(!victim.is_registered());
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn fps_is_published_to_subscribers() {
        let mut scheduler = FrameScheduler::new(SchedulerSettings {
            target_fps: 60.0,
            fps_window: 4,
            skip_frames_when_over_budget: false,
        });
        scheduler.register("always", Priority::Entities, || true, |_| {});
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let subscription = scheduler.subscribe_fps(move |fps| sink.borrow_mut().push(fps));
        let start = Instant::now();
        for i in 0..5u64 {
            scheduler.tick(start + Duration::from_millis(20 * i));
        }
        let fps = scheduler.fps().unwrap();
        assert!((fps - 50.0).abs() < 1e-6, "{fps}");
        assert_eq!(seen.borrow().len(), 4);
        assert!(scheduler.unsubscribe_fps(subscription));
        scheduler.tick(start + Duration::from_millis(100));
        assert_eq!(seen.borrow().len(), 4);
    }

    #[test]
    fn over_budget_frame_skips_next_tick() {
        let mut scheduler = FrameScheduler::new(SchedulerSettings {
            target_fps: 1000.0,
            fps_window: 8,
            skip_frames_when_over_budget: true,
        });
        scheduler.register("slow", Priority::Entities, || true, |_| {
            std::thread::sleep(Duration::from_millis(5));
        });
        let now = Instant::now();
        assert!(scheduler.tick(now).frame.is_some());
        assert!(scheduler.tick(now).skipped);
        assert!(scheduler.tick(now).frame.is_some());
    }
}
