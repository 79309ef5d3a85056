//! Multi-timeline coordinator driven by a single master clock.
//!
//! Named timelines are registered at any time, including while playing. Each
//! frame the master position is recomputed and every event of every timeline
//! is tested against it; transitions into and out of an event's interval are
//! reported to the observer as [`EventKind::Enter`] / [`EventKind::Leave`].
//!
//! Emission order inside one evaluation is registration order of the
//! timelines, then list order of the events.

use std::fmt;

use indexmap::IndexMap;

use crate::{
    clock::{Clock, MasterClock},
    config::CoordinatorConfig,
    scheduler::{FrameRequest, FrameScheduler},
    timeline::{latest_end, ActiveEvent, ActiveEventSet, EventKind, TimelineEvent},
    Result, SyncError,
};

/// Callback receiving enter/leave notifications.
pub type EventObserver<T> = Box<dyn FnMut(&ActiveEvent<'_, T>)>;

struct TimelineEntry<T> {
    events: Vec<TimelineEvent<T>>,
    active: ActiveEventSet,
}

impl<T> TimelineEntry<T> {
    fn new(events: Vec<TimelineEvent<T>>) -> Self {
        Self {
            events,
            active: ActiveEventSet::new(),
        }
    }

    /// Tests every event against `ms` and reports transitions.
    fn evaluate(&mut self, name: &str, ms: f64, observer: &mut Option<EventObserver<T>>) {
        for (index, event) in self.events.iter().enumerate() {
            let is_inside = event.contains(ms);
            let was_active = self.active.contains(index);

            let kind = if is_inside && !was_active {
                self.active.insert(index);
                EventKind::Enter
            } else if !is_inside && was_active {
                self.active.remove(index);
                EventKind::Leave
            } else {
                continue;
            };

            tracing::trace!(timeline = name, index, kind = kind.as_str(), ms, "timeline transition");
            if let Some(observer) = observer.as_mut() {
                observer(&ActiveEvent {
                    timeline: name,
                    index,
                    event,
                    kind,
                });
            }
        }
    }

    /// Reports a leave for every active event and empties the set.
    fn leave_all(&mut self, name: &str, observer: &mut Option<EventObserver<T>>) {
        for index in self.active.iter() {
            if let (Some(observer), Some(event)) = (observer.as_mut(), self.events.get(index)) {
                observer(&ActiveEvent {
                    timeline: name,
                    index,
                    event,
                    kind: EventKind::Leave,
                });
            }
        }
        self.active.clear();
    }
}

/// Owns the master clock, the named timelines and their active sets.
///
/// One instance per playback session. The coordinator is single-threaded: it
/// is driven by frames from its [`FrameScheduler`] and by direct calls from
/// its owner, and every call runs to completion before the next frame.
pub struct TimelineCoordinator<T> {
    config: CoordinatorConfig,
    clock: Box<dyn Clock>,
    scheduler: Box<dyn FrameScheduler>,
    master: MasterClock,
    timelines: IndexMap<String, TimelineEntry<T>>,
    pending_frame: Option<FrameRequest>,
    observer: Option<EventObserver<T>>,
}

impl<T> TimelineCoordinator<T> {
    /// Creates a paused coordinator at position zero.
    pub fn new(clock: impl Clock + 'static, scheduler: impl FrameScheduler + 'static) -> Self {
        Self {
            config: CoordinatorConfig::default(),
            clock: Box::new(clock),
            scheduler: Box::new(scheduler),
            master: MasterClock::new(),
            timelines: IndexMap::new(),
            pending_frame: None,
            observer: None,
        }
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Installs the enter/leave observer.
    pub fn on_event(mut self, observer: impl FnMut(&ActiveEvent<'_, T>) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn set_observer(&mut self, observer: Option<EventObserver<T>>) {
        self.observer = observer;
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Last computed master position in milliseconds.
    pub fn current_ms(&self) -> f64 {
        self.master.current_ms()
    }

    pub fn is_playing(&self) -> bool {
        self.master.is_running()
    }

    /// Whether a frame is outstanding with the scheduler.
    pub fn has_pending_frame(&self) -> bool {
        self.pending_frame.is_some()
    }

    /// Stores `events` under `name`, replacing any previous list and clearing
    /// that timeline's active set. A new name is appended to the evaluation
    /// order; an existing one keeps its place.
    ///
    /// Replacing a list is silent: events that were active under the old list
    /// get no `Leave`. This is the one place where an observer can see two
    /// `Enter`s for the same `(timeline, index)` without a `Leave` between
    /// them. Call [`unregister_timeline`](Self::unregister_timeline) first to
    /// close the old events instead.
    ///
    /// Fails without touching the current registration if any event has an
    /// empty interval.
    pub fn register_timeline(
        &mut self,
        name: impl Into<String>,
        events: Vec<TimelineEvent<T>>,
    ) -> Result<()> {
        let name = name.into();
        for (index, event) in events.iter().enumerate() {
            event.validate(&name, index)?;
        }

        tracing::debug!(timeline = %name, events = events.len(), "registering timeline");
        self.timelines.insert(name.clone(), TimelineEntry::new(events));

        if self.config.evaluate_on_register {
            let ms = self.master.current_ms();
            if let Some(entry) = self.timelines.get_mut(&name) {
                entry.evaluate(&name, ms, &mut self.observer);
            }
        }
        Ok(())
    }

    /// Removes a timeline. Unknown names are ignored. Returns whether a
    /// timeline was removed.
    pub fn unregister_timeline(&mut self, name: &str) -> bool {
        let Some(mut entry) = self.timelines.shift_remove(name) else {
            return false;
        };

        tracing::debug!(timeline = name, active = entry.active.len(), "unregistering timeline");
        if self.config.leave_on_unregister {
            entry.leave_all(name, &mut self.observer);
        }
        true
    }

    /// Starts advancing the master clock from its current position.
    pub fn play(&mut self) {
        if !self.master.start(self.clock.now_ms()) {
            return;
        }
        tracing::debug!(from_ms = self.master.current_ms(), "playback started");
        self.request_frame();
    }

    /// Stops advancing. The position keeps its last computed value and no
    /// further frame is processed until [`play`](Self::play).
    pub fn pause(&mut self) {
        if !self.master.freeze() {
            return;
        }
        if let Some(request) = self.pending_frame.take() {
            self.scheduler.cancel_frame(request);
        }
        tracing::debug!(at_ms = self.master.current_ms(), "playback paused");
    }

    /// Jumps the master clock to `ms` and re-evaluates every timeline there
    /// from a clean slate, so intervals containing `ms` report `Enter`.
    /// Events active before the jump report `Leave` first, which keeps
    /// enter/leave strictly paired for observers.
    ///
    /// Negative targets are clamped to zero; non-finite targets are rejected
    /// and leave the coordinator unchanged.
    pub fn seek(&mut self, ms: f64) -> Result<()> {
        if !ms.is_finite() {
            return Err(SyncError::InvalidSeek(ms));
        }
        let target = if ms < 0.0 {
            tracing::warn!(requested_ms = ms, "negative seek clamped to zero");
            0.0
        } else {
            ms
        };

        self.master.reanchor(self.clock.now_ms(), target);
        for (name, entry) in self.timelines.iter_mut() {
            entry.leave_all(name, &mut self.observer);
        }
        self.evaluate_all(target);
        Ok(())
    }

    /// Same as [`seek`](Self::seek).
    pub fn set_current_ms(&mut self, ms: f64) -> Result<()> {
        self.seek(ms)
    }

    /// Processes a frame delivered by the scheduler. Frames other than the
    /// outstanding one (cancelled by a pause, or stale) are ignored.
    ///
    /// Returns whether the frame advanced the clock.
    pub fn on_frame(&mut self, request: FrameRequest) -> bool {
        if self.pending_frame != Some(request) {
            tracing::trace!(frame = request.id(), "ignoring stale frame");
            return false;
        }
        self.pending_frame = None;
        if !self.master.is_running() {
            return false;
        }

        let ms = self.master.sample(self.clock.now_ms());
        self.evaluate_all(ms);
        self.request_frame();
        true
    }

    pub fn is_active(&self, name: &str, index: usize) -> bool {
        self.timelines
            .get(name)
            .map(|entry| entry.active.contains(index))
            .unwrap_or(false)
    }

    /// Active event indices of `name` in ascending order.
    pub fn active_indices(&self, name: &str) -> Vec<usize> {
        self.timelines
            .get(name)
            .map(|entry| entry.active.iter().collect())
            .unwrap_or_default()
    }

    pub fn timeline(&self, name: &str) -> Option<&[TimelineEvent<T>]> {
        self.timelines.get(name).map(|entry| entry.events.as_slice())
    }

    /// Registered names in evaluation order.
    pub fn timeline_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.timelines.keys().map(String::as_str)
    }

    pub fn timeline_count(&self) -> usize {
        self.timelines.len()
    }

    /// End of the latest event across all timelines.
    pub fn duration_ms(&self) -> u64 {
        self.timelines
            .values()
            .map(|entry| latest_end(&entry.events))
            .max()
            .unwrap_or(0)
    }

    fn evaluate_all(&mut self, ms: f64) {
        for (name, entry) in self.timelines.iter_mut() {
            entry.evaluate(name, ms, &mut self.observer);
        }
    }

    fn request_frame(&mut self) {
        if self.pending_frame.is_none() {
            self.pending_frame = Some(self.scheduler.request_frame());
        }
    }
}

impl<T> fmt::Debug for TimelineCoordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimelineCoordinator")
            .field("config", &self.config)
            .field("master", &self.master)
            .field("timelines", &self.timelines.keys().collect::<Vec<_>>())
            .field("pending_frame", &self.pending_frame)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
