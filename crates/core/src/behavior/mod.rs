//! Client-side behaviour tracking: interaction events are buffered and sent
//! to an [`EventSink`] in batches, either periodically, when the buffer
//! fills up, or when the page is hidden.
//!
//! Delivery is best effort. A failed batch goes back to the front of the
//! buffer, which is capped so repeated failures cannot grow it without bound.

use std::{
    cell::{Cell, RefCell},
    io::Write,
    rc::Rc,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    clock::{Clock, EpochClock},
    config::TrackerConfig,
    Result, SyncError,
};

/// Route fragments and the module they belong to, checked in order.
const MODULE_ROUTES: &[(&str, &str)] = &[
    ("/practice", "practice"),
    ("/reading", "reading"),
    ("/writing", "writing"),
    ("/grammar", "grammar"),
    ("/exam", "exam"),
    ("/vocabulary", "vocabulary"),
    ("/story", "story"),
    ("/tutor", "tutor"),
];

/// One recorded interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorEvent {
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_id: Option<u64>,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<Value>,
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Body sent to the sink: a session id and the events collected since the
/// last successful flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    pub session_id: String,
    pub events: Vec<BehaviorEvent>,
}

/// Where an event happened. Without a module the tracker falls back to the
/// current route.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub module: Option<String>,
    pub question_id: Option<u64>,
    pub material_id: Option<u64>,
}

impl EventContext {
    pub fn module(module: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            ..Default::default()
        }
    }

    pub fn question(question_id: u64) -> Self {
        Self {
            question_id: Some(question_id),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventExtra {
    pub duration_ms: Option<u64>,
    pub event_data: Option<Value>,
}

impl EventExtra {
    pub fn data(event_data: Value) -> Self {
        Self {
            event_data: Some(event_data),
            ..Default::default()
        }
    }

    pub fn duration(duration_ms: u64) -> Self {
        Self {
            duration_ms: Some(duration_ms),
            ..Default::default()
        }
    }
}

/// Destination for event batches.
pub trait EventSink {
    fn send(&mut self, batch: &EventBatch) -> Result<()>;
}

/// Writes each batch as one line of JSON.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn send(&mut self, batch: &EventBatch) -> Result<()> {
        serde_json::to_writer(&mut self.writer, batch)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps batches in memory. Clones share storage, and the sink can be told
/// to reject everything to exercise the retry path.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    batches: Rc<RefCell<Vec<EventBatch>>>,
    failing: Rc<Cell<bool>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    pub fn batches(&self) -> Vec<EventBatch> {
        self.batches.borrow().clone()
    }
}

impl EventSink for MemorySink {
    fn send(&mut self, batch: &EventBatch) -> Result<()> {
        if self.failing.get() {
            return Err(SyncError::Sink("memory sink is offline".to_string()));
        }
        self.batches.borrow_mut().push(batch.clone());
        Ok(())
    }
}

/// Maps a route path to the learning module it belongs to.
pub fn detect_module(path: &str) -> &'static str {
    MODULE_ROUTES
        .iter()
        .find(|(fragment, _)| path.contains(fragment))
        .map(|(_, module)| *module)
        .unwrap_or("other")
}

/// Buffers behaviour events for one session and flushes them to a sink.
pub struct BehaviorTracker<S> {
    config: TrackerConfig,
    session_id: String,
    sink: S,
    clock: Box<dyn Clock>,
    buffer: Vec<BehaviorEvent>,
    route: Option<String>,
    last_flush_ms: f64,
}

impl<S: EventSink> BehaviorTracker<S> {
    /// Creates a tracker with a fresh session id, stamping events with wall
    /// clock time.
    pub fn new(sink: S, config: TrackerConfig) -> Self {
        Self::with_clock(sink, config, EpochClock)
    }

    pub fn with_clock(sink: S, config: TrackerConfig, clock: impl Clock + 'static) -> Self {
        let now = clock.now_ms();
        Self {
            config,
            session_id: format!("{}-{}", now as u64, Uuid::new_v4().simple()),
            sink,
            clock: Box::new(clock),
            buffer: Vec::new(),
            route: None,
            last_flush_ms: now,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Events waiting to be sent.
    pub fn buffered(&self) -> &[BehaviorEvent] {
        &self.buffer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Records the route used to infer the module of untagged events.
    pub fn set_route(&mut self, path: impl Into<String>) {
        self.route = Some(path.into());
    }

    fn current_module(&self) -> String {
        match &self.route {
            Some(path) => detect_module(path).to_string(),
            None => "unknown".to_string(),
        }
    }

    /// Buffers one event and flushes if the buffer is full.
    pub fn track(&mut self, event_type: impl Into<String>, context: EventContext, extra: EventExtra) {
        let module = context.module.unwrap_or_else(|| self.current_module());
        self.buffer.push(BehaviorEvent {
            module,
            question_id: context.question_id,
            material_id: context.material_id,
            event_type: event_type.into(),
            event_data: extra.event_data,
            timestamp_ms: self.clock.now_ms().max(0.0) as u64,
            duration_ms: extra.duration_ms,
        });

        if self.buffer.len() >= self.config.max_buffer {
            self.flush_logged();
        }
    }

    /// Starts timing a question view; call [`QuestionView::end`] when the
    /// learner moves on.
    pub fn start_question_view(&self, question_id: u64, module: Option<&str>) -> QuestionView {
        QuestionView {
            question_id,
            module: module.map(str::to_string),
            started_ms: self.clock.now_ms(),
        }
    }

    /// Sends everything buffered. Returns how many events were delivered. On
    /// failure the events are put back ahead of anything tracked since.
    pub fn flush(&mut self) -> Result<usize> {
        self.last_flush_ms = self.clock.now_ms();
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let batch = EventBatch {
            session_id: self.session_id.clone(),
            events: std::mem::take(&mut self.buffer),
        };
        match self.sink.send(&batch) {
            Ok(()) => {
                tracing::debug!(events = batch.events.len(), "flushed behaviour events");
                Ok(batch.events.len())
            }
            Err(err) => {
                let mut restored = batch.events;
                restored.append(&mut self.buffer);
                restored.truncate(self.config.retry_cap);
                self.buffer = restored;
                Err(err)
            }
        }
    }

    /// Flushes when the flush interval has elapsed. Meant to be called from
    /// the host's timer or frame loop.
    pub fn poll(&mut self) {
        let elapsed = self.clock.now_ms() - self.last_flush_ms;
        if elapsed >= self.config.flush_interval_ms as f64 {
            self.flush_logged();
        }
    }

    /// The page or app went to the background.
    pub fn on_visibility_hidden(&mut self) {
        self.flush_logged();
    }

    /// Final flush, handing back the sink.
    pub fn shutdown(mut self) -> (S, Result<usize>) {
        let outcome = self.flush();
        (self.sink, outcome)
    }

    fn flush_logged(&mut self) {
        if let Err(err) = self.flush() {
            tracing::warn!(%err, retained = self.buffer.len(), "behaviour flush failed");
        }
    }
}

impl<S> std::fmt::Debug for BehaviorTracker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorTracker")
            .field("config", &self.config)
            .field("session_id", &self.session_id)
            .field("buffered", &self.buffer.len())
            .field("route", &self.route)
            .finish()
    }
}

/// Running timer for one question, finished with [`end`](Self::end).
#[derive(Debug, Clone)]
pub struct QuestionView {
    question_id: u64,
    module: Option<String>,
    started_ms: f64,
}

impl QuestionView {
    pub fn end<S: EventSink>(self, tracker: &mut BehaviorTracker<S>) {
        let duration = (tracker.clock.now_ms() - self.started_ms).max(0.0) as u64;
        tracker.track(
            "question_view",
            EventContext {
                module: self.module,
                question_id: Some(self.question_id),
                material_id: None,
            },
            EventExtra::duration(duration),
        );
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;

    fn tracker(config: TrackerConfig) -> (BehaviorTracker<MemorySink>, MemorySink, ManualClock) {
        let sink = MemorySink::new();
        let clock = ManualClock::starting_at(1_700_000_000_000.0);
        let tracker = BehaviorTracker::with_clock(sink.clone(), config, clock.clone());
        (tracker, sink, clock)
    }

    #[test]
    fn detects_module_from_route() {
        assert_eq!(detect_module("/app/practice/12"), "practice");
        assert_eq!(detect_module("/vocabulary"), "vocabulary");
        assert_eq!(detect_module("/settings"), "other");
    }

    #[test]
    fn track_stamps_time_and_resolves_module() {
        let (mut tracker, _, clock) = tracker(TrackerConfig::default());
        tracker.set_route("/story/chapter-2");
        clock.advance(25.0);
        tracker.track("page_turn", EventContext::default(), EventExtra::data(json!({ "page": 3 })));
        tracker.track("hint", EventContext::module("grammar"), EventExtra::default());

        let events = tracker.buffered();
        assert_eq!(events[0].module, "story");
        assert_eq!(events[0].timestamp_ms, 1_700_000_000_025);
        assert_eq!(events[0].event_data, Some(json!({ "page": 3 })));
        assert_eq!(events[1].module, "grammar");
    }

    #[test]
    fn module_is_unknown_without_route() {
        let (mut tracker, _, _) = tracker(TrackerConfig::default());
        tracker.track("open", EventContext::default(), EventExtra::default());
        assert_eq!(tracker.buffered()[0].module, "unknown");
    }

    #[test]
    fn full_buffer_flushes_immediately() {
        let (mut tracker, sink, _) = tracker(TrackerConfig {
            max_buffer: 3,
            ..TrackerConfig::default()
        });
        for _ in 0..3 {
            tracker.track("tap", EventContext::default(), EventExtra::default());
        }
        assert!(tracker.buffered().is_empty());
        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].events.len(), 3);
        assert_eq!(batches[0].session_id, tracker.session_id());
    }

    #[test]
    fn poll_flushes_after_interval() {
        let (mut tracker, sink, clock) = tracker(TrackerConfig::default());
        tracker.track("tap", EventContext::default(), EventExtra::default());
        clock.advance(9_999.0);
        tracker.poll();
        assert!(sink.batches().is_empty());
        clock.advance(1.0);
        tracker.poll();
        assert_eq!(sink.batches().len(), 1);
    }

    #[test]
    fn failed_flush_requeues_ahead_and_caps() {
        let (mut tracker, sink, _) = tracker(TrackerConfig {
            max_buffer: 100,
            retry_cap: 4,
            ..TrackerConfig::default()
        });
        sink.set_failing(true);
        for id in 0..3 {
            tracker.track("answer", EventContext::question(id), EventExtra::default());
        }
        assert!(tracker.flush().is_err());
        assert_eq!(tracker.buffered().len(), 3);

        for id in 3..6 {
            tracker.track("answer", EventContext::question(id), EventExtra::default());
        }
        tracker.on_visibility_hidden();
        let ids: Vec<_> = tracker.buffered().iter().map(|e| e.question_id).collect();
        assert_eq!(ids, vec![Some(0), Some(1), Some(2), Some(3)]);

        sink.set_failing(false);
        assert_eq!(tracker.flush().unwrap(), 4);
        assert!(tracker.buffered().is_empty());
    }

    #[test]
    fn question_view_reports_duration() {
        let (mut tracker, _, clock) = tracker(TrackerConfig::default());
        let view = tracker.start_question_view(42, Some("exam"));
        clock.advance(5_000.0);
        view.end(&mut tracker);

        let event = &tracker.buffered()[0];
        assert_eq!(event.event_type, "question_view");
        assert_eq!(event.question_id, Some(42));
        assert_eq!(event.module, "exam");
        assert_eq!(event.duration_ms, Some(5_000));
    }

    #[test]
    fn json_lines_sink_omits_absent_fields() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let batch = EventBatch {
            session_id: "s".to_string(),
            events: vec![BehaviorEvent {
                module: "reading".to_string(),
                question_id: None,
                material_id: Some(7),
                event_type: "scroll".to_string(),
                event_data: None,
                timestamp_ms: 1,
                duration_ms: None,
            }],
        };
        sink.send(&batch).unwrap();
        let line = String::from_utf8(sink.into_inner()).unwrap();
        assert!(line.ends_with('\n'));
        assert!(!line.contains("question_id"));
        let parsed: EventBatch = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed, batch);
    }

    #[test]
    fn shutdown_flushes_remaining_events() {
        let (mut tracker, _, _) = tracker(TrackerConfig::default());
        tracker.track("close", EventContext::default(), EventExtra::default());
        let (sink, outcome) = tracker.shutdown();
        assert_eq!(outcome.unwrap(), 1);
        assert_eq!(sink.batches().len(), 1);
    }
}
