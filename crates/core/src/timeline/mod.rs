use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Result, SyncError};

/// An interval `[start_ms, end_ms)` on a timeline carrying an opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent<T> {
    pub start_ms: u64,
    pub end_ms: u64,
    pub data: T,
}

impl<T> TimelineEvent<T> {
    /// Builds an event, rejecting empty or inverted intervals.
    pub fn new(start_ms: u64, end_ms: u64, data: T) -> Result<Self> {
        let event = Self {
            start_ms,
            end_ms,
            data,
        };
        event.validate("", 0)?;
        Ok(event)
    }

    /// Half-open membership test.
    pub fn contains(&self, ms: f64) -> bool {
        ms >= self.start_ms as f64 && ms < self.end_ms as f64
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    pub(crate) fn validate(&self, timeline: &str, index: usize) -> Result<()> {
        if self.end_ms <= self.start_ms {
            return Err(SyncError::MalformedEvent {
                timeline: timeline.to_string(),
                index,
                start_ms: self.start_ms,
                end_ms: self.end_ms,
            });
        }
        Ok(())
    }
}

/// A named, ordered list of events. Order is whatever the caller supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline<T> {
    pub name: String,
    pub events: Vec<TimelineEvent<T>>,
}

impl<T> Timeline<T> {
    pub fn new(name: impl Into<String>, events: Vec<TimelineEvent<T>>) -> Self {
        Self {
            name: name.into(),
            events,
        }
    }

    /// End of the latest event, or zero for an empty timeline.
    pub fn end_ms(&self) -> u64 {
        latest_end(&self.events)
    }
}

/// Largest `end_ms` in `events`, zero when there are none.
pub(crate) fn latest_end<T>(events: &[TimelineEvent<T>]) -> u64 {
    events.iter().map(|event| event.end_ms).max().unwrap_or(0)
}

/// Direction of a membership transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Enter,
    Leave,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Enter => "enter",
            EventKind::Leave => "leave",
        }
    }
}

/// Notification handed to the coordinator's observer.
#[derive(Debug)]
pub struct ActiveEvent<'a, T> {
    pub timeline: &'a str,
    /// Position of `event` within its timeline's list.
    pub index: usize,
    pub event: &'a TimelineEvent<T>,
    pub kind: EventKind,
}

/// Indices of the events last observed inside their interval.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActiveEventSet {
    indices: BTreeSet<usize>,
}

impl ActiveEventSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    /// Returns `true` if the index was not active before.
    pub fn insert(&mut self, index: usize) -> bool {
        self.indices.insert(index)
    }

    /// Returns `true` if the index was active before.
    pub fn remove(&mut self, index: usize) -> bool {
        self.indices.remove(&index)
    }

    pub fn clear(&mut self) {
        self.indices.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Active indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }
}
