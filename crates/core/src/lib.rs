//! Core library for the Lingua Sync learning client.
//!
//! The centrepiece is [`TimelineCoordinator`], which plays any number of named
//! timelines against one master clock and reports when playback enters or
//! leaves each event. It is used for narrated reading, synchronised captions
//! and animated walkthroughs. Around it sit the small client utilities that
//! feed or consume it: time sources and frame scheduling, narration helpers,
//! the behaviour-event tracker and the codecs at the API boundary.

pub mod behavior;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod narration;
pub mod scheduler;
pub mod stream;
pub mod timeline;

pub use behavior::{
    BehaviorEvent, BehaviorTracker, EventBatch, EventContext, EventExtra, EventSink,
    JsonLinesSink, MemorySink,
};
pub use clock::{Clock, EpochClock, ManualClock, MasterClock, SystemClock};
pub use config::{CoordinatorConfig, SyncConfig, TrackerConfig};
pub use coordinator::{EventObserver, TimelineCoordinator};
pub use error::{Result, SyncError};
pub use narration::{WordBoundary, WordTracker};
pub use scheduler::{FrameRequest, FrameScheduler, IntervalScheduler, ManualScheduler};
pub use stream::SseDecoder;
pub use timeline::{ActiveEvent, ActiveEventSet, EventKind, Timeline, TimelineEvent};
