//! Frame scheduling seam between the coordinator and its host.
//!
//! The coordinator never loops on its own. It asks a [`FrameScheduler`] for
//! the next frame and the host hands the resulting [`FrameRequest`] back via
//! [`TimelineCoordinator::on_frame`](crate::TimelineCoordinator::on_frame)
//! when that frame is due.

use std::{
    cell::RefCell,
    collections::VecDeque,
    rc::Rc,
    thread,
    time::{Duration, Instant},
};

/// Opaque handle naming one requested frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameRequest(u64);

impl FrameRequest {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Host facility that delivers frames (a display-refresh callback, a timer,
/// a test harness).
pub trait FrameScheduler {
    /// Queues one frame and returns its handle.
    fn request_frame(&mut self) -> FrameRequest;

    /// Drops a queued frame. Unknown or already delivered handles are
    /// ignored.
    fn cancel_frame(&mut self, request: FrameRequest);
}

#[derive(Debug, Default)]
struct FrameQueue {
    next_id: u64,
    pending: VecDeque<FrameRequest>,
}

impl FrameQueue {
    fn push(&mut self) -> FrameRequest {
        self.next_id += 1;
        let request = FrameRequest(self.next_id);
        self.pending.push_back(request);
        request
    }

    fn remove(&mut self, request: FrameRequest) {
        self.pending.retain(|pending| *pending != request);
    }
}

/// Test scheduler: requests accumulate in a shared queue and are delivered
/// only when the test pops them.
#[derive(Debug, Default, Clone)]
pub struct ManualScheduler {
    queue: Rc<RefCell<FrameQueue>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns the oldest queued frame.
    pub fn next_frame(&self) -> Option<FrameRequest> {
        self.queue.borrow_mut().pending.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().pending.len()
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> FrameRequest {
        self.queue.borrow_mut().push()
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        self.queue.borrow_mut().remove(request);
    }
}

/// Fixed-rate scheduler for hosts without a display callback. Clones share
/// the queue; the driving loop calls [`wait_next`](Self::wait_next).
#[derive(Debug, Clone)]
pub struct IntervalScheduler {
    interval: Duration,
    queue: Rc<RefCell<FrameQueue>>,
    next_deadline: Rc<RefCell<Option<Instant>>>,
}

impl IntervalScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            queue: Rc::default(),
            next_deadline: Rc::default(),
        }
    }

    pub fn from_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms.max(1)))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleeps until the next frame is due and returns it. Returns `None`
    /// right away when nothing is queued.
    pub fn wait_next(&self) -> Option<FrameRequest> {
        let request = self.queue.borrow_mut().pending.pop_front()?;
        let deadline = self.next_deadline.borrow_mut().take();
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
        }
        Some(request)
    }
}

impl FrameScheduler for IntervalScheduler {
    fn request_frame(&mut self) -> FrameRequest {
        let mut deadline = self.next_deadline.borrow_mut();
        if deadline.is_none() {
            *deadline = Some(Instant::now() + self.interval);
        }
        self.queue.borrow_mut().push()
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        let mut queue = self.queue.borrow_mut();
        queue.remove(request);
        if queue.pending.is_empty() {
            self.next_deadline.borrow_mut().take();
        }
    }
}
