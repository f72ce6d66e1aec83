use crate::hub::{Fd, Hub, HubStep, Interest, IoHandler, TimerCallback, TimerId};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use task_queue_core::{Result, TransportError};
use tracing::{debug, trace};

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Default)]
struct ReadyQueue {
    events: Mutex<VecDeque<(Fd, Interest)>>,
    signal: Condvar,
}

/// Marks descriptors of a [`MemoryHub`] ready, from any thread.
#[derive(Clone, Default)]
pub struct HubWaker {
    queue: Arc<ReadyQueue>,
}

impl HubWaker {
    pub fn wake(&self, fd: Fd, interest: Interest) {
        self.queue.events.lock().push_back((fd, interest));
        self.queue.signal.notify_one();
    }

    fn pop(&self) -> Option<(Fd, Interest)> {
        self.queue.events.lock().pop_front()
    }

    /// Wait until something is ready or `deadline` passes.
    fn wait_until(&self, deadline: Instant) {
        let mut events = self.queue.events.lock();
        while events.is_empty() {
            if self.queue.signal.wait_until(&mut events, deadline).timed_out() {
                break;
            }
        }
    }

    fn clear(&self) {
        self.queue.events.lock().clear();
    }
}

impl fmt::Debug for HubWaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubWaker")
            .field("pending", &self.queue.events.lock().len())
            .finish()
    }
}

struct Timer {
    id: TimerId,
    period: Duration,
    due: Instant,
    callback: TimerCallback,
}

/// Single-threaded hub over in-process readiness events.
///
/// Each step fires due timers and then dispatches at most one ready
/// descriptor. With nothing ready it waits until the soonest timer is due,
/// but never longer than `idle_timeout`.
pub struct MemoryHub {
    readers: HashMap<Fd, IoHandler>,
    writers: HashMap<Fd, IoHandler>,
    timers: Vec<Timer>,
    next_timer_id: u64,
    waker: HubWaker,
    idle_timeout: Duration,
    steps_per_loop: Option<usize>,
    steps_taken: usize,
    loop_active: bool,
    loops_created: usize,
    close_error: Option<TransportError>,
    closed: bool,
}

impl MemoryHub {
    pub fn new() -> Self {
        MemoryHub {
            readers: HashMap::new(),
            writers: HashMap::new(),
            timers: Vec::new(),
            next_timer_id: 1,
            waker: HubWaker::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            steps_per_loop: None,
            steps_taken: 0,
            loop_active: false,
            loops_created: 0,
            close_error: None,
            closed: false,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// End each step sequence after `steps` steps.
    pub fn with_steps_per_loop(mut self, steps: usize) -> Self {
        self.steps_per_loop = Some(steps);
        self
    }

    /// Make the next `close` fail with `err` (after still releasing everything).
    pub fn fail_close_with(&mut self, err: TransportError) {
        self.close_error = Some(err);
    }

    pub fn waker(&self) -> HubWaker {
        self.waker.clone()
    }

    pub fn loops_created(&self) -> usize {
        self.loops_created
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    pub fn writer_count(&self) -> usize {
        self.writers.len()
    }

    /// Periods of the registered timers.
    pub fn timer_periods(&self) -> Vec<Duration> {
        self.timers.iter().map(|t| t.period).collect()
    }

    fn fire_due_timers(&mut self) -> Result<()> {
        let now = Instant::now();
        for timer in self.timers.iter_mut().filter(|t| t.due <= now) {
            timer.due = now + timer.period;
            trace!(timer = timer.id.0, "Timer fired");
            (timer.callback)()?;
        }
        Ok(())
    }

    fn next_deadline(&self) -> Instant {
        let idle = Instant::now() + self.idle_timeout;
        self.timers.iter().map(|t| t.due).fold(idle, Instant::min)
    }

    fn dispatch_ready(&mut self) -> Result<bool> {
        let Some((fd, interest)) = self.waker.pop() else {
            return Ok(false);
        };
        let handlers = match interest {
            Interest::Readable => &mut self.readers,
            Interest::Writable => &mut self.writers,
        };
        match handlers.get_mut(&fd) {
            Some(handler) => handler()?,
            None => trace!(%fd, ?interest, "Ready event for unregistered descriptor"),
        }
        Ok(true)
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub for MemoryHub {
    fn add_reader(&mut self, fd: Fd, handler: IoHandler) {
        self.readers.insert(fd, handler);
    }

    fn add_writer(&mut self, fd: Fd, handler: IoHandler) {
        self.writers.insert(fd, handler);
    }

    fn remove(&mut self, fd: Fd) {
        self.readers.remove(&fd);
        self.writers.remove(&fd);
    }

    fn call_repeatedly(&mut self, period: Duration, callback: TimerCallback) -> TimerId {
        let id = TimerId(self.next_timer_id);
        self.next_timer_id += 1;
        self.timers.push(Timer {
            id,
            period,
            due: Instant::now() + period,
            callback,
        });
        id
    }

    fn create_loop(&mut self) {
        self.loop_active = true;
        self.steps_taken = 0;
        self.loops_created += 1;
    }

    fn step(&mut self) -> Result<HubStep> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if !self.loop_active {
            return Ok(HubStep::Exhausted);
        }
        if let Some(limit) = self.steps_per_loop {
            if self.steps_taken >= limit {
                self.loop_active = false;
                return Ok(HubStep::Exhausted);
            }
        }
        self.steps_taken += 1;

        self.fire_due_timers()?;
        if self.dispatch_ready()? {
            return Ok(HubStep::Advanced);
        }

        self.waker.wait_until(self.next_deadline());
        self.fire_due_timers()?;
        self.dispatch_ready()?;
        Ok(HubStep::Advanced)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        debug!(
            readers = self.readers.len(),
            writers = self.writers.len(),
            timers = self.timers.len(),
            "Closing event loop hub"
        );
        self.readers.clear();
        self.writers.clear();
        self.timers.clear();
        self.waker.clear();
        self.loop_active = false;
        self.closed = true;

        match self.close_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl fmt::Debug for MemoryHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHub")
            .field("readers", &self.readers.len())
            .field("writers", &self.writers.len())
            .field("timers", &self.timers.len())
            .field("loops_created", &self.loops_created)
            .field("closed", &self.closed)
            .finish()
    }
}
