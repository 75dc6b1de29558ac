use std::cell::Cell;
use std::ops::ControlFlow;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Source of elapsed time for the frame loop.
pub trait Clock {
    fn elapsed(&self) -> Duration;
}

pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.now.get()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTick {
    pub index: u64,
    /// Seconds since the scheduler started
    pub elapsed: f32,
    /// Seconds since the previous tick
    pub dt: f32,
}

/// Frame pacing with an injectable clock. Each tick completes before the
/// next is taken; there is no frame skipping, a slow frame just delays the
/// next one.
pub struct FrameScheduler<C: Clock> {
    clock: C,
    frames: u64,
    last: Duration,
}

impl<C: Clock> FrameScheduler<C> {
    pub fn new(clock: C) -> Self {
        let last = clock.elapsed();
        Self {
            clock,
            frames: 0,
            last,
        }
    }

    pub fn tick(&mut self) -> FrameTick {
        let now = self.clock.elapsed();
        let dt = now.saturating_sub(self.last);
        self.last = now;
        let tick = FrameTick {
            index: self.frames,
            elapsed: now.as_secs_f32(),
            dt: dt.as_secs_f32(),
        };
        self.frames += 1;
        tick
    }

    /// Run frames until `body` breaks. Returns the number of frames run.
    pub fn run_until(&mut self, mut body: impl FnMut(FrameTick) -> ControlFlow<()>) -> u64 {
        let start = self.frames;
        loop {
            let tick = self.tick();
            if body(tick).is_break() {
                break;
            }
        }
        self.frames - start
    }

    #[allow(dead_code)]
    pub fn frames(&self) -> u64 {
        self.frames
    }
}
