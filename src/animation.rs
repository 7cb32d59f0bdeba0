//! Fixed-rate playback scheduling and the animator lifecycle.
//!
//! The host's display callback fires at whatever rate the display refreshes
//! (commonly ~60 Hz, throttled when backgrounded). [`FrameScheduler::tick`]
//! turns that into one frame advance per fixed interval by carrying the
//! leftover time forward instead of resetting to the callback timestamp.

use tracing::debug;

/// Lifecycle of an animator.
///
/// `Idle -> Loading -> Playing -> Stopped`, with `Loading -> Failed` when no
/// frame could be loaded. Any state can be stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimatorPhase {
    /// Mounted, nothing requested yet
    Idle,
    /// Frames are being fetched
    Loading,
    /// Scheduler running
    Playing,
    /// Every frame failed to load
    Failed,
    /// Torn down; terminal
    Stopped,
}

/// Named events driving [`AnimatorPhase`] transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimatorEvent {
    LoadRequested,
    FramesReady,
    LoadFailed,
    StopRequested,
}

impl AnimatorPhase {
    /// Next phase after `event`, or `None` when the event does not apply.
    ///
    /// ```rust
    /// use backdrop_core_view::{AnimatorEvent, AnimatorPhase};
    ///
    /// let phase = AnimatorPhase::Idle;
    /// assert_eq!(phase.on(AnimatorEvent::FramesReady), None);
    /// assert_eq!(phase.on(AnimatorEvent::LoadRequested), Some(AnimatorPhase::Loading));
    /// ```
    pub fn on(self, event: AnimatorEvent) -> Option<AnimatorPhase> {
        use AnimatorEvent::*;
        use AnimatorPhase::*;

        match (self, event) {
            (Idle, LoadRequested) => Some(Loading),
            (Loading, FramesReady) => Some(Playing),
            (Loading, LoadFailed) => Some(Failed),
            (Stopped, StopRequested) => None,
            (_, StopRequested) => Some(Stopped),
            _ => None,
        }
    }

    /// True once the animator can never draw again.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, AnimatorPhase::Stopped | AnimatorPhase::Failed)
    }
}

/// Playback position, owned by the scheduler.
///
/// The renderer reads [`PlaybackState::current_frame`] but never writes it.
/// The index only moves forward, modulo the frame count.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackState {
    current_frame: usize,
    last_tick_ms: f64,
    running: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackState {
    pub fn new() -> Self {
        Self {
            current_frame: 0,
            last_tick_ms: 0.0,
            running: false,
        }
    }

    /// Index of the frame that will be drawn next.
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    #[inline]
    pub fn last_tick_ms(&self) -> f64 {
        self.last_tick_ms
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Result of one display callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Less than one interval elapsed; re-arm without drawing
    Wait,
    /// Draw `frame`, then re-arm. The index has already advanced past it.
    Draw { frame: usize },
    /// Playback is not running; do not re-arm
    Halted,
}

impl Tick {
    /// Whether the host should request another display callback.
    #[inline]
    pub fn rearm(self) -> bool {
        !matches!(self, Tick::Halted)
    }
}

/// Fixed-timestep scheduler over a variable-rate callback.
///
/// ## Example
///
/// ```rust
/// use backdrop_core_view::{FrameScheduler, PlaybackState, Tick};
///
/// let scheduler = FrameScheduler::new(25, 3); // 40 ms per frame
/// let mut state = PlaybackState::new();
/// scheduler.start(&mut state, 1000.0);
///
/// assert_eq!(scheduler.tick(&mut state, 1000.0), Tick::Draw { frame: 0 });
/// assert_eq!(scheduler.tick(&mut state, 1016.0), Tick::Wait);
/// assert_eq!(scheduler.tick(&mut state, 1041.0), Tick::Draw { frame: 1 });
/// assert_eq!(state.current_frame(), 2);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct FrameScheduler {
    frame_interval_ms: f64,
    frame_count: usize,
}

impl FrameScheduler {
    /// Create a scheduler for `frame_count` frames at `fps`.
    pub fn new(fps: u32, frame_count: usize) -> Self {
        Self {
            frame_interval_ms: 1000.0 / fps.max(1) as f64,
            frame_count: frame_count.max(1),
        }
    }

    #[inline]
    pub fn frame_interval_ms(&self) -> f64 {
        self.frame_interval_ms
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Start playback at frame 0.
    ///
    /// The last tick is seeded one interval in the past so the first callback
    /// draws immediately.
    pub fn start(&self, state: &mut PlaybackState, now_ms: f64) {
        state.current_frame = 0;
        state.last_tick_ms = now_ms - self.frame_interval_ms;
        state.running = true;
        debug!(interval_ms = self.frame_interval_ms, frames = self.frame_count, "scheduler started");
    }

    /// Halt playback. Idempotent.
    pub fn stop(&self, state: &mut PlaybackState) {
        if state.running {
            state.running = false;
            debug!(frame = state.current_frame, "scheduler stopped");
        }
    }

    /// Handle one display callback with timestamp `now_ms`.
    pub fn tick(&self, state: &mut PlaybackState, now_ms: f64) -> Tick {
        if !state.running {
            return Tick::Halted;
        }

        let delta = now_ms - state.last_tick_ms;
        if delta < self.frame_interval_ms {
            return Tick::Wait;
        }

        // Keep the remainder so callback jitter does not accumulate as drift.
        state.last_tick_ms = now_ms - delta % self.frame_interval_ms;

        let frame = state.current_frame;
        state.current_frame = (frame + 1) % self.frame_count;
        Tick::Draw { frame }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic jitter source for callback timestamps.
    struct Lcg(u64);

    impl Lcg {
        fn next_unit(&mut self) -> f64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (self.0 >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    fn count_advances(fps: u32, period_ms: f64, jitter_ms: f64, duration_ms: f64) -> usize {
        let scheduler = FrameScheduler::new(fps, 7);
        let mut state = PlaybackState::new();
        let start = 5_000.0;
        scheduler.start(&mut state, start);

        let mut rng = Lcg(42);
        let mut t = start;
        let mut advances = 0;
        while t <= start + duration_ms {
            if let Tick::Draw { .. } = scheduler.tick(&mut state, t) {
                advances += 1;
            }
            t += period_ms + (rng.next_unit() * 2.0 - 1.0) * jitter_ms;
        }
        advances
    }

    #[test]
    fn test_phase_transitions() {
        use AnimatorEvent::*;
        use AnimatorPhase::*;

        assert_eq!(Idle.on(LoadRequested), Some(Loading));
        assert_eq!(Loading.on(FramesReady), Some(Playing));
        assert_eq!(Loading.on(LoadFailed), Some(Failed));
        assert_eq!(Playing.on(StopRequested), Some(Stopped));
        assert_eq!(Idle.on(StopRequested), Some(Stopped));

        // Double-start and out-of-order events are rejected
        assert_eq!(Loading.on(LoadRequested), None);
        assert_eq!(Playing.on(FramesReady), None);
        assert_eq!(Idle.on(FramesReady), None);
        assert_eq!(Stopped.on(LoadRequested), None);
        assert_eq!(Stopped.on(StopRequested), None);
        assert!(Stopped.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn test_index_cycles() {
        let scheduler = FrameScheduler::new(10, 4);
        let mut state = PlaybackState::new();
        scheduler.start(&mut state, 0.0);

        let mut drawn = Vec::new();
        for i in 0..12 {
            if let Tick::Draw { frame } = scheduler.tick(&mut state, i as f64 * 100.0) {
                drawn.push(frame);
            }
            assert!(state.current_frame() < 4);
        }
        assert_eq!(drawn, vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn test_single_frame_sequence() {
        let scheduler = FrameScheduler::new(24, 1);
        let mut state = PlaybackState::new();
        scheduler.start(&mut state, 0.0);
        for i in 0..5 {
            let tick = scheduler.tick(&mut state, i as f64 * 50.0);
            assert_eq!(tick, Tick::Draw { frame: 0 });
        }
    }

    #[test]
    fn test_wait_below_interval() {
        let scheduler = FrameScheduler::new(24, 10);
        let mut state = PlaybackState::new();
        scheduler.start(&mut state, 0.0);

        assert_eq!(scheduler.tick(&mut state, 0.0), Tick::Draw { frame: 0 });
        assert_eq!(scheduler.tick(&mut state, 16.7), Tick::Wait);
        assert_eq!(scheduler.tick(&mut state, 33.4), Tick::Wait);
        assert_eq!(state.current_frame(), 1);
        assert_eq!(scheduler.tick(&mut state, 50.1), Tick::Draw { frame: 1 });
    }

    #[test]
    fn test_remainder_carried_over() {
        let scheduler = FrameScheduler::new(25, 10); // 40 ms
        let mut state = PlaybackState::new();
        scheduler.start(&mut state, 0.0);
        scheduler.tick(&mut state, 0.0);

        // 50 ms late: keep the 10 ms overshoot
        scheduler.tick(&mut state, 50.0);
        assert_eq!(state.last_tick_ms(), 40.0);

        // Long stall (backgrounded tab): one advance, phase preserved
        let before = state.current_frame();
        assert!(matches!(scheduler.tick(&mut state, 1_015.0), Tick::Draw { .. }));
        assert_eq!(state.current_frame(), (before + 1) % 10);
        assert_eq!(state.last_tick_ms(), 1_000.0);
    }

    #[test]
    fn test_rate_converges_at_60hz() {
        let interval: f64 = 1000.0 / 24.0;
        let duration = 60_000.0;
        let expected = (duration / interval).floor() as i64;
        let advances = count_advances(24, 1000.0 / 60.0, 4.0, duration) as i64;
        assert!((advances - expected).abs() <= 1, "{advances} vs {expected}");
    }

    #[test]
    fn test_rate_converges_at_144hz() {
        let interval: f64 = 1000.0 / 24.0;
        let duration = 30_000.0;
        let expected = (duration / interval).floor() as i64;
        let advances = count_advances(24, 1000.0 / 144.0, 2.0, duration) as i64;
        assert!((advances - expected).abs() <= 1, "{advances} vs {expected}");
    }

    #[test]
    fn test_rate_converges_with_irregular_callbacks() {
        let interval: f64 = 1000.0 / 30.0;
        let duration = 20_000.0;
        let expected = (duration / interval).floor() as i64;
        let advances = count_advances(30, 12.0, 10.0, duration) as i64;
        assert!((advances - expected).abs() <= 1, "{advances} vs {expected}");
    }

    #[test]
    fn test_stop_is_idempotent() {
        let scheduler = FrameScheduler::new(24, 3);
        let mut state = PlaybackState::new();

        scheduler.stop(&mut state);
        assert_eq!(scheduler.tick(&mut state, 100.0), Tick::Halted);

        scheduler.start(&mut state, 0.0);
        scheduler.stop(&mut state);
        scheduler.stop(&mut state);
        assert!(!state.is_running());
        assert_eq!(scheduler.tick(&mut state, 500.0), Tick::Halted);
        assert!(!Tick::Halted.rearm());
        assert!(Tick::Wait.rearm());
    }
}
