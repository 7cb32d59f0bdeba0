//! The backdrop animator: loader, scheduler and renderer wired together.
//!
//! The animator is host-agnostic. The host feeds it events (fetch
//! completions, display callbacks, resizes, stop) in whatever order its
//! event loop delivers them, with timestamps from its own monotonic clock.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::animation::{AnimatorEvent, AnimatorPhase, FrameScheduler, PlaybackState, Tick};
use crate::loader::{FrameLoaderState, LoadProgress, SlotOutcome};
use crate::render::{render_frame, DrawTarget};
use crate::{AnimatorConfig, BackdropError, BackdropResult, FrameSequence};

/// Lifecycle notifications for external collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Fetching started for `total` frames
    LoadStarted { total: usize },
    /// Every frame settled; playback is starting
    FramesReady { loaded: usize, failed: usize },
    /// No frame could be loaded; the backdrop stays blank
    LoadFailed,
    /// The animator was stopped
    Stopped,
}

type Listener = Box<dyn FnMut(&LifecycleEvent)>;

/// Image-sequence backdrop bound to one draw target.
pub struct Animator<T: DrawTarget> {
    config: AnimatorConfig,
    sequence: FrameSequence,
    loader: FrameLoaderState<T::Image>,
    scheduler: FrameScheduler,
    playback: PlaybackState,
    phase: AnimatorPhase,
    displayed: Option<usize>,
    target: T,
    listeners: Vec<Listener>,
}

impl<T: DrawTarget> std::fmt::Debug for Animator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Animator")
            .field("phase", &self.phase)
            .field("progress", self.loader.progress())
            .field("playback", &self.playback)
            .field("displayed", &self.displayed)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl<T: DrawTarget> Animator<T> {
    /// Create an animator drawing into `target`.
    pub fn new(config: AnimatorConfig, target: T) -> BackdropResult<Self> {
        let sequence = FrameSequence::from_config(&config)?;
        let total = sequence.len();
        Ok(Self {
            loader: FrameLoaderState::new(total, config.retry_limit, config.load_timeout_ms),
            scheduler: FrameScheduler::new(config.fps, total),
            playback: PlaybackState::new(),
            phase: AnimatorPhase::Idle,
            displayed: None,
            sequence,
            config,
            target,
            listeners: Vec::new(),
        })
    }

    /// Attach to a container if the host found one.
    ///
    /// A missing container or a bad config disables the backdrop: the
    /// problem is logged and `None` returned, nothing is raised to the host.
    pub fn mount(config: AnimatorConfig, container: Option<T>) -> Option<Self> {
        let Some(target) = container else {
            let err = BackdropError::container_missing(&config.container_key);
            info!(%err, "backdrop disabled");
            return None;
        };
        match Self::new(config, target) {
            Ok(animator) => Some(animator),
            Err(err) => {
                warn!(%err, "backdrop disabled");
                None
            }
        }
    }

    /// Register a lifecycle listener.
    pub fn subscribe(&mut self, listener: impl FnMut(&LifecycleEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: LifecycleEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    fn transition(&mut self, event: AnimatorEvent) -> bool {
        match self.phase.on(event) {
            Some(next) => {
                debug!(from = ?self.phase, to = ?next, ?event, "animator transition");
                self.phase = next;
                true
            }
            None => false,
        }
    }

    /// Begin preloading.
    ///
    /// Returns the sequence the host should fetch, one independent fetch per
    /// descriptor, or `None` if loading was already requested or the
    /// animator was stopped.
    pub fn begin_loading(&mut self, now_ms: f64) -> Option<&FrameSequence> {
        if !self.transition(AnimatorEvent::LoadRequested) {
            debug!(phase = ?self.phase, "load request ignored");
            return None;
        }
        self.loader.start(now_ms);
        self.emit(LifecycleEvent::LoadStarted {
            total: self.sequence.len(),
        });
        Some(&self.sequence)
    }

    /// Report a decoded frame for zero-based `slot`.
    pub fn frame_loaded(&mut self, slot: usize, image: T::Image, now_ms: f64) -> SlotOutcome {
        if !self.is_loading() {
            return SlotOutcome::Ignored;
        }
        let outcome = self.loader.record_loaded(slot, image);
        self.after_load_outcome(&outcome, now_ms);
        outcome
    }

    /// Report a failed fetch or decode for zero-based `slot`.
    ///
    /// On [`SlotOutcome::Retry`] the host should fetch the slot's path again.
    pub fn frame_failed(&mut self, slot: usize, reason: &str, now_ms: f64) -> SlotOutcome {
        if !self.is_loading() {
            return SlotOutcome::Ignored;
        }
        let outcome = self.loader.record_failed(slot, reason);
        self.after_load_outcome(&outcome, now_ms);
        outcome
    }

    /// Give up on outstanding fetches if the load timeout elapsed.
    pub fn poll_load_timeout(&mut self, now_ms: f64) -> SlotOutcome {
        if !self.is_loading() {
            return SlotOutcome::Ignored;
        }
        let outcome = self.loader.check_timeout(now_ms);
        self.after_load_outcome(&outcome, now_ms);
        outcome
    }

    #[inline]
    fn is_loading(&self) -> bool {
        self.phase == AnimatorPhase::Loading
    }

    fn after_load_outcome(&mut self, outcome: &SlotOutcome, now_ms: f64) {
        match *outcome {
            SlotOutcome::Ready { loaded, failed } => {
                self.emit(LifecycleEvent::FramesReady { loaded, failed });
                if let Err(err) = self.start_playback(now_ms) {
                    warn!(%err, "playback did not start");
                }
            }
            SlotOutcome::AllFailed => {
                if self.transition(AnimatorEvent::LoadFailed) {
                    self.emit(LifecycleEvent::LoadFailed);
                }
            }
            _ => {}
        }
    }

    /// Start the scheduler.
    ///
    /// Called automatically when the frames become ready. Starting before
    /// then is a programming error reported as [`BackdropError::NotReady`];
    /// starting while already playing does nothing.
    pub fn start_playback(&mut self, now_ms: f64) -> BackdropResult<()> {
        if self.phase == AnimatorPhase::Playing {
            debug!("playback already running");
            return Ok(());
        }
        if !self.loader.is_ready() {
            warn!(phase = ?self.phase, "playback requested before frames are ready");
            return Err(BackdropError::NotReady);
        }
        if !self.transition(AnimatorEvent::FramesReady) {
            // Stopped while the last fetches were in flight.
            debug!(phase = ?self.phase, "playback start ignored");
            return Ok(());
        }
        self.scheduler.start(&mut self.playback, now_ms);
        info!(fps = self.config.fps, frames = self.sequence.len(), "playback started");
        Ok(())
    }

    /// Handle one display-sync callback.
    ///
    /// While loading this only checks the load timeout. Once playing it
    /// advances and draws at the configured rate. The host should request
    /// another callback unless the result is [`Tick::Halted`].
    pub fn on_display_frame(&mut self, now_ms: f64) -> Tick {
        match self.phase {
            AnimatorPhase::Loading => {
                self.poll_load_timeout(now_ms);
                if self.phase == AnimatorPhase::Loading {
                    Tick::Wait
                } else {
                    self.on_display_frame(now_ms)
                }
            }
            AnimatorPhase::Playing => {
                let tick = self.scheduler.tick(&mut self.playback, now_ms);
                if let Tick::Draw { frame } = tick {
                    self.draw(frame);
                }
                tick
            }
            AnimatorPhase::Idle | AnimatorPhase::Failed | AnimatorPhase::Stopped => Tick::Halted,
        }
    }

    fn draw(&mut self, slot: usize) {
        match render_frame(&mut self.target, self.loader.assets(), slot) {
            Ok(_) => self.displayed = Some(slot),
            Err(BackdropError::RenderSkipped { .. }) => {}
            Err(err) => warn!(slot, %err, "frame draw failed"),
        }
    }

    /// Match the surface to a new viewport size and redraw the frame on
    /// screen right away, without waiting for the next scheduled tick.
    ///
    /// Safe in any state; after stop it only resizes.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.target.set_size(width, height);
        debug!(width, height, "backdrop resized");
        if self.phase != AnimatorPhase::Playing {
            return;
        }
        if let Some(slot) = self.displayed {
            self.draw(slot);
        }
    }

    /// Stop playback for good. Idempotent and safe in any state.
    pub fn stop(&mut self) {
        if !self.transition(AnimatorEvent::StopRequested) {
            return;
        }
        self.scheduler.stop(&mut self.playback);
        info!("backdrop stopped");
        self.emit(LifecycleEvent::Stopped);
    }

    #[inline]
    pub fn phase(&self) -> AnimatorPhase {
        self.phase
    }

    #[inline]
    pub fn config(&self) -> &AnimatorConfig {
        &self.config
    }

    #[inline]
    pub fn sequence(&self) -> &FrameSequence {
        &self.sequence
    }

    #[inline]
    pub fn progress(&self) -> &LoadProgress {
        self.loader.progress()
    }

    #[inline]
    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    /// Slot of the frame currently on screen, if any was drawn.
    #[inline]
    pub fn displayed_frame(&self) -> Option<usize> {
        self.displayed
    }

    #[inline]
    pub fn target(&self) -> &T {
        &self.target
    }
}

/// Deferred delivery of lifecycle events for hosts that keep the animator
/// behind a `RefCell`.
///
/// The animator calls its listeners while the host still holds its mutable
/// borrow, so a listener that calls back into the host (to stop it, say)
/// would hit that borrow. The relay subscribes a sink that only queues
/// events; the host calls [`LifecycleRelay::flush`] once the borrow is
/// released, and listeners run from there. Listeners may subscribe more
/// listeners or trigger further events while being dispatched.
#[derive(Default)]
pub struct LifecycleRelay {
    queue: Rc<RefCell<VecDeque<LifecycleEvent>>>,
    listeners: RefCell<Vec<Listener>>,
    dispatching: Cell<bool>,
}

impl std::fmt::Debug for LifecycleRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleRelay")
            .field("queued", &self.queue.borrow().len())
            .field("dispatching", &self.dispatching.get())
            .finish_non_exhaustive()
    }
}

impl LifecycleRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook the relay's queue into an animator.
    pub fn attach<T: DrawTarget>(&self, animator: &mut Animator<T>) {
        let queue = Rc::clone(&self.queue);
        animator.subscribe(move |event| queue.borrow_mut().push_back(event.clone()));
    }

    pub fn subscribe(&self, listener: impl FnMut(&LifecycleEvent) + 'static) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    /// Deliver every queued event, in order.
    ///
    /// A nested call from inside a listener returns at once; the outer call
    /// drains whatever the listener queued.
    pub fn flush(&self) {
        if self.dispatching.replace(true) {
            return;
        }
        loop {
            let Some(event) = self.queue.borrow_mut().pop_front() else {
                break;
            };
            let mut listeners = std::mem::take(&mut *self.listeners.borrow_mut());
            for listener in &mut listeners {
                listener(&event);
            }
            let mut current = self.listeners.borrow_mut();
            let added = std::mem::replace(&mut *current, listeners);
            current.extend(added);
        }
        self.dispatching.set(false);
    }
}
