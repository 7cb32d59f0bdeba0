//! Frame preloading state and completion tracking.
//!
//! The loader does not fetch anything itself. The host issues one
//! independent fetch per [`FrameDescriptor`](crate::FrameDescriptor) and
//! reports each completion back through [`FrameLoaderState::record_loaded`]
//! or [`FrameLoaderState::record_failed`]. Completions may arrive in any
//! order; readiness depends only on the counts.
//!
//! ## Failure policy
//!
//! A failed fetch is re-issued up to `retry_limit` times, then the slot is
//! marked [`FrameAsset::Failed`] and skipped during playback. Readiness fires
//! once every slot is terminal and at least one frame loaded. If a load
//! timeout is configured, slots still pending when it elapses are marked
//! failed so a hung fetch cannot stall the backdrop forever.

use tracing::{debug, info, warn};

use crate::data::FrameAsset;

/// Loading phase indicator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadingPhase {
    /// Not loading anything
    Idle,
    /// Fetches in flight
    Loading,
    /// Every slot is terminal and at least one frame loaded
    Ready,
    /// Every slot failed; there is nothing to play
    Failed,
}

/// Progress information for frame loading.
///
/// Both counters only ever increase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadProgress {
    loaded: usize,
    failed: usize,
    total: usize,
}

impl LoadProgress {
    /// Create a tracker for `total` frames
    pub fn new(total: usize) -> Self {
        Self {
            loaded: 0,
            failed: 0,
            total,
        }
    }

    /// Frames that decoded successfully
    #[inline]
    pub fn loaded(&self) -> usize {
        self.loaded
    }

    /// Frames that ended up terminally failed
    #[inline]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Target frame count `N`
    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Frames that reached a terminal state
    #[inline]
    pub fn settled(&self) -> usize {
        self.loaded + self.failed
    }

    /// Check if every frame reached a terminal state
    pub fn is_settled(&self) -> bool {
        self.total > 0 && self.settled() >= self.total
    }

    /// Get loading percentage (0-100) over settled frames
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            0
        } else {
            ((self.settled() as f32 / self.total as f32) * 100.0) as u8
        }
    }
}

/// What the host should do after reporting a completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotOutcome {
    /// Counted; still waiting on other frames
    Progress,
    /// Re-issue the fetch for `slot`; this will be attempt number `attempt`
    Retry { slot: usize, attempt: u32 },
    /// This completion made the set ready. Fires exactly once.
    Ready { loaded: usize, failed: usize },
    /// This completion settled the set with nothing playable. Fires once.
    AllFailed,
    /// The report was dropped (unknown slot, slot already terminal, or not loading)
    Ignored,
}

/// State for managing frame loading.
///
/// This is the only writer of the asset array; the renderer reads it
/// through [`FrameLoaderState::assets`].
#[derive(Clone, Debug)]
pub struct FrameLoaderState<I> {
    phase: LoadingPhase,
    progress: LoadProgress,
    assets: Vec<FrameAsset<I>>,
    attempts: Vec<u32>,
    retry_limit: u32,
    timeout_ms: Option<f64>,
    started_at_ms: f64,
}

impl<I> FrameLoaderState<I> {
    /// Create a loader for `total` slots, all pending.
    pub fn new(total: usize, retry_limit: u32, timeout_ms: Option<f64>) -> Self {
        Self {
            phase: LoadingPhase::Idle,
            progress: LoadProgress::new(total),
            assets: (0..total).map(|_| FrameAsset::Pending).collect(),
            attempts: vec![0; total],
            retry_limit,
            timeout_ms,
            started_at_ms: 0.0,
        }
    }

    /// Begin loading. Only valid from `Idle`; returns false otherwise.
    pub fn start(&mut self, now_ms: f64) -> bool {
        if self.phase != LoadingPhase::Idle {
            return false;
        }
        self.phase = LoadingPhase::Loading;
        self.started_at_ms = now_ms;
        info!(total = self.progress.total(), "frame preload started");
        true
    }

    /// Store a decoded image for `slot`.
    pub fn record_loaded(&mut self, slot: usize, image: I) -> SlotOutcome {
        if !self.accepts(slot) {
            return SlotOutcome::Ignored;
        }
        self.assets[slot] = FrameAsset::Loaded(image);
        self.progress.loaded += 1;
        self.settle()
    }

    /// Report that fetching or decoding `slot` failed.
    pub fn record_failed(&mut self, slot: usize, reason: &str) -> SlotOutcome {
        if !self.accepts(slot) {
            return SlotOutcome::Ignored;
        }
        if self.attempts[slot] < self.retry_limit {
            self.attempts[slot] += 1;
            let attempt = self.attempts[slot] + 1;
            debug!(slot, attempt, reason, "retrying frame fetch");
            return SlotOutcome::Retry { slot, attempt };
        }
        warn!(slot, reason, "frame failed to load; it will be skipped");
        self.assets[slot] = FrameAsset::Failed;
        self.progress.failed += 1;
        self.settle()
    }

    /// Give up on stragglers once the configured timeout has elapsed.
    ///
    /// Call periodically (e.g. from each display callback) while loading.
    pub fn check_timeout(&mut self, now_ms: f64) -> SlotOutcome {
        let Some(timeout) = self.timeout_ms else {
            return SlotOutcome::Progress;
        };
        if self.phase != LoadingPhase::Loading {
            return SlotOutcome::Ignored;
        }
        if now_ms - self.started_at_ms < timeout {
            return SlotOutcome::Progress;
        }

        let mut abandoned = 0;
        for asset in self.assets.iter_mut().filter(|a| a.is_pending()) {
            *asset = FrameAsset::Failed;
            abandoned += 1;
        }
        self.progress.failed += abandoned;
        warn!(abandoned, timeout_ms = timeout, "frame preload timed out");
        self.settle()
    }

    fn accepts(&self, slot: usize) -> bool {
        if self.phase != LoadingPhase::Loading {
            debug!(slot, phase = ?self.phase, "completion outside loading ignored");
            return false;
        }
        match self.assets.get(slot) {
            Some(asset) if asset.is_pending() => true,
            Some(_) => {
                debug!(slot, "completion for settled slot ignored");
                false
            }
            None => {
                warn!(slot, total = self.assets.len(), "completion for unknown slot");
                false
            }
        }
    }

    fn settle(&mut self) -> SlotOutcome {
        if !self.progress.is_settled() {
            return SlotOutcome::Progress;
        }
        if self.progress.loaded() == 0 {
            self.phase = LoadingPhase::Failed;
            warn!(total = self.progress.total(), "no frame loaded; backdrop disabled");
            return SlotOutcome::AllFailed;
        }
        self.phase = LoadingPhase::Ready;
        info!(
            loaded = self.progress.loaded(),
            failed = self.progress.failed(),
            "frames ready"
        );
        SlotOutcome::Ready {
            loaded: self.progress.loaded(),
            failed: self.progress.failed(),
        }
    }

    #[inline]
    pub fn phase(&self) -> LoadingPhase {
        self.phase
    }

    #[inline]
    pub fn progress(&self) -> &LoadProgress {
        &self.progress
    }

    /// Check if playback can start
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.phase == LoadingPhase::Ready
    }

    /// All slots, in sequence order
    #[inline]
    pub fn assets(&self) -> &[FrameAsset<I>] {
        &self.assets
    }

    /// Get the asset at the given slot
    pub fn get_asset(&self, slot: usize) -> Option<&FrameAsset<I>> {
        self.assets.get(slot)
    }

    /// Get the number of slots `N`
    pub fn frame_count(&self) -> usize {
        self.assets.len()
    }
}

/// Filesystem frame decoding for native hosts.
///
/// Decoding runs on worker threads; results come back over a channel that
/// the host drains on its own thread, so the loader state is still only
/// touched by one thread.
#[cfg(feature = "native")]
pub mod native {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread::JoinHandle;
    use std::time::Duration;

    use crossbeam_channel::{unbounded, Receiver, Sender};
    use image::RgbaImage;
    use tracing::{debug, warn};

    use super::SlotOutcome;
    use crate::render::DrawTarget;
    use crate::{Animator, BackdropError, BackdropResult, FrameSequence};

    /// Result of decoding one frame.
    #[derive(Debug)]
    pub struct DecodedFrame {
        /// Zero-based slot in the sequence
        pub slot: usize,
        pub result: BackdropResult<RgbaImage>,
    }

    struct DecodeJob {
        slot: usize,
        index: u32,
        path: PathBuf,
    }

    /// Decode one image file into RGBA pixels.
    pub fn decode_frame(path: &Path) -> Result<RgbaImage, String> {
        let img = image::open(path).map_err(|e| e.to_string())?;
        Ok(img.to_rgba8())
    }

    /// A pool of decoder threads reading frames relative to a root directory.
    ///
    /// Dropping the pool discards every queued job and waits only for the
    /// decodes already in progress.
    pub struct FrameDecoder {
        root: PathBuf,
        jobs: Option<Sender<DecodeJob>>,
        queued: Receiver<DecodeJob>,
        cancelled: Arc<AtomicBool>,
        results: Receiver<DecodedFrame>,
        workers: Vec<JoinHandle<()>>,
    }

    impl FrameDecoder {
        /// Spawn `workers` decoder threads (at least one).
        pub fn spawn(root: impl Into<PathBuf>, workers: usize) -> BackdropResult<Self> {
            let (job_tx, job_rx) = unbounded::<DecodeJob>();
            let (result_tx, result_rx) = unbounded();
            let cancelled = Arc::new(AtomicBool::new(false));

            let mut handles = Vec::new();
            for n in 0..workers.max(1) {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                let cancelled = Arc::clone(&cancelled);
                let handle = std::thread::Builder::new()
                    .name(format!("frame-decoder-{n}"))
                    .spawn(move || {
                        for job in jobs.iter() {
                            if cancelled.load(Ordering::Acquire) {
                                break;
                            }
                            let result = decode_frame(&job.path).map_err(|reason| {
                                BackdropError::asset_load(job.index, job.path.display().to_string(), reason)
                            });
                            if results.send(DecodedFrame { slot: job.slot, result }).is_err() {
                                break;
                            }
                        }
                    })
                    .map_err(|e| BackdropError::host(format!("failed to spawn decoder: {e}")))?;
                handles.push(handle);
            }

            Ok(Self {
                root: root.into(),
                jobs: Some(job_tx),
                queued: job_rx,
                cancelled,
                results: result_rx,
                workers: handles,
            })
        }

        /// Queue a fetch for zero-based `slot` of `sequence`.
        pub fn request(&self, sequence: &FrameSequence, slot: usize) {
            if self.is_cancelled() {
                debug!(slot, "decoder cancelled; frame not requested");
                return;
            }
            let (Some(jobs), Some(desc)) = (&self.jobs, sequence.get(slot)) else {
                return;
            };
            let job = DecodeJob {
                slot,
                index: desc.index,
                path: self.root.join(&desc.path),
            };
            if jobs.send(job).is_err() {
                warn!(slot, "decoder pool is gone; frame not requested");
            }
        }

        /// Queue every frame of `sequence`.
        pub fn request_all(&self, sequence: &FrameSequence) {
            for slot in 0..sequence.len() {
                self.request(sequence, slot);
            }
        }

        /// Abandon outstanding work, e.g. when the animator is stopped.
        ///
        /// Queued jobs are discarded and later requests are ignored. Decodes
        /// already running finish, but workers pick up nothing new. Returns
        /// the number of discarded jobs.
        pub fn cancel(&self) -> usize {
            self.cancelled.store(true, Ordering::Release);
            let discarded = self.queued.try_iter().count();
            if discarded > 0 {
                debug!(discarded, "queued frame decodes discarded");
            }
            discarded
        }

        #[inline]
        pub fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::Acquire)
        }

        /// Completed decodes, without blocking.
        pub fn try_iter(&self) -> impl Iterator<Item = DecodedFrame> + '_ {
            self.results.try_iter()
        }

        /// Wait up to `timeout` for the next completed decode.
        pub fn recv_timeout(&self, timeout: Duration) -> Option<DecodedFrame> {
            self.results.recv_timeout(timeout).ok()
        }

        /// Hand one decode result to the animator, re-queueing on retry.
        pub fn deliver<T>(&self, animator: &mut Animator<T>, frame: DecodedFrame, now_ms: f64) -> SlotOutcome
        where
            T: DrawTarget<Image = RgbaImage>,
        {
            let outcome = match frame.result {
                Ok(image) => animator.frame_loaded(frame.slot, image, now_ms),
                Err(err) => animator.frame_failed(frame.slot, &err.to_string(), now_ms),
            };
            if let SlotOutcome::Retry { slot, attempt } = outcome {
                debug!(slot, attempt, "re-queueing frame");
                self.request(animator.sequence(), slot);
            }
            outcome
        }

        /// Deliver every result that is already available.
        pub fn pump<T>(&self, animator: &mut Animator<T>, now_ms: f64) -> usize
        where
            T: DrawTarget<Image = RgbaImage>,
        {
            let mut delivered = 0;
            while let Ok(frame) = self.results.try_recv() {
                self.deliver(animator, frame, now_ms);
                delivered += 1;
            }
            delivered
        }
    }

    impl Drop for FrameDecoder {
        fn drop(&mut self) {
            self.cancel();
            // Closing the job channel ends the worker loops.
            self.jobs.take();
            for handle in self.workers.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loading_progress() {
        let mut progress = LoadProgress::new(10);
        assert_eq!(progress.percent(), 0);
        assert!(!progress.is_settled());

        progress.loaded = 5;
        assert_eq!(progress.percent(), 50);

        progress.loaded = 9;
        progress.failed = 1;
        assert!(progress.is_settled());
        assert_eq!(progress.percent(), 100);
    }

    #[test]
    fn test_ready_fires_exactly_once_after_all_loads() {
        for n in 1..=16usize {
            let mut state: FrameLoaderState<u32> = FrameLoaderState::new(n, 0, None);
            assert!(state.start(0.0));

            let mut ready = 0;
            // Complete in reverse order; arrival order must not matter.
            for slot in (0..n).rev() {
                let outcome = state.record_loaded(slot, slot as u32);
                if let SlotOutcome::Ready { loaded, failed } = outcome {
                    assert_eq!((loaded, failed), (n, 0));
                    ready += 1;
                }
                if state.progress().loaded() < n {
                    assert!(!state.is_ready());
                }
            }
            assert_eq!(ready, 1);
            assert!(state.is_ready());

            // Duplicate completions are ignored and never re-fire.
            assert_eq!(state.record_loaded(0, 0), SlotOutcome::Ignored);
        }
    }

    #[test]
    fn test_not_loading_ignores_completions() {
        let mut state: FrameLoaderState<u32> = FrameLoaderState::new(2, 0, None);
        assert_eq!(state.record_loaded(0, 1), SlotOutcome::Ignored);
        assert_eq!(state.progress().loaded(), 0);

        state.start(0.0);
        assert!(!state.start(1.0));
        assert_eq!(state.record_loaded(5, 1), SlotOutcome::Ignored);
    }

    #[test]
    fn test_single_failure_is_skipped() {
        let mut state: FrameLoaderState<u32> = FrameLoaderState::new(4, 0, None);
        state.start(0.0);

        assert_eq!(state.record_loaded(0, 10), SlotOutcome::Progress);
        assert_eq!(state.record_failed(1, "404"), SlotOutcome::Progress);
        assert_eq!(state.record_loaded(3, 13), SlotOutcome::Progress);
        assert_eq!(
            state.record_loaded(2, 12),
            SlotOutcome::Ready {
                loaded: 3,
                failed: 1
            }
        );
        assert!(matches!(state.get_asset(1), Some(FrameAsset::Failed)));
        assert_eq!(state.get_asset(2).and_then(|a| a.image()), Some(&12));
    }

    #[test]
    fn test_retry_before_terminal_failure() {
        let mut state: FrameLoaderState<u32> = FrameLoaderState::new(2, 2, None);
        state.start(0.0);
        state.record_loaded(0, 1);

        assert_eq!(
            state.record_failed(1, "timeout"),
            SlotOutcome::Retry {
                slot: 1,
                attempt: 2
            }
        );
        assert_eq!(
            state.record_failed(1, "timeout"),
            SlotOutcome::Retry {
                slot: 1,
                attempt: 3
            }
        );
        assert_eq!(
            state.record_failed(1, "timeout"),
            SlotOutcome::Ready {
                loaded: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn test_retry_then_success() {
        let mut state: FrameLoaderState<u32> = FrameLoaderState::new(1, 1, None);
        state.start(0.0);
        assert!(matches!(
            state.record_failed(0, "reset"),
            SlotOutcome::Retry { .. }
        ));
        assert_eq!(
            state.record_loaded(0, 7),
            SlotOutcome::Ready {
                loaded: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn test_all_failed() {
        let mut state: FrameLoaderState<u32> = FrameLoaderState::new(2, 0, None);
        state.start(0.0);
        state.record_failed(0, "x");
        assert_eq!(state.record_failed(1, "x"), SlotOutcome::AllFailed);
        assert_eq!(state.phase(), LoadingPhase::Failed);
        assert!(!state.is_ready());
    }

    #[test]
    fn test_timeout_releases_stragglers() {
        let mut state: FrameLoaderState<u32> = FrameLoaderState::new(3, 0, Some(1000.0));
        state.start(100.0);
        state.record_loaded(0, 1);
        state.record_loaded(2, 3);

        assert_eq!(state.check_timeout(900.0), SlotOutcome::Progress);
        assert!(!state.is_ready());
        assert_eq!(
            state.check_timeout(1100.0),
            SlotOutcome::Ready {
                loaded: 2,
                failed: 1
            }
        );
        // The straggler arriving late does not re-fire readiness.
        assert_eq!(state.record_loaded(1, 2), SlotOutcome::Ignored);
        assert_eq!(state.check_timeout(5000.0), SlotOutcome::Ignored);
    }

    #[test]
    fn test_timeout_with_nothing_loaded() {
        let mut state: FrameLoaderState<u32> = FrameLoaderState::new(3, 0, Some(50.0));
        state.start(0.0);
        assert_eq!(state.check_timeout(60.0), SlotOutcome::AllFailed);
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_native_decoder_feeds_animator() {
        use std::time::Duration;

        use image::{Rgba, RgbaImage};

        use super::native::FrameDecoder;
        use crate::animation::{AnimatorPhase, Tick};
        use crate::render::raster::RgbaCanvas;
        use crate::{AnimatorConfig, Animator};

        let root = std::env::temp_dir().join(format!("backdrop-frames-{}", std::process::id()));
        std::fs::create_dir_all(root.join("frames")).unwrap();
        let colors = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]];
        let close = |px: [u8; 4], want: [u8; 4]| px.iter().zip(want).all(|(a, b)| a.abs_diff(b) <= 1);
        for (i, color) in colors.iter().enumerate() {
            // Slot 1 is left missing on disk
            if i == 1 {
                continue;
            }
            RgbaImage::from_pixel(16, 9, Rgba(*color))
                .save(root.join(format!("frames/frame_{:03}.png", i + 1)))
                .unwrap();
        }

        let config = AnimatorConfig::new(3)
            .with_naming("frames/frame_", ".png")
            .with_fps(25)
            .with_load_timeout_ms(None);
        let mut animator = Animator::new(config, RgbaCanvas::new(32, 32)).unwrap();
        let decoder = FrameDecoder::spawn(&root, 2).unwrap();
        decoder.request_all(animator.begin_loading(0.0).unwrap());

        let mut outcomes = Vec::new();
        while animator.phase() == AnimatorPhase::Loading {
            let frame = decoder
                .recv_timeout(Duration::from_secs(10))
                .expect("decoder stalled");
            outcomes.push(decoder.deliver(&mut animator, frame, 0.0));
        }
        assert_eq!(animator.phase(), AnimatorPhase::Playing);
        assert_eq!(animator.progress().loaded(), 2);
        assert_eq!(animator.progress().failed(), 1);
        assert_eq!(outcomes.iter().filter(|o| matches!(o, SlotOutcome::Ready { .. })).count(), 1);
        assert_eq!(decoder.pump(&mut animator, 0.0), 0);

        assert_eq!(animator.on_display_frame(0.0), Tick::Draw { frame: 0 });
        assert!(close(animator.target().pixels().get_pixel(16, 16).0, colors[0]));

        // The missing frame is skipped; frame 0 stays on screen
        animator.on_display_frame(40.0);
        assert!(close(animator.target().pixels().get_pixel(16, 16).0, colors[0]));

        animator.on_display_frame(80.0);
        assert!(close(animator.target().pixels().get_pixel(16, 16).0, colors[2]));

        animator.resize(64, 16);
        assert_eq!(animator.target().pixels().dimensions(), (64, 16));
        assert!(close(animator.target().pixels().get_pixel(63, 15).0, colors[2]));

        drop(decoder);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_native_decoder_drop_discards_queued_jobs() {
        use std::time::{Duration, Instant};

        use image::{Rgba, RgbaImage};

        use super::native::FrameDecoder;
        use crate::FrameSequence;

        let root = std::env::temp_dir().join(format!("backdrop-queue-{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        RgbaImage::from_fn(1024, 1024, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255]))
            .save(root.join("big_001.png"))
            .unwrap();
        let sequence = FrameSequence::new(1, "big_", ".png", 3).unwrap();

        let decoder = FrameDecoder::spawn(&root, 1).unwrap();
        for _ in 0..200 {
            decoder.request(&sequence, 0);
        }
        let started = Instant::now();
        drop(decoder);
        // At most the decode in progress is waited on, not the whole queue
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());

        let decoder = FrameDecoder::spawn(&root, 1).unwrap();
        for _ in 0..50 {
            decoder.request(&sequence, 0);
        }
        assert!(decoder.cancel() > 0);
        assert!(decoder.is_cancelled());
        decoder.request(&sequence, 0);
        assert_eq!(decoder.cancel(), 0);

        drop(decoder);
        let _ = std::fs::remove_dir_all(&root);
    }
}
