//! # backdrop-core-view
//!
//! Core playback library for full-screen image-sequence backdrops.
//!
//! A backdrop plays a long ordered sequence of still images as a
//! pseudo-video, at a fixed frame rate independent of the display's refresh
//! rate, scaled to cover its canvas. This crate provides platform-agnostic
//! logic for:
//! - Deriving frame paths and tracking preload completion
//! - Scheduling fixed-rate frame advances on a variable-rate display callback
//! - Cover-fit placement of frames on a resizable canvas
//! - The animator lifecycle (`Idle -> Loading -> Playing -> Stopped`)
//!
//! ## Features
//!
//! - `native` (default) - Decode frames with the `image` crate and render into an RGBA buffer
//! - `web` - Mount into a page and render to an HTML canvas (WASM)
//! - `serde` - Enable serialization/deserialization for data structures
//! - `toml` - Load [`AnimatorConfig`] from TOML
//!
//! ## Example
//!
//! ```rust,ignore
//! use backdrop_core_view::{Animator, AnimatorConfig};
//!
//! let config = AnimatorConfig::new(240).with_naming("media/hero/frame_", ".jpg");
//! let Some(mut animator) = Animator::mount(config, find_canvas()) else {
//!     return; // no container on this page
//! };
//!
//! for desc in animator.begin_loading(clock.now()).unwrap() {
//!     fetch(desc.slot(), &desc.path);
//! }
//! // ... report completions with frame_loaded / frame_failed ...
//!
//! // From the display callback:
//! if animator.on_display_frame(timestamp).rearm() {
//!     request_next_callback();
//! }
//! ```

mod animation;
mod animator;
mod config;
mod data;
mod error;
pub mod loader;
pub mod render;
mod sizing;
#[cfg(feature = "web")]
pub mod web;

pub use animation::{AnimatorEvent, AnimatorPhase, FrameScheduler, PlaybackState, Tick};
pub use animator::{Animator, LifecycleEvent, LifecycleRelay};
pub use config::AnimatorConfig;
pub use data::{FrameAsset, FrameDescriptor, FrameImage, FrameSequence};
pub use error::{BackdropError, BackdropResult};
pub use loader::{FrameLoaderState, LoadProgress, LoadingPhase, SlotOutcome};
pub use render::{render_frame, DrawTarget};
pub use sizing::ViewportFit;

#[cfg(feature = "native")]
pub use loader::native::FrameDecoder;
#[cfg(feature = "native")]
pub use render::raster::RgbaCanvas;
#[cfg(feature = "web")]
pub use web::WebBackdrop;
