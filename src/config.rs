//! Animator configuration.

use crate::{BackdropError, BackdropResult};

/// Playback and asset naming options for a backdrop.
///
/// All options only affect the loader's path derivation and the scheduler's
/// frame interval. Changing the frame count, prefix or padding is a
/// configuration change, never a code change.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnimatorConfig {
    /// Number of frames `N` in the sequence
    pub total_frames: u32,
    /// Path prefix prepended to the padded frame number
    pub frame_path_prefix: String,
    /// Suffix appended after the padded frame number (e.g. ".jpg")
    pub frame_extension: String,
    /// Playback rate
    pub fps: u32,
    /// Zero-padding width for the frame number
    pub padding_width: usize,
    /// Give up waiting on stragglers after this many milliseconds of loading.
    ///
    /// `None` waits for every fetch to finish or fail.
    pub load_timeout_ms: Option<f64>,
    /// Re-issue a failed fetch this many times before giving up on the slot
    pub retry_limit: u32,
    /// Key of the host element the backdrop attaches to
    pub container_key: String,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            total_frames: 240,
            frame_path_prefix: "frames/frame_".to_string(),
            frame_extension: ".jpg".to_string(),
            fps: 24,
            padding_width: 3,
            load_timeout_ms: Some(15_000.0),
            retry_limit: 0,
            container_key: "backdrop".to_string(),
        }
    }
}

impl AnimatorConfig {
    /// Create a config for `total_frames` frames with default naming.
    pub fn new(total_frames: u32) -> Self {
        Self {
            total_frames,
            ..Self::default()
        }
    }

    pub fn with_naming(mut self, prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        self.frame_path_prefix = prefix.into();
        self.frame_extension = extension.into();
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_padding_width(mut self, width: usize) -> Self {
        self.padding_width = width;
        self
    }

    pub fn with_load_timeout_ms(mut self, timeout: Option<f64>) -> Self {
        self.load_timeout_ms = timeout;
        self
    }

    pub fn with_retry_limit(mut self, retries: u32) -> Self {
        self.retry_limit = retries;
        self
    }

    pub fn with_container_key(mut self, key: impl Into<String>) -> Self {
        self.container_key = key.into();
        self
    }

    /// Parse a TOML document into a config; missing keys keep their defaults.
    #[cfg(feature = "toml")]
    pub fn from_toml_str(s: &str) -> BackdropResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| BackdropError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Duration of one frame in milliseconds.
    #[inline]
    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / self.fps.max(1) as f64
    }

    /// Reject configurations the animator cannot play.
    pub fn validate(&self) -> BackdropResult<()> {
        if self.total_frames == 0 {
            return Err(BackdropError::invalid_config("total_frames must be at least 1"));
        }
        if self.fps == 0 {
            return Err(BackdropError::invalid_config("fps must be at least 1"));
        }
        if let Some(timeout) = self.load_timeout_ms {
            if !(timeout.is_finite() && timeout > 0.0) {
                return Err(BackdropError::invalid_config(format!(
                    "load_timeout_ms must be a positive number, got {timeout}"
                )));
            }
        }
        Ok(())
    }
}
