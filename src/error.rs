//! Error types for the backdrop animator.
//!
//! None of these are fatal to the host: every variant degrades to "fewer
//! visible frames" or "no background effect".

pub type BackdropResult<T> = Result<T, BackdropError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BackdropError {
    /// One frame's fetch or decode failed.
    #[error("frame {index} ({path}) failed to load: {reason}")]
    AssetLoadFailure {
        index: u32,
        path: String,
        reason: String,
    },

    /// The mount point for the backdrop is absent.
    #[error("backdrop container `{key}` not found")]
    ContainerMissing { key: String },

    /// A draw was attempted for a slot with no loaded image.
    #[error("render skipped for frame slot {index}: no loaded image")]
    RenderSkipped { index: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Playback was started before every frame reached a terminal state.
    #[error("playback started before frames were ready")]
    NotReady,

    /// A platform call (canvas, window, decoder) failed.
    #[error("host error: {0}")]
    Host(String),
}

impl BackdropError {
    pub fn asset_load(index: u32, path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AssetLoadFailure {
            index,
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn container_missing(key: impl Into<String>) -> Self {
        Self::ContainerMissing { key: key.into() }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn host(msg: impl Into<String>) -> Self {
        Self::Host(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_context() {
        let err = BackdropError::asset_load(7, "frames/frame_007.jpg", "404");
        let msg = err.to_string();
        assert!(msg.contains("frame 7"));
        assert!(msg.contains("frames/frame_007.jpg"));
        assert!(msg.contains("404"));

        assert!(BackdropError::container_missing("hero-bg")
            .to_string()
            .contains("hero-bg"));
        assert!(BackdropError::invalid_config("fps")
            .to_string()
            .starts_with("invalid configuration:"));
    }
}
