//! Core data structures for frame sequences.

use crate::{AnimatorConfig, BackdropError, BackdropResult};

/// A decoded image the renderer can place on a canvas.
///
/// Implemented by whatever the host platform decodes into: an
/// `HtmlImageElement` on the web, an `RgbaImage` natively.
pub trait FrameImage {
    /// Intrinsic pixel dimensions as (width, height).
    fn dimensions(&self) -> (u32, u32);
}

/// One entry of a [`FrameSequence`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameDescriptor {
    /// 1-based frame number used in the resource name
    pub index: u32,
    /// Resource path, e.g. "frames/frame_001.jpg"
    pub path: String,
}

impl FrameDescriptor {
    /// Zero-based slot this frame occupies in the asset array.
    #[inline]
    pub fn slot(&self) -> usize {
        self.index as usize - 1
    }
}

/// Immutable, ordered sequence of `N` frame descriptors.
///
/// ## Example
///
/// ```rust
/// use backdrop_core_view::{AnimatorConfig, FrameSequence};
///
/// let config = AnimatorConfig::new(3).with_naming("img/f", ".webp");
/// let seq = FrameSequence::from_config(&config).unwrap();
/// assert_eq!(seq.len(), 3);
/// assert_eq!(seq.get(0).unwrap().path, "img/f001.webp");
/// assert_eq!(seq.get(2).unwrap().index, 3);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameSequence {
    frames: Vec<FrameDescriptor>,
}

impl FrameSequence {
    /// Build the sequence described by a config.
    pub fn from_config(config: &AnimatorConfig) -> BackdropResult<Self> {
        config.validate()?;
        Self::new(
            config.total_frames,
            &config.frame_path_prefix,
            &config.frame_extension,
            config.padding_width,
        )
    }

    /// Build `total` descriptors named `<prefix><index padded to width><extension>`.
    pub fn new(total: u32, prefix: &str, extension: &str, padding_width: usize) -> BackdropResult<Self> {
        if total == 0 {
            return Err(BackdropError::invalid_config("frame sequence cannot be empty"));
        }
        let frames = (1..=total)
            .map(|index| FrameDescriptor {
                index,
                path: format!("{prefix}{index:0padding_width$}{extension}"),
            })
            .collect();
        Ok(Self { frames })
    }

    /// Number of frames `N`.
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false; an empty sequence cannot be constructed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Descriptor at zero-based slot `slot`.
    #[inline]
    pub fn get(&self, slot: usize) -> Option<&FrameDescriptor> {
        self.frames.get(slot)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameDescriptor> {
        self.frames.iter()
    }
}

impl<'a> IntoIterator for &'a FrameSequence {
    type Item = &'a FrameDescriptor;
    type IntoIter = std::slice::Iter<'a, FrameDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

/// Load state of one frame slot.
///
/// Transitions at most once: `Pending -> Loaded` or `Pending -> Failed`.
#[derive(Clone, Debug)]
pub enum FrameAsset<I> {
    Pending,
    Loaded(I),
    Failed,
}

impl<I> Default for FrameAsset<I> {
    fn default() -> Self {
        FrameAsset::Pending
    }
}

impl<I> FrameAsset<I> {
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, FrameAsset::Pending)
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        matches!(self, FrameAsset::Loaded(_))
    }

    /// The decoded image, if this slot loaded.
    #[inline]
    pub fn image(&self) -> Option<&I> {
        match self {
            FrameAsset::Loaded(image) => Some(image),
            _ => None,
        }
    }
}

impl<I: FrameImage> FrameAsset<I> {
    /// Intrinsic dimensions of a loaded image.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.image().map(FrameImage::dimensions)
    }
}
