//! Cover-fit rendering of frames onto a draw target.

use tracing::debug;

use crate::{BackdropError, BackdropResult, FrameAsset, FrameImage, ViewportFit};

/// A resizable surface frames are drawn onto.
///
/// Implemented by an HTML canvas in the `web` feature and by an in-memory
/// RGBA buffer in the `native` feature. Tests use a recording fake.
pub trait DrawTarget {
    /// Image type this surface can draw.
    type Image: FrameImage;

    /// Current pixel size as (width, height).
    fn size(&self) -> (u32, u32);

    /// Resize the backing store. Contents may be discarded.
    fn set_size(&mut self, width: u32, height: u32);

    /// Clear the whole surface.
    fn clear(&mut self);

    /// Draw the full `image` scaled to `fit.draw_width` x `fit.draw_height`
    /// with its top-left corner at (`fit.offset_x`, `fit.offset_y`).
    fn draw_image(&mut self, image: &Self::Image, fit: &ViewportFit) -> BackdropResult<()>;
}

/// Draw the frame in `slot` with cover semantics.
///
/// Returns the placement used. A slot that is pending, failed or out of
/// range yields [`BackdropError::RenderSkipped`] and leaves the surface as it
/// was, so the previous frame stays visible.
///
/// ## Example
///
/// ```rust
/// use backdrop_core_view::{render_frame, BackdropResult, DrawTarget, FrameAsset, FrameImage, ViewportFit};
///
/// struct Poster(u32, u32);
/// impl FrameImage for Poster {
///     fn dimensions(&self) -> (u32, u32) { (self.0, self.1) }
/// }
///
/// struct Surface { size: (u32, u32), draws: Vec<ViewportFit> }
/// impl DrawTarget for Surface {
///     type Image = Poster;
///     fn size(&self) -> (u32, u32) { self.size }
///     fn set_size(&mut self, w: u32, h: u32) { self.size = (w, h); }
///     fn clear(&mut self) {}
///     fn draw_image(&mut self, _: &Poster, fit: &ViewportFit) -> BackdropResult<()> {
///         self.draws.push(*fit);
///         Ok(())
///     }
/// }
///
/// let mut surface = Surface { size: (800, 600), draws: Vec::new() };
/// let assets = vec![FrameAsset::Loaded(Poster(1200, 800)), FrameAsset::Failed];
///
/// let fit = render_frame(&mut surface, &assets, 0).unwrap();
/// assert_eq!((fit.offset_x, fit.offset_y), (-50.0, 0.0));
/// assert!(render_frame(&mut surface, &assets, 1).is_err());
/// assert_eq!(surface.draws.len(), 1);
/// ```
pub fn render_frame<T: DrawTarget>(target: &mut T, assets: &[FrameAsset<T::Image>], slot: usize) -> BackdropResult<ViewportFit> {
    let Some(image) = assets.get(slot).and_then(FrameAsset::image) else {
        debug!(slot, "render skipped: frame not loaded");
        return Err(BackdropError::RenderSkipped { index: slot });
    };

    let Some(fit) = ViewportFit::cover_px(target.size(), image.dimensions()) else {
        debug!(slot, size = ?target.size(), "render skipped: empty canvas or image");
        return Err(BackdropError::RenderSkipped { index: slot });
    };

    target.clear();
    target.draw_image(image, &fit)?;
    Ok(fit)
}

/// Web-specific rendering implementation.
#[cfg(feature = "web")]
pub mod web {
    use super::*;
    use wasm_bindgen::JsCast;
    use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement};

    impl FrameImage for HtmlImageElement {
        fn dimensions(&self) -> (u32, u32) {
            (self.natural_width(), self.natural_height())
        }
    }

    /// An HTML canvas with its 2D context.
    #[derive(Clone, Debug)]
    pub struct CanvasTarget {
        canvas: HtmlCanvasElement,
        ctx: CanvasRenderingContext2d,
    }

    impl CanvasTarget {
        /// Wrap a canvas, acquiring its 2D context.
        pub fn new(canvas: HtmlCanvasElement) -> BackdropResult<Self> {
            let ctx = canvas
                .get_context("2d")
                .map_err(|_| BackdropError::host("Failed to get 2d context"))?
                .ok_or_else(|| BackdropError::host("No 2d context available"))?
                .dyn_into::<CanvasRenderingContext2d>()
                .map_err(|_| BackdropError::host("Failed to cast to CanvasRenderingContext2d"))?;
            Ok(Self { canvas, ctx })
        }

        pub fn canvas(&self) -> &HtmlCanvasElement {
            &self.canvas
        }
    }

    impl DrawTarget for CanvasTarget {
        type Image = HtmlImageElement;

        fn size(&self) -> (u32, u32) {
            (self.canvas.width(), self.canvas.height())
        }

        fn set_size(&mut self, width: u32, height: u32) {
            self.canvas.set_width(width);
            self.canvas.set_height(height);
        }

        fn clear(&mut self) {
            let (w, h) = self.size();
            self.ctx.clear_rect(0.0, 0.0, w as f64, h as f64);
        }

        fn draw_image(&mut self, image: &HtmlImageElement, fit: &ViewportFit) -> BackdropResult<()> {
            self.ctx
                .draw_image_with_html_image_element_and_dw_and_dh(
                    image,
                    fit.offset_x,
                    fit.offset_y,
                    fit.draw_width,
                    fit.draw_height,
                )
                .map_err(|_| BackdropError::host("Failed to draw frame image"))
        }
    }
}

/// In-memory RGBA rendering for native hosts.
#[cfg(feature = "native")]
pub mod raster {
    use super::*;
    use image::imageops::{self, FilterType};
    use image::{Rgba, RgbaImage};

    impl FrameImage for RgbaImage {
        fn dimensions(&self) -> (u32, u32) {
            RgbaImage::dimensions(self)
        }
    }

    /// A software canvas backed by an [`RgbaImage`].
    #[derive(Clone, Debug)]
    pub struct RgbaCanvas {
        pixels: RgbaImage,
        clear_color: Rgba<u8>,
    }

    impl RgbaCanvas {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                pixels: RgbaImage::new(width, height),
                clear_color: Rgba([0, 0, 0, 0]),
            }
        }

        pub fn with_clear_color(mut self, color: [u8; 4]) -> Self {
            self.clear_color = Rgba(color);
            self
        }

        /// The rendered pixels
        pub fn pixels(&self) -> &RgbaImage {
            &self.pixels
        }
    }

    impl DrawTarget for RgbaCanvas {
        type Image = RgbaImage;

        fn size(&self) -> (u32, u32) {
            self.pixels.dimensions()
        }

        fn set_size(&mut self, width: u32, height: u32) {
            if self.pixels.dimensions() != (width, height) {
                self.pixels = RgbaImage::from_pixel(width, height, self.clear_color);
            }
        }

        fn clear(&mut self) {
            for px in self.pixels.pixels_mut() {
                *px = self.clear_color;
            }
        }

        fn draw_image(&mut self, image: &RgbaImage, fit: &ViewportFit) -> BackdropResult<()> {
            let (cw, ch) = self.pixels.dimensions();
            let (iw, ih) = image.dimensions();
            if cw == 0 || ch == 0 || iw == 0 || ih == 0 {
                return Ok(());
            }

            // Only the visible window of the source is resampled.
            let (sx, sy, sw, sh) = fit.source_crop(cw as f64, ch as f64);
            let x = (sx.max(0.0).round() as u32).min(iw - 1);
            let y = (sy.max(0.0).round() as u32).min(ih - 1);
            let w = (sw.round() as u32).clamp(1, iw - x);
            let h = (sh.round() as u32).clamp(1, ih - y);

            let visible = imageops::crop_imm(image, x, y, w, h).to_image();
            self.pixels = imageops::resize(&visible, cw, ch, FilterType::Triangle);
            Ok(())
        }
    }
}
