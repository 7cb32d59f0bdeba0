//! Cover-fit calculations for placing a frame on a canvas.

/// Placement of an image on a canvas under "cover" semantics.
///
/// The image is scaled uniformly so it fully covers the canvas, then centered.
/// The overflowing axis is cropped symmetrically, so offsets on that axis are
/// negative. Recomputed on every draw; the canvas may have been resized since
/// the previous one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportFit {
    /// Uniform scale factor applied to the image
    pub scale: f64,
    /// Horizontal position of the scaled image's left edge
    pub offset_x: f64,
    /// Vertical position of the scaled image's top edge
    pub offset_y: f64,
    /// Scaled image width
    pub draw_width: f64,
    /// Scaled image height
    pub draw_height: f64,
}

impl ViewportFit {
    /// Calculate the cover placement of an image on a canvas.
    ///
    /// Returns `None` when either size has a zero dimension.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use backdrop_core_view::ViewportFit;
    ///
    /// let fit = ViewportFit::cover(800.0, 600.0, 1200.0, 800.0).unwrap();
    /// assert_eq!(fit.scale, 0.75);
    /// assert_eq!((fit.draw_width, fit.draw_height), (900.0, 600.0));
    /// assert_eq!((fit.offset_x, fit.offset_y), (-50.0, 0.0));
    /// ```
    pub fn cover(canvas_width: f64, canvas_height: f64, image_width: f64, image_height: f64) -> Option<Self> {
        if !(canvas_width > 0.0 && canvas_height > 0.0 && image_width > 0.0 && image_height > 0.0) {
            return None;
        }

        let scale = (canvas_width / image_width).max(canvas_height / image_height);
        let draw_width = image_width * scale;
        let draw_height = image_height * scale;

        Some(Self {
            scale,
            offset_x: (canvas_width - draw_width) / 2.0,
            offset_y: (canvas_height - draw_height) / 2.0,
            draw_width,
            draw_height,
        })
    }

    /// Same as [`ViewportFit::cover`] for integer pixel sizes.
    #[inline]
    pub fn cover_px(canvas: (u32, u32), image: (u32, u32)) -> Option<Self> {
        Self::cover(canvas.0 as f64, canvas.1 as f64, image.0 as f64, image.1 as f64)
    }

    /// The part of the source image that ends up visible, in image pixels,
    /// as (x, y, width, height).
    pub fn source_crop(&self, canvas_width: f64, canvas_height: f64) -> (f64, f64, f64, f64) {
        (
            -self.offset_x / self.scale,
            -self.offset_y / self.scale,
            canvas_width / self.scale,
            canvas_height / self.scale,
        )
    }
}
