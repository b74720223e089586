use image::RgbaImage;
use ndarray::Array3;

/// RGBA render target, shape `(rows, cols, 4)`.
pub type View = Array3<u8>;

/// Converts a view buffer into an `image::RgbaImage`, e.g. for saving
/// previews to disk.
pub trait IntoImageRgba8 {
    fn into_image_rgba8(self) -> RgbaImage;
}

impl IntoImageRgba8 for View {
    fn into_image_rgba8(self) -> RgbaImage {
        let (rows, cols, _) = self.dim();
        let data = if let Some(slice) = self.as_slice() {
            slice.to_vec()
        } else {
            self.iter().copied().collect()
        };
        RgbaImage::from_raw(cols as u32, rows as u32, data)
            .expect("view buffer size matches its dimensions")
    }
}
