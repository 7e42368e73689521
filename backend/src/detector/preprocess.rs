use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array4;

use crate::detection::BoundingBox;

/// Gray used by YOLO exports for letterbox padding.
const PAD_VALUE: u8 = 114;

/// Square network input produced from an arbitrary image, with the
/// transform needed to map boxes back to source pixels.
#[derive(Debug)]
pub struct Letterbox {
    pub tensor: Array4<f32>,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    pub fn restore(&self, bbox: &BoundingBox) -> BoundingBox {
        BoundingBox::from_corners(
            (bbox.x1 - self.pad_x) / self.scale,
            (bbox.y1 - self.pad_y) / self.scale,
            (bbox.x2 - self.pad_x) / self.scale,
            (bbox.y2 - self.pad_y) / self.scale,
        )
    }
}

/// Resizes `image` to fit a `size`×`size` canvas keeping aspect ratio and
/// converts it to a normalized `[1, 3, size, size]` tensor.
pub fn letterbox(image: &RgbImage, size: u32) -> Letterbox {
    let (width, height) = image.dimensions();
    let scale = (size as f32 / width.max(1) as f32).min(size as f32 / height.max(1) as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
        }
    }

    Letterbox {
        tensor,
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
    }
}
