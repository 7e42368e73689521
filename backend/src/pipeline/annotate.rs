use chrono::{DateTime, Utc};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detection::Detection;
use crate::pipeline::font::{draw_text, text_height, text_width};

pub const PALETTE: [Rgb<u8>; 10] = [
    Rgb([255, 0, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 0, 255]),
    Rgb([255, 255, 0]),
    Rgb([255, 0, 255]),
    Rgb([0, 255, 255]),
    Rgb([255, 128, 0]),
    Rgb([128, 0, 255]),
    Rgb([255, 192, 203]),
    Rgb([0, 128, 0]),
];

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, Clone)]
pub struct Annotator {
    pub stroke_width: u32,
    pub text_scale: u32,
    pub label_padding: u32,
    pub label_margin: i32,
    pub summary_height: u32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            stroke_width: 3,
            text_scale: 2,
            label_padding: 3,
            label_margin: 5,
            summary_height: 60,
        }
    }
}

/// Vertical origin of a label drawn above a box whose top edge is `y1`.
pub fn label_origin(y1: f32, label_height: u32, margin: i32) -> i32 {
    (y1.round() as i32 - label_height as i32 - margin).max(0)
}

impl Annotator {
    pub fn label_height(&self) -> u32 {
        text_height(self.text_scale) + 2 * self.label_padding
    }

    /// Draws `detections` (already ranked) onto a copy of `image`, followed by
    /// a summary band. Colors follow rank, not class id.
    pub fn annotate(
        &self,
        image: &RgbImage,
        detections: &[Detection],
        generated_at: DateTime<Utc>,
    ) -> RgbImage {
        let mut canvas = image.clone();

        for (rank, detection) in detections.iter().enumerate() {
            let color = PALETTE[rank % PALETTE.len()];
            self.draw_box(&mut canvas, detection, color);
            self.draw_label(&mut canvas, detection, color);
        }

        self.draw_summary(&mut canvas, detections.len(), generated_at);
        canvas
    }

    fn draw_box(&self, canvas: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
        let x1 = detection.bbox.x1.round() as i32;
        let y1 = detection.bbox.y1.round() as i32;
        let width = (detection.bbox.x2.round() as i32 - x1 + 1).max(1);
        let height = (detection.bbox.y2.round() as i32 - y1 + 1).max(1);

        for inset in 0..self.stroke_width as i32 {
            let w = width - 2 * inset;
            let h = height - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                canvas,
                Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32),
                color,
            );
        }
    }

    fn draw_label(&self, canvas: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
        let label = format!("{}: {:.2}", detection.class_name, detection.confidence);
        let label_height = self.label_height();
        let label_width = text_width(&label, self.text_scale) + 2 * self.label_padding;
        let x = detection.bbox.x1.round() as i32;
        let y = label_origin(detection.bbox.y1, label_height, self.label_margin);

        draw_filled_rect_mut(
            canvas,
            Rect::at(x, y).of_size(label_width, label_height),
            color,
        );
        draw_text(
            canvas,
            x + self.label_padding as i32,
            y + self.label_padding as i32,
            &label,
            WHITE,
            self.text_scale,
        );
    }

    fn draw_summary(&self, canvas: &mut RgbImage, count: usize, generated_at: DateTime<Utc>) {
        let band_height = self.summary_height.min(canvas.height());
        if band_height == 0 {
            return;
        }
        let band_top = canvas.height() - band_height;

        // Half-transparent black.
        for y in band_top..canvas.height() {
            for x in 0..canvas.width() {
                let pixel = canvas.get_pixel_mut(x, y);
                for channel in pixel.0.iter_mut() {
                    *channel /= 2;
                }
            }
        }

        let line_height = text_height(self.text_scale) as i32;
        let timestamp_text = format!(
            "Detection Time: {}",
            generated_at.format("%Y-%m-%d %H:%M:%S")
        );
        let count_text = format!("Objects Detected: {}", count);
        let top = band_top as i32;
        draw_text(canvas, 10, top + 5, &timestamp_text, WHITE, self.text_scale);
        draw_text(canvas, 10, top + 5 + line_height + 11, &count_text, WHITE, self.text_scale);
    }
}
