use serde::{Deserialize, Serialize};
use shared::{BoundingBoxDto, CenterBoxDto, DetectionDto};

/// Axis-aligned box in corner form. This is the canonical representation;
/// [`CenterBox`] is only ever derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CenterBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Builds a box from two corners given in any order.
    pub fn from_corners(xa: f32, ya: f32, xb: f32, yb: f32) -> Self {
        Self {
            x1: xa.min(xb),
            y1: ya.min(yb),
            x2: xa.max(xb),
            y2: ya.max(yb),
        }
    }

    pub fn from_center(center: CenterBox) -> Self {
        let half_w = center.width / 2.0;
        let half_h = center.height / 2.0;
        Self::from_corners(
            center.x - half_w,
            center.y - half_h,
            center.x + half_w,
            center.y + half_h,
        )
    }

    pub fn to_center(&self) -> CenterBox {
        CenterBox {
            x: (self.x1 + self.x2) / 2.0,
            y: (self.y1 + self.y2) / 2.0,
            width: self.width(),
            height: self.height(),
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let w = width as f32;
        let h = height as f32;
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }
}

/// Detection as emitted by a detector, before ranking and name resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl From<&Detection> for DetectionDto {
    fn from(detection: &Detection) -> Self {
        let center = detection.bbox.to_center();
        DetectionDto {
            class_id: detection.class_id,
            class_name: detection.class_name.clone(),
            confidence: detection.confidence,
            bbox: BoundingBoxDto {
                x1: detection.bbox.x1,
                y1: detection.bbox.y1,
                x2: detection.bbox.x2,
                y2: detection.bbox.y2,
            },
            center: CenterBoxDto {
                x: center.x,
                y: center.y,
                width: center.width,
                height: center.height,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    #[test]
    fn center_and_corner_forms_round_trip() {
        let boxes = [
            BoundingBox::from_corners(60.0, 50.0, 140.0, 250.0),
            BoundingBox::from_corners(0.0, 0.0, 1.0, 1.0),
            BoundingBox::from_corners(240.5, 160.25, 360.75, 240.125),
            BoundingBox::from_corners(10.0, 10.0, 10.0, 10.0),
        ];
        for original in boxes {
            let back = BoundingBox::from_center(original.to_center());
            assert!((back.x1 - original.x1).abs() < EPS);
            assert!((back.y1 - original.y1).abs() < EPS);
            assert!((back.x2 - original.x2).abs() < EPS);
            assert!((back.y2 - original.y2).abs() < EPS);
        }
    }

    #[test]
    fn corners_are_reordered() {
        let bbox = BoundingBox::from_corners(100.0, 80.0, 20.0, 10.0);
        assert_eq!(bbox, BoundingBox { x1: 20.0, y1: 10.0, x2: 100.0, y2: 80.0 });
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::from_corners(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::from_corners(20.0, 20.0, 30.0, 30.0);
        let half = BoundingBox::from_corners(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < EPS);
        assert_eq!(a.iou(&b), 0.0);
        assert!((a.iou(&half) - 1.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn dto_carries_both_views() {
        let detection = Detection {
            class_id: 0,
            class_name: "person".into(),
            confidence: 0.95,
            bbox: BoundingBox::from_corners(60.0, 50.0, 140.0, 250.0),
        };
        let dto = DetectionDto::from(&detection);
        assert_eq!(dto.center, CenterBoxDto { x: 100.0, y: 150.0, width: 80.0, height: 200.0 });
        assert_eq!(dto.bbox.x2, 140.0);
    }
}
