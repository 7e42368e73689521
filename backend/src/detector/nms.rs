use crate::detection::RawDetection;

/// Greedy class-aware non-maximum suppression.
///
/// Candidates are visited by descending confidence (stable on ties); a
/// candidate is dropped when it overlaps an already kept box of the same class
/// by more than `iou_threshold`. The result is ordered by confidence.
pub fn non_max_suppression(mut candidates: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept.iter().any(|existing| {
            existing.class_id == candidate.class_id
                && existing.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn raw(class_id: u32, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            bbox: BoundingBox::from_corners(x1, y1, x2, y2),
        }
    }

    #[test]
    fn overlapping_boxes_of_one_class_collapse_to_the_best() {
        let kept = non_max_suppression(
            vec![
                raw(0, 0.6, 12.0, 10.0, 112.0, 110.0),
                raw(0, 0.9, 10.0, 10.0, 110.0, 110.0),
                raw(0, 0.7, 300.0, 300.0, 400.0, 400.0),
            ],
            0.45,
        );
        let confidences: Vec<f32> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
    }

    #[test]
    fn different_classes_do_not_suppress_each_other() {
        let kept = non_max_suppression(
            vec![
                raw(0, 0.9, 10.0, 10.0, 110.0, 110.0),
                raw(2, 0.8, 10.0, 10.0, 110.0, 110.0),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn threshold_of_one_keeps_everything() {
        let kept = non_max_suppression(
            vec![
                raw(0, 0.9, 10.0, 10.0, 110.0, 110.0),
                raw(0, 0.8, 10.0, 10.0, 110.0, 110.0),
            ],
            1.0,
        );
        assert_eq!(kept.len(), 2);
    }
}
