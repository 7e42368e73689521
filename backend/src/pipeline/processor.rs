use crate::detection::{BoundingBox, Detection, RawDetection};
use crate::pipeline::params::InferenceParams;

/// Filters, ranks, caps and names raw detections.
///
/// Order of operations matters: the cap is applied after the stable
/// descending sort, so the highest-confidence detections survive and ties
/// keep detector emission order.
pub fn process(raw: Vec<RawDetection>, params: &InferenceParams, classes: &[String]) -> Vec<Detection> {
    let mut kept: Vec<RawDetection> = raw
        .into_iter()
        .filter(|d| d.confidence.is_finite() && d.confidence >= params.confidence)
        .collect();

    // `sort_by` is stable.
    kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    kept.truncate(params.max_detections);

    kept.into_iter()
        .map(|d| Detection {
            class_id: d.class_id,
            class_name: class_name(classes, d.class_id),
            confidence: d.confidence,
            bbox: BoundingBox::from_corners(d.bbox.x1, d.bbox.y1, d.bbox.x2, d.bbox.y2),
        })
        .collect()
}

pub fn class_name(classes: &[String], class_id: u32) -> String {
    classes
        .get(class_id as usize)
        .cloned()
        .unwrap_or_else(|| format!("class_{}", class_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InferenceDefaults;

    fn raw(class_id: u32, confidence: f32) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            bbox: BoundingBox::from_corners(0.0, 0.0, 10.0, 10.0),
        }
    }

    fn params(confidence: f32, max_detections: usize) -> InferenceParams {
        InferenceParams {
            confidence,
            max_detections,
            ..InferenceDefaults::default().params()
        }
    }

    fn classes() -> Vec<String> {
        vec!["person".into(), "bicycle".into(), "car".into()]
    }

    #[test]
    fn threshold_keeps_only_the_confident_detection() {
        let result = process(vec![raw(0, 0.95), raw(2, 0.87)], &params(0.9, 100), &classes());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].confidence, 0.95);
        assert_eq!(result[0].class_name, "person");
    }

    #[test]
    fn every_result_meets_the_threshold() {
        let confidences = [0.05, 0.31, 0.5, 0.49, 0.99, 0.5, 0.73, 0.0, 1.0, f32::NAN];
        for threshold in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let input = confidences.iter().map(|&c| raw(1, c)).collect();
            let result = process(input, &params(threshold, 100), &classes());
            assert!(result.iter().all(|d| d.confidence >= threshold));
        }
    }

    #[test]
    fn sorting_is_descending_and_stable_on_ties() {
        let input = vec![raw(0, 0.6), raw(1, 0.9), raw(2, 0.6), raw(5, 0.9), raw(1, 0.7)];
        let result = process(input, &params(0.0, 100), &classes());
        let order: Vec<(u32, f32)> = result.iter().map(|d| (d.class_id, d.confidence)).collect();
        assert_eq!(order, vec![(1, 0.9), (5, 0.9), (1, 0.7), (0, 0.6), (2, 0.6)]);
    }

    #[test]
    fn cap_is_applied_after_sorting() {
        let input: Vec<RawDetection> = (0..20).map(|i| raw(0, i as f32 / 20.0)).collect();
        let result = process(input, &params(0.0, 3), &classes());
        assert_eq!(result.len(), 3);
        let confidences: Vec<f32> = result.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.95, 0.9, 0.85]);
    }

    #[test]
    fn unknown_class_ids_get_synthesized_names() {
        let result = process(vec![raw(2, 0.8), raw(42, 0.7)], &params(0.0, 10), &classes());
        assert_eq!(result[0].class_name, "car");
        assert_eq!(result[1].class_name, "class_42");
    }

    #[test]
    fn inverted_boxes_are_normalized() {
        let mut inverted = raw(0, 0.8);
        inverted.bbox = BoundingBox { x1: 50.0, y1: 40.0, x2: 10.0, y2: 5.0 };
        let result = process(vec![inverted], &params(0.0, 10), &classes());
        assert_eq!(result[0].bbox, BoundingBox { x1: 10.0, y1: 5.0, x2: 50.0, y2: 40.0 });
    }
}
