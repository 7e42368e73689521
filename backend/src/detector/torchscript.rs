use image::RgbImage;
use std::sync::Mutex;
use tch::{CModule, Device, Kind, Tensor};

use super::nms::non_max_suppression;
use super::preprocess::letterbox;
use super::{Detector, DetectorError};
use crate::detection::{BoundingBox, RawDetection};
use crate::pipeline::params::InferenceParams;

/// YOLO TorchScript export (`[1, 4 + classes, candidates]` output head).
pub struct TorchScriptDetector {
    module: Mutex<CModule>,
    device: Device,
    name: String,
}

fn parse_device(device: &str) -> Device {
    match device.trim().to_ascii_lowercase().as_str() {
        "cpu" => Device::Cpu,
        "cuda" => Device::cuda_if_available(),
        other => match other.strip_prefix("cuda:").and_then(|idx| idx.parse::<usize>().ok()) {
            Some(idx) if tch::Cuda::is_available() => Device::Cuda(idx),
            _ => Device::Cpu,
        },
    }
}

impl TorchScriptDetector {
    pub fn load(path: &str, device: &str) -> Result<Self, DetectorError> {
        let device = parse_device(device);
        let module = CModule::load_on_device(path, device)
            .map_err(|e| DetectorError::Backend(e.to_string()))?;
        log::info!("Loaded TorchScript module {} on {:?}", path, device);
        Ok(Self {
            module: Mutex::new(module),
            device,
            name: format!("torchscript:{}", path),
        })
    }

    fn forward(&self, input: Tensor) -> Result<Tensor, DetectorError> {
        let module = self
            .module
            .lock()
            .map_err(|_| DetectorError::Backend("TorchScript module poisoned".to_string()))?;
        tch::no_grad(|| module.forward_ts(&[input]))
            .map_err(|e| DetectorError::Backend(e.to_string()))
    }
}

impl Detector for TorchScriptDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn class_names(&self) -> Option<Vec<String>> {
        None
    }

    fn detect(
        &self,
        image: &RgbImage,
        params: &InferenceParams,
    ) -> Result<Vec<RawDetection>, DetectorError> {
        if parse_device(&params.device) != self.device {
            log::debug!(
                "Requested device {} differs from loaded device {:?}; using loaded device",
                params.device,
                self.device
            );
        }

        let size = params.image_size as i64;
        let prepared = letterbox(image, params.image_size);
        let (data, _) = prepared.tensor.clone().into_raw_vec_and_offset();
        let input = Tensor::from_slice(&data)
            .view([1, 3, size, size])
            .to_device(self.device);

        let output = self
            .forward(input)?
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .squeeze_dim(0);
        let shape = output.size();
        if shape.len() != 2 || shape[0] < 5 {
            return Err(DetectorError::Backend(format!(
                "unexpected output shape {:?}",
                shape
            )));
        }
        let rows = shape[0] as usize;
        let candidates = shape[1] as usize;
        let mut values = vec![0.0f32; rows * candidates];
        output
            .contiguous()
            .view([-1])
            .copy_data(&mut values, rows * candidates);

        let at = |row: usize, col: usize| values[row * candidates + col];
        let mut detections = Vec::new();
        for i in 0..candidates {
            let (class_id, score) = (4..rows)
                .map(|row| (row - 4, at(row, i)))
                .fold((0usize, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
            if score < params.confidence {
                continue;
            }
            let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
            let network_box =
                BoundingBox::from_corners(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0);
            detections.push(RawDetection {
                class_id: class_id as u32,
                confidence: score,
                bbox: prepared
                    .restore(&network_box)
                    .clamp_to(image.width(), image.height()),
            });
        }

        let mut kept = non_max_suppression(detections, params.iou_threshold);
        kept.truncate(params.max_detections);
        Ok(kept)
    }
}
