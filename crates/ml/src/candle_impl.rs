use std::path::Path;

use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{Func, VarBuilder};
use candle_transformers::models::resnet;
use sanitation_core::{ClassId, SanitationError, SanitationResult};

use crate::preprocess::ImageTensor;
use crate::{ClassPrediction, ImageClassifier};

const IMAGENET_CLASSES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResnetArch {
    Resnet18,
    Resnet34,
    Resnet50,
}

impl ResnetArch {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "resnet18" | "18" => Some(Self::Resnet18),
            "resnet34" | "34" => Some(Self::Resnet34),
            "resnet50" | "50" => Some(Self::Resnet50),
            _ => None,
        }
    }

    fn model_name(self) -> &'static str {
        match self {
            Self::Resnet18 => "candle-resnet18-imagenet",
            Self::Resnet34 => "candle-resnet34-imagenet",
            Self::Resnet50 => "candle-resnet50-imagenet",
        }
    }
}

/// Pretrained ImageNet ResNet, inference only, on CPU.
pub struct CandleResnetClassifier {
    model: Func<'static>,
    device: Device,
    arch: ResnetArch,
}

impl CandleResnetClassifier {
    pub fn load(weights: &Path, arch: ResnetArch) -> SanitationResult<Self> {
        if !weights.exists() {
            return Err(SanitationError::model_unavailable(format!(
                "weights {} do not exist",
                weights.display()
            )));
        }

        let device = Device::Cpu;
        // SAFETY: the weights file is opened read-only and not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device) }
            .map_err(|err| SanitationError::model_unavailable(format!("failed to map weights: {err}")))?;

        let model = match arch {
            ResnetArch::Resnet18 => resnet::resnet18(IMAGENET_CLASSES, vb),
            ResnetArch::Resnet34 => resnet::resnet34(IMAGENET_CLASSES, vb),
            ResnetArch::Resnet50 => resnet::resnet50(IMAGENET_CLASSES, vb),
        }
        .map_err(|err| SanitationError::model_unavailable(format!("failed to build {arch:?}: {err}")))?;

        Ok(Self { model, device, arch })
    }

    fn forward(&self, input: &ImageTensor) -> candle_core::Result<(u32, f32)> {
        let pixels = Tensor::from_slice(input.data(), (3, input.height(), input.width()), &self.device)?
            .unsqueeze(0)?;
        let logits = self.model.forward(&pixels)?.squeeze(0)?;
        let probs = candle_nn::ops::softmax(&logits, D::Minus1)?;
        let class = probs.argmax(D::Minus1)?.to_scalar::<u32>()?;
        let score = probs.get(class as usize)?.to_scalar::<f32>()?;
        Ok((class, score))
    }
}

impl ImageClassifier for CandleResnetClassifier {
    fn model_name(&self) -> &str {
        self.arch.model_name()
    }

    fn classify(&self, input: &ImageTensor) -> SanitationResult<ClassPrediction> {
        let (class, score) = self
            .forward(input)
            .map_err(|err| SanitationError::model_unavailable(format!("inference failed: {err}")))?;

        Ok(ClassPrediction {
            class_id: class as ClassId,
            score,
            model: self.model_name().to_string(),
        })
    }
}
