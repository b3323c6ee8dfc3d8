mod centroid;
pub mod preprocess;

#[cfg(feature = "candle-vision")]
mod candle_impl;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use sanitation_core::{ClassId, SanitationError, SanitationResult};
use serde::Serialize;
use tracing::info;

pub use centroid::{
    reference_features, CentroidImageClassifier, ReferenceExample, FEATURE_DIMS, POOL_GRID,
};
pub use preprocess::{preprocess, ImageTensor};

#[cfg(feature = "candle-vision")]
pub use candle_impl::{CandleResnetClassifier, ResnetArch};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassPrediction {
    pub class_id: ClassId,
    pub score: f32,
    pub model: String,
}

/// The single capability the disposal pipeline needs from a vision model:
/// a preprocessed image in, the argmax class id out.
pub trait ImageClassifier: Send + Sync {
    fn model_name(&self) -> &str;

    fn classify(&self, input: &ImageTensor) -> SanitationResult<ClassPrediction>;
}

/// Decode, preprocess and classify raw upload bytes.
pub fn classify_image(
    classifier: &dyn ImageClassifier,
    bytes: &[u8],
) -> SanitationResult<ClassPrediction> {
    let tensor = preprocess(bytes)?;
    classifier.classify(&tensor)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelBackend {
    /// JSONL reference set for the nearest-centroid classifier.
    Centroid { references: PathBuf },
    /// Pretrained ImageNet ResNet safetensors, run through candle.
    Candle { weights: PathBuf, arch: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionConfig {
    pub backend: ModelBackend,
}

impl VisionConfig {
    pub fn from_env() -> Self {
        let backend = env::var("SANITATION_MODEL_BACKEND").unwrap_or_else(|_| "centroid".to_string());
        let path = env::var("SANITATION_MODEL_PATH").ok();

        let backend = match backend.trim().to_lowercase().as_str() {
            "candle" | "resnet" => ModelBackend::Candle {
                weights: PathBuf::from(path.unwrap_or_else(|| "models/resnet18.safetensors".to_string())),
                arch: env::var("SANITATION_MODEL_ARCH").unwrap_or_else(|_| "resnet18".to_string()),
            },
            _ => ModelBackend::Centroid {
                references: PathBuf::from(
                    path.unwrap_or_else(|| "models/waste_references.jsonl".to_string()),
                ),
            },
        };

        Self { backend }
    }
}

#[derive(Clone)]
pub struct VisionStack {
    pub classifier: Arc<dyn ImageClassifier>,
}

impl VisionStack {
    pub fn new(classifier: Arc<dyn ImageClassifier>) -> Self {
        Self { classifier }
    }

    /// Loads the configured classifier once; every failure is `ModelUnavailable`.
    pub fn load(config: &VisionConfig) -> SanitationResult<Self> {
        let classifier: Arc<dyn ImageClassifier> = match &config.backend {
            ModelBackend::Centroid { references } => {
                if !references.exists() {
                    return Err(SanitationError::model_unavailable(format!(
                        "reference set {} does not exist",
                        references.display()
                    )));
                }
                let classifier =
                    CentroidImageClassifier::from_jsonl(references, "centroid-pooled-v1")
                        .map_err(|err| SanitationError::model_unavailable(err.to_string()))?;
                Arc::new(classifier)
            }
            ModelBackend::Candle { weights, arch } => load_candle(weights, arch)?,
        };

        info!(model = classifier.model_name(), "image classifier loaded");
        Ok(Self { classifier })
    }

    pub fn model_name(&self) -> &str {
        self.classifier.model_name()
    }
}

#[cfg(feature = "candle-vision")]
fn load_candle(weights: &std::path::Path, arch: &str) -> SanitationResult<Arc<dyn ImageClassifier>> {
    let arch = ResnetArch::parse(arch).ok_or_else(|| {
        SanitationError::model_unavailable(format!("unsupported resnet architecture {arch}"))
    })?;
    let classifier = CandleResnetClassifier::load(weights, arch)?;
    Ok(Arc::new(classifier))
}

#[cfg(not(feature = "candle-vision"))]
fn load_candle(_weights: &std::path::Path, _arch: &str) -> SanitationResult<Arc<dyn ImageClassifier>> {
    Err(SanitationError::model_unavailable(
        "built without the candle-vision feature",
    ))
}
