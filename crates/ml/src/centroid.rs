use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use sanitation_core::{ClassId, SanitationError, SanitationResult};
use serde::{Deserialize, Serialize};

use crate::preprocess::ImageTensor;
use crate::{ClassPrediction, ImageClassifier};

/// Pooled grid side; features are `POOL_GRID * POOL_GRID * 3` long.
pub const POOL_GRID: usize = 8;
pub const FEATURE_DIMS: usize = POOL_GRID * POOL_GRID * 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceExample {
    pub class_id: ClassId,
    pub features: Vec<f32>,
}

/// Nearest-centroid classifier over average-pooled image features.
#[derive(Debug, Clone)]
pub struct CentroidImageClassifier {
    model_name: String,
    centroids: Vec<(ClassId, Vec<f32>)>,
}

impl CentroidImageClassifier {
    pub fn from_jsonl(path: impl AsRef<Path>, model_name: impl Into<String>) -> SanitationResult<Self> {
        let raw = fs::read_to_string(path.as_ref()).with_context(|| {
            format!(
                "failed reading image reference set at {}",
                path.as_ref().display()
            )
        })?;

        let mut examples = Vec::new();
        for (line_no, line) in raw
            .lines()
            .map(str::trim)
            .enumerate()
            .filter(|(_, line)| !line.is_empty())
        {
            let example: ReferenceExample = serde_json::from_str(line).map_err(|err| {
                SanitationError::InvalidReferenceSet(format!("line {}: {err}", line_no + 1))
            })?;
            examples.push(example);
        }

        Self::from_examples(examples, model_name)
    }

    pub fn from_examples(
        examples: impl IntoIterator<Item = ReferenceExample>,
        model_name: impl Into<String>,
    ) -> SanitationResult<Self> {
        let mut by_class: BTreeMap<ClassId, Vec<Vec<f32>>> = BTreeMap::new();

        for example in examples {
            if example.features.len() != FEATURE_DIMS {
                return Err(SanitationError::InvalidReferenceSet(format!(
                    "class {} has {} features, expected {}",
                    example.class_id,
                    example.features.len(),
                    FEATURE_DIMS
                )));
            }
            by_class
                .entry(example.class_id)
                .or_default()
                .push(example.features);
        }

        let centroids = by_class
            .into_iter()
            .map(|(class_id, vectors)| (class_id, centroid(&vectors)))
            .collect::<Vec<_>>();

        if centroids.is_empty() {
            return Err(SanitationError::InvalidReferenceSet(
                "reference set produced zero class centroids".to_string(),
            ));
        }

        Ok(Self {
            model_name: model_name.into(),
            centroids,
        })
    }

    pub fn class_count(&self) -> usize {
        self.centroids.len()
    }
}

impl ImageClassifier for CentroidImageClassifier {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn classify(&self, input: &ImageTensor) -> SanitationResult<ClassPrediction> {
        let query = reference_features(input);
        let mut best_class = self.centroids[0].0;
        let mut best_score = -1.0_f32;

        for (class_id, center) in &self.centroids {
            let score = cosine_similarity(&query, center);
            if score > best_score {
                best_score = score;
                best_class = *class_id;
            }
        }

        Ok(ClassPrediction {
            class_id: best_class,
            score: ((best_score + 1.0) / 2.0).clamp(0.0, 1.0),
            model: self.model_name.clone(),
        })
    }
}

/// Average-pools each channel onto a `POOL_GRID` square and L2-normalizes.
pub fn reference_features(input: &ImageTensor) -> Vec<f32> {
    let (height, width) = (input.height(), input.width());
    let mut features = vec![0.0_f32; FEATURE_DIMS];
    let mut counts = vec![0_u32; POOL_GRID * POOL_GRID];

    for channel in 0..3 {
        let plane = input.channel(channel);
        for y in 0..height {
            let cell_y = y * POOL_GRID / height.max(1);
            for x in 0..width {
                let cell_x = x * POOL_GRID / width.max(1);
                let cell = cell_y * POOL_GRID + cell_x;
                features[channel * POOL_GRID * POOL_GRID + cell] += plane[y * width + x];
                if channel == 0 {
                    counts[cell] += 1;
                }
            }
        }
    }

    for channel in 0..3 {
        for (cell, count) in counts.iter().enumerate() {
            if *count > 0 {
                features[channel * POOL_GRID * POOL_GRID + cell] /= *count as f32;
            }
        }
    }

    normalize(&mut features);
    features
}

fn centroid(vectors: &[Vec<f32>]) -> Vec<f32> {
    let dims = vectors.first().map(Vec::len).unwrap_or(0);
    let mut acc = vec![0.0_f32; dims];

    for vector in vectors {
        for (idx, value) in vector.iter().enumerate() {
            acc[idx] += value;
        }
    }

    for value in &mut acc {
        *value /= vectors.len() as f32;
    }
    normalize(&mut acc);
    acc
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut a_norm = 0.0;
    let mut b_norm = 0.0;
    for (lhs, rhs) in a.iter().zip(b.iter()) {
        dot += lhs * rhs;
        a_norm += lhs * lhs;
        b_norm += rhs * rhs;
    }

    if a_norm == 0.0 || b_norm == 0.0 {
        0.0
    } else {
        dot / (a_norm.sqrt() * b_norm.sqrt())
    }
}

fn normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in values.iter_mut() {
            *value /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use image::{Rgb, RgbImage};

    use super::*;
    use crate::preprocess::preprocess_rgb;

    fn tensor_of(color: [u8; 3]) -> ImageTensor {
        preprocess_rgb(&RgbImage::from_pixel(256, 256, Rgb(color)))
    }

    fn half_split(left: [u8; 3], right: [u8; 3]) -> ImageTensor {
        let img = RgbImage::from_fn(256, 256, |x, _| if x < 128 { Rgb(left) } else { Rgb(right) });
        preprocess_rgb(&img)
    }

    fn example(class_id: ClassId, tensor: &ImageTensor) -> ReferenceExample {
        ReferenceExample {
            class_id,
            features: reference_features(tensor),
        }
    }

    #[test]
    fn features_have_fixed_dims() {
        assert_eq!(reference_features(&tensor_of([1, 2, 3])).len(), FEATURE_DIMS);
    }

    #[test]
    fn picks_the_closest_reference() {
        let green_leaves = half_split([20, 200, 40], [200, 20, 40]);
        let blue_bottles = half_split([200, 20, 40], [20, 40, 220]);
        let classifier = CentroidImageClassifier::from_examples(
            vec![example(937, &green_leaves), example(566, &blue_bottles)],
            "test-centroid",
        )
        .unwrap();

        let prediction = classifier.classify(&green_leaves).unwrap();
        assert_eq!(prediction.class_id, 937);
        assert_eq!(prediction.model, "test-centroid");

        let prediction = classifier.classify(&blue_bottles).unwrap();
        assert_eq!(prediction.class_id, 566);
    }

    #[test]
    fn empty_reference_set_is_rejected() {
        assert!(matches!(
            CentroidImageClassifier::from_examples(Vec::new(), "empty"),
            Err(SanitationError::InvalidReferenceSet(_))
        ));
    }

    #[test]
    fn wrong_feature_length_is_rejected() {
        let bad = ReferenceExample {
            class_id: 1,
            features: vec![0.5; 3],
        };
        assert!(CentroidImageClassifier::from_examples(vec![bad], "bad").is_err());
    }

    #[test]
    fn loads_reference_set_from_jsonl() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let line = serde_json::to_string(&example(483, &tensor_of([90, 90, 90]))).unwrap();
        writeln!(file, "{line}").unwrap();
        writeln!(file).unwrap();

        let classifier = CentroidImageClassifier::from_jsonl(file.path(), "jsonl").unwrap();
        assert_eq!(classifier.class_count(), 1);
    }
}
