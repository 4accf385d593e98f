//! One-vs-all multiclass reduction over binary logistic learners.
//!
//! Each class gets its own `Linear(FEATURE_DIM -> 1)` learner trained with
//! a sigmoid cross-entropy loss, i.e. binary logistic regression. At
//! scoring time the per-class sigmoid probabilities are renormalized so
//! every score vector sums to 1.

use crate::data::{FeatureScaler, LabelMap};
use candle_core::{Device, Tensor, Var};
use candle_nn::{Linear, Module};
use diapred_core::{DiapredError, PatientSchema, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Per-class binary logistic learner.
#[derive(Debug)]
pub(crate) struct BinaryLogistic {
    pub(crate) weight: Var,
    pub(crate) bias: Var,
}

impl BinaryLogistic {
    /// Fresh learner with seeded uniform weight init and zero bias.
    fn new_seeded(seed: u64, device: &Device) -> Result<Self> {
        let bound = 1.0 / (PatientSchema::FEATURE_DIM as f64).sqrt();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let init: Vec<f32> = (0..PatientSchema::FEATURE_DIM)
            .map(|_| rng.gen_range(-bound..bound) as f32)
            .collect();

        let weight = Tensor::from_vec(init, (1, PatientSchema::FEATURE_DIM), device)
            .and_then(|t| Var::from_tensor(&t))
            .map_err(|e| DiapredError::Training(format!("Failed to init learner weight: {e}")))?;
        let bias = Tensor::zeros(1, candle_core::DType::F32, device)
            .and_then(|t| Var::from_tensor(&t))
            .map_err(|e| DiapredError::Training(format!("Failed to init learner bias: {e}")))?;

        Ok(Self { weight, bias })
    }

    /// Rebuild a learner from persisted weight `[1, FEATURE_DIM]` and bias
    /// `[1]` tensors.
    fn from_tensors(weight: Tensor, bias: Tensor) -> Result<Self> {
        let weight = Var::from_tensor(&weight)
            .map_err(|e| DiapredError::Training(format!("Failed to wrap learner weight: {e}")))?;
        let bias = Var::from_tensor(&bias)
            .map_err(|e| DiapredError::Training(format!("Failed to wrap learner bias: {e}")))?;
        Ok(Self { weight, bias })
    }

    /// Raw logits for a `[N, FEATURE_DIM]` batch, shape `[N]`.
    pub(crate) fn forward_logits(&self, features: &Tensor) -> Result<Tensor> {
        let linear = Linear::new(
            self.weight.as_tensor().clone(),
            Some(self.bias.as_tensor().clone()),
        );
        linear
            .forward(features)
            .and_then(|t| t.squeeze(1))
            .map_err(|e| DiapredError::Training(format!("Learner forward pass failed: {e}")))
    }
}

/// One-vs-all multiclass classifier: one binary learner per class, plus
/// the feature scaler fitted alongside the learners.
#[derive(Debug)]
pub struct OneVsAllClassifier {
    pub(crate) learners: Vec<BinaryLogistic>,
    label_map: LabelMap,
    scaler: FeatureScaler,
    device: Device,
}

impl OneVsAllClassifier {
    /// Create a trainable classifier with one seeded learner per class.
    ///
    /// Class learners derive their seeds from the base seed, so the same
    /// seed always produces the same initial weights.
    pub(crate) fn new_trainable(
        label_map: LabelMap,
        scaler: FeatureScaler,
        seed: u64,
        device: &Device,
    ) -> Result<Self> {
        let learners = (0..label_map.num_classes())
            .map(|class| BinaryLogistic::new_seeded(seed.wrapping_add(class as u64), device))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            learners,
            label_map,
            scaler,
            device: device.clone(),
        })
    }

    /// Rebuild a classifier from persisted per-class tensors.
    pub(crate) fn from_parts(
        parts: Vec<(Tensor, Tensor)>,
        label_map: LabelMap,
        scaler: FeatureScaler,
        device: &Device,
    ) -> Result<Self> {
        if parts.len() != label_map.num_classes() {
            return Err(DiapredError::Training(format!(
                "Expected {} class learners, got {}",
                label_map.num_classes(),
                parts.len()
            )));
        }
        let learners = parts
            .into_iter()
            .map(|(weight, bias)| BinaryLogistic::from_tensors(weight, bias))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            learners,
            label_map,
            scaler,
            device: device.clone(),
        })
    }

    pub fn label_map(&self) -> &LabelMap {
        &self.label_map
    }

    pub fn scaler(&self) -> &FeatureScaler {
        &self.scaler
    }

    pub fn num_classes(&self) -> usize {
        self.learners.len()
    }

    /// Returns a reference to the device this classifier runs on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Per-class probabilities for a `[N, FEATURE_DIM]` batch of raw
    /// features, shape `[N, C]`, each row normalized to sum to 1.
    pub fn score_batch(&self, features: &Tensor) -> Result<Tensor> {
        let features = self.scaler.transform(features)?;
        let mut columns = Vec::with_capacity(self.learners.len());
        for learner in &self.learners {
            let logits = learner.forward_logits(&features)?;
            let probs = candle_nn::ops::sigmoid(&logits)
                .map_err(|e| DiapredError::Training(format!("Sigmoid failed: {e}")))?;
            columns.push(probs);
        }
        let stacked = Tensor::stack(&columns, 1)
            .map_err(|e| DiapredError::Training(format!("Failed to stack class scores: {e}")))?;
        // f32 sigmoids can saturate to exactly 0.0, so floor the divisor.
        let sums = stacked
            .sum_keepdim(1)
            .and_then(|t| t.affine(1.0, 1e-12))
            .map_err(|e| DiapredError::Training(format!("Failed to sum class scores: {e}")))?;
        stacked
            .broadcast_div(&sums)
            .map_err(|e| DiapredError::Training(format!("Failed to normalize scores: {e}")))
    }

    /// Normalized per-class scores for a single feature vector.
    pub fn score_one(&self, features: &[f32]) -> Result<Vec<f32>> {
        let input = Tensor::from_vec(features.to_vec(), (1, features.len()), &self.device)
            .map_err(|e| DiapredError::Training(format!("Failed to build input tensor: {e}")))?;
        let scores = self.score_batch(&input)?;
        scores
            .squeeze(0)
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| DiapredError::Training(format!("Failed to extract scores: {e}")))
    }
}
