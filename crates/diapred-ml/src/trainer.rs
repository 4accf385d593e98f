//! Fits the declared pipeline on a set of patient records.

use crate::data::{features_tensor, FeatureScaler, LabelMap};
use crate::model::OneVsAllClassifier;
use crate::pipeline::PipelineSpec;
use candle_core::{Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use diapred_core::{DiapredError, PatientRecord, Result};
use tracing::{debug, info};

/// Fit the pipeline on `records`, producing a fitted model.
///
/// Synchronous and blocking. The label map is derived from the training
/// labels, then one binary learner per class is trained against the shared
/// feature matrix with full-batch gradient steps capped at
/// `spec.max_iterations`.
pub fn fit(spec: &PipelineSpec, records: &[PatientRecord]) -> Result<OneVsAllClassifier> {
    if records.is_empty() {
        return Err(DiapredError::Training(
            "Cannot fit the pipeline on an empty training set".to_string(),
        ));
    }

    let device = Device::Cpu;
    let label_map = LabelMap::from_labels(records.iter().map(|r| r.output))?;
    let scaler = FeatureScaler::fit(records)?;
    let features = scaler.transform(&features_tensor(records, &device)?)?;
    let model = OneVsAllClassifier::new_trainable(label_map, scaler, spec.seed, &device)?;

    info!(
        rows = records.len(),
        classes = model.num_classes(),
        iterations = spec.max_iterations,
        "fitting one-vs-all pipeline"
    );

    for (class, learner) in model.learners.iter().enumerate() {
        let targets: Vec<f32> = records
            .iter()
            .map(|r| {
                if model.label_map().class_of(r.output) == Some(class) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();
        let targets = Tensor::from_vec(targets, records.len(), &device)
            .map_err(|e| DiapredError::Training(format!("Failed to build target tensor: {e}")))?;

        let mut optimizer = AdamW::new(
            vec![learner.weight.clone(), learner.bias.clone()],
            ParamsAdamW {
                lr: spec.learning_rate,
                weight_decay: spec.weight_decay,
                ..Default::default()
            },
        )
        .map_err(|e| DiapredError::Training(format!("Failed to create optimizer: {e}")))?;

        let mut last_loss = f32::NAN;
        for _ in 0..spec.max_iterations {
            let logits = learner.forward_logits(&features)?;
            let loss = candle_nn::loss::binary_cross_entropy_with_logit(&logits, &targets)
                .map_err(|e| DiapredError::Training(format!("Loss computation failed: {e}")))?;
            optimizer
                .backward_step(&loss)
                .map_err(|e| DiapredError::Training(format!("Backward step failed: {e}")))?;
            last_loss = loss
                .to_scalar::<f32>()
                .map_err(|e| DiapredError::Training(format!("Loss scalar failed: {e}")))?;
        }
        debug!(class, loss = last_loss, "class learner fitted");
    }

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::PredictionEngine;
    use crate::test_util::synthetic_cohort;

    #[test]
    fn test_fit_rejects_empty_input() {
        let err = fit(&PipelineSpec::default(), &[]).unwrap_err();
        assert!(matches!(err, DiapredError::Training(_)));
    }

    #[test]
    fn test_fit_learns_both_classes() {
        let records = synthetic_cohort(20);
        let model = fit(&PipelineSpec::default(), &records).unwrap();
        assert_eq!(model.num_classes(), 2);
        assert_eq!(model.label_map().values(), &[0.0, 1.0]);
    }

    #[test]
    fn test_fit_handles_single_class_input() {
        let mut records = synthetic_cohort(10);
        for r in &mut records {
            r.output = 0.0;
        }
        let model = fit(&PipelineSpec::default(), &records).unwrap();
        assert_eq!(model.num_classes(), 1);
        let scores = model.score_one(&records[0].features()).unwrap();
        assert_eq!(scores, vec![1.0]);
    }

    #[test]
    fn test_same_seed_fits_identically() {
        let records = synthetic_cohort(16);
        let spec = PipelineSpec::default();

        let a = PredictionEngine::new(fit(&spec, &records).unwrap());
        let b = PredictionEngine::new(fit(&spec, &records).unwrap());

        for record in &records {
            let pa = a.predict(record).unwrap();
            let pb = b.predict(record).unwrap();
            assert_eq!(pa.label, pb.label);
            assert_eq!(pa.scores, pb.scores);
        }
    }
}
