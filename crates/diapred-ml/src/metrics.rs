//! Multiclass evaluation metrics.
//!
//! Computes micro/macro accuracy, log-loss, and log-loss reduction from
//! per-row class scores and ground-truth class indices.

use crate::data::features_tensor;
use crate::model::OneVsAllClassifier;
use diapred_core::{DiapredError, PatientRecord, Result};

/// Probability floor for the log-loss, so an impossible truth class does
/// not produce an infinite penalty.
const PROB_FLOOR: f64 = 1e-15;

/// Metrics for one evaluation pass (a cross-validation fold or the
/// held-out test set).
#[derive(Debug, Clone)]
pub struct MulticlassMetrics {
    /// Global fraction of correctly predicted rows.
    pub micro_accuracy: f64,
    /// Mean per-class recall over the classes present in the truth.
    pub macro_accuracy: f64,
    /// Mean negative log probability of the true class.
    pub log_loss: f64,
    /// Improvement over predicting the empirical class prior,
    /// `1 - log_loss / prior_log_loss`.
    pub log_loss_reduction: f64,
}

impl MulticlassMetrics {
    /// Field-wise mean across folds.
    pub fn average(folds: &[Self]) -> Self {
        let n = folds.len().max(1) as f64;
        Self {
            micro_accuracy: folds.iter().map(|m| m.micro_accuracy).sum::<f64>() / n,
            macro_accuracy: folds.iter().map(|m| m.macro_accuracy).sum::<f64>() / n,
            log_loss: folds.iter().map(|m| m.log_loss).sum::<f64>() / n,
            log_loss_reduction: folds.iter().map(|m| m.log_loss_reduction).sum::<f64>() / n,
        }
    }
}

impl std::fmt::Display for MulticlassMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "micro_acc={:.4} macro_acc={:.4} log_loss={:.4} log_loss_red={:.4}",
            self.micro_accuracy, self.macro_accuracy, self.log_loss, self.log_loss_reduction,
        )
    }
}

/// Score a fitted model on labelled records.
pub fn evaluate(model: &OneVsAllClassifier, records: &[PatientRecord]) -> Result<MulticlassMetrics> {
    if records.is_empty() {
        return Err(DiapredError::Training(
            "Cannot evaluate on an empty record set".to_string(),
        ));
    }
    let features = features_tensor(records, model.device())?;
    let scores: Vec<Vec<f32>> = model
        .score_batch(&features)?
        .to_vec2()
        .map_err(|e| DiapredError::Training(format!("Failed to extract score matrix: {e}")))?;
    let truth: Vec<Option<usize>> = records
        .iter()
        .map(|r| model.label_map().class_of(r.output))
        .collect();
    Ok(compute_metrics(&scores, &truth, model.num_classes()))
}

/// Index of the highest score.
pub(crate) fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Metric formulas over per-row score vectors and truth class indices.
///
/// A `None` truth entry is a label the model never saw at training time;
/// such rows count as misclassified and score the probability floor in
/// the log-loss.
pub(crate) fn compute_metrics(
    scores: &[Vec<f32>],
    truth: &[Option<usize>],
    num_classes: usize,
) -> MulticlassMetrics {
    let n = scores.len() as f64;
    let mut correct = 0usize;
    let mut class_total = vec![0usize; num_classes];
    let mut class_correct = vec![0usize; num_classes];
    let mut log_loss_sum = 0.0;

    for (row, t) in scores.iter().zip(truth) {
        let predicted = argmax(row);
        match *t {
            Some(class) => {
                class_total[class] += 1;
                if predicted == class {
                    correct += 1;
                    class_correct[class] += 1;
                }
                let p = f64::from(row[class]).max(PROB_FLOOR);
                log_loss_sum -= p.ln();
            }
            None => {
                log_loss_sum -= PROB_FLOOR.ln();
            }
        }
    }

    let micro_accuracy = correct as f64 / n;

    let present: Vec<usize> = (0..num_classes).filter(|&c| class_total[c] > 0).collect();
    let macro_accuracy = if present.is_empty() {
        0.0
    } else {
        present
            .iter()
            .map(|&c| class_correct[c] as f64 / class_total[c] as f64)
            .sum::<f64>()
            / present.len() as f64
    };

    let log_loss = log_loss_sum / n;

    // Prior log-loss: the penalty of always predicting the evaluation
    // set's empirical class distribution.
    let mut prior_sum = 0.0;
    for t in truth {
        let prior = match *t {
            Some(class) => (class_total[class] as f64 / n).max(PROB_FLOOR),
            None => PROB_FLOOR,
        };
        prior_sum -= prior.ln();
    }
    let prior_log_loss = prior_sum / n;
    let log_loss_reduction = if prior_log_loss > 0.0 {
        1.0 - log_loss / prior_log_loss
    } else {
        0.0
    };

    MulticlassMetrics {
        micro_accuracy,
        macro_accuracy,
        log_loss,
        log_loss_reduction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_predictions() {
        let scores = vec![vec![0.9, 0.1], vec![0.8, 0.2], vec![0.2, 0.8], vec![0.1, 0.9]];
        let truth = vec![Some(0), Some(0), Some(1), Some(1)];
        let m = compute_metrics(&scores, &truth, 2);
        assert!((m.micro_accuracy - 1.0).abs() < 1e-9);
        assert!((m.macro_accuracy - 1.0).abs() < 1e-9);

        let expected_ll =
            -(0.9f64.ln() + 0.8f64.ln() + 0.8f64.ln() + 0.9f64.ln()) / 4.0;
        assert!((m.log_loss - expected_ll).abs() < 1e-6);

        // Balanced prior: prior log-loss is ln 2, well above the model's.
        let prior_ll = (2.0f64).ln();
        assert!((m.log_loss_reduction - (1.0 - expected_ll / prior_ll)).abs() < 1e-6);
    }

    #[test]
    fn test_all_wrong_predictions() {
        let scores = vec![vec![0.1, 0.9], vec![0.9, 0.1]];
        let truth = vec![Some(0), Some(1)];
        let m = compute_metrics(&scores, &truth, 2);
        assert!(m.micro_accuracy.abs() < 1e-9);
        assert!(m.macro_accuracy.abs() < 1e-9);
        assert!(m.log_loss_reduction < 0.0);
    }

    #[test]
    fn test_imbalanced_macro_differs_from_micro() {
        // Three class-0 rows right, one class-1 row wrong:
        // micro = 3/4, macro = (1.0 + 0.0) / 2.
        let scores = vec![
            vec![0.9, 0.1],
            vec![0.9, 0.1],
            vec![0.9, 0.1],
            vec![0.9, 0.1],
        ];
        let truth = vec![Some(0), Some(0), Some(0), Some(1)];
        let m = compute_metrics(&scores, &truth, 2);
        assert!((m.micro_accuracy - 0.75).abs() < 1e-9);
        assert!((m.macro_accuracy - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_unseen_truth_label_counts_against_the_model() {
        let scores = vec![vec![0.9, 0.1], vec![0.9, 0.1]];
        let truth = vec![Some(0), None];
        let m = compute_metrics(&scores, &truth, 2);
        assert!((m.micro_accuracy - 0.5).abs() < 1e-9);
        assert!(m.log_loss > 10.0); // floor penalty dominates
    }

    #[test]
    fn test_average_is_field_wise_mean() {
        let a = MulticlassMetrics {
            micro_accuracy: 0.8,
            macro_accuracy: 0.7,
            log_loss: 0.5,
            log_loss_reduction: 0.2,
        };
        let b = MulticlassMetrics {
            micro_accuracy: 0.6,
            macro_accuracy: 0.5,
            log_loss: 0.7,
            log_loss_reduction: 0.0,
        };
        let avg = MulticlassMetrics::average(&[a, b]);
        assert!((avg.micro_accuracy - 0.7).abs() < 1e-9);
        assert!((avg.macro_accuracy - 0.6).abs() < 1e-9);
        assert!((avg.log_loss - 0.6).abs() < 1e-9);
        assert!((avg.log_loss_reduction - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_argmax_picks_highest_score() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[0.9]), 0);
    }
}
