//! Seeded splitting, fold partitioning, feature scaling, and tensor
//! assembly.

use candle_core::{Device, Tensor};
use diapred_core::{DiapredError, PatientRecord, PatientSchema, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Train/test partition of the loaded dataset.
pub struct DataSplit {
    pub train: Vec<PatientRecord>,
    pub test: Vec<PatientRecord>,
}

/// Split `records` into disjoint train/test subsets.
///
/// After a seeded shuffle, `round(test_fraction * N)` rows land in the
/// test set. The same seed reproduces the same partition.
pub fn train_test_split(
    mut records: Vec<PatientRecord>,
    test_fraction: f64,
    seed: u64,
) -> DataSplit {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    records.shuffle(&mut rng);
    let test_len = ((records.len() as f64 * test_fraction).round() as usize).min(records.len());
    let train = records.split_off(test_len);
    DataSplit {
        train,
        test: records,
    }
}

/// Partition row indices into `folds` disjoint chunks after a seeded
/// shuffle. Every fold is non-empty when `len >= folds`.
pub fn fold_indices(len: usize, folds: usize, seed: u64) -> Result<Vec<Vec<usize>>> {
    if folds == 0 {
        return Err(DiapredError::Training(
            "Fold count must be positive".to_string(),
        ));
    }
    if len < folds {
        return Err(DiapredError::Training(format!(
            "Cannot form {folds} folds from {len} rows"
        )));
    }

    let mut indices: Vec<usize> = (0..len).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let mut out = Vec::with_capacity(folds);
    for fold in 0..folds {
        let start = fold * len / folds;
        let end = (fold + 1) * len / folds;
        out.push(indices[start..end].to_vec());
    }
    Ok(out)
}

/// Assemble the `[N, FEATURE_DIM]` feature matrix in schema column order.
pub fn features_tensor(records: &[PatientRecord], device: &Device) -> Result<Tensor> {
    let mut data = Vec::with_capacity(records.len() * PatientSchema::FEATURE_DIM);
    for record in records {
        data.extend_from_slice(&record.features());
    }
    Tensor::from_vec(data, (records.len(), PatientSchema::FEATURE_DIM), device)
        .map_err(|e| DiapredError::Training(format!("Failed to build feature tensor: {e}")))
}

/// Per-column z-score scaler fitted on the training set.
///
/// Features are standardized before every gradient step and every
/// prediction; the fitted parameters are persisted with the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl FeatureScaler {
    /// Fit column means and standard deviations on the training set.
    /// Constant columns get a unit deviation so they pass through
    /// centered.
    pub fn fit(records: &[PatientRecord]) -> Result<Self> {
        if records.is_empty() {
            return Err(DiapredError::Training(
                "Cannot fit a feature scaler on an empty dataset".to_string(),
            ));
        }
        let n = records.len() as f64;

        let mut mean = vec![0f64; PatientSchema::FEATURE_DIM];
        for record in records {
            for (m, v) in mean.iter_mut().zip(record.features()) {
                *m += f64::from(v);
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut var = vec![0f64; PatientSchema::FEATURE_DIM];
        for record in records {
            for ((s, v), m) in var.iter_mut().zip(record.features()).zip(&mean) {
                let d = f64::from(v) - m;
                *s += d * d;
            }
        }
        let std = var
            .iter()
            .map(|s| {
                let sd = (s / n).sqrt();
                if sd > 0.0 {
                    sd as f32
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Self {
            mean: mean.into_iter().map(|m| m as f32).collect(),
            std,
        })
    }

    /// Pass-through scaler (zero mean, unit deviation).
    pub fn identity() -> Self {
        Self {
            mean: vec![0.0; PatientSchema::FEATURE_DIM],
            std: vec![1.0; PatientSchema::FEATURE_DIM],
        }
    }

    /// Standardize a `[N, FEATURE_DIM]` batch.
    pub fn transform(&self, features: &Tensor) -> Result<Tensor> {
        let device = features.device();
        let mean = Tensor::from_vec(self.mean.clone(), (1, self.mean.len()), device)
            .map_err(|e| DiapredError::Training(format!("Failed to build mean tensor: {e}")))?;
        let std = Tensor::from_vec(self.std.clone(), (1, self.std.len()), device)
            .map_err(|e| DiapredError::Training(format!("Failed to build std tensor: {e}")))?;
        features
            .broadcast_sub(&mean)
            .and_then(|t| t.broadcast_div(&std))
            .map_err(|e| DiapredError::Training(format!("Failed to standardize features: {e}")))
    }
}

/// Mapping between raw label values and contiguous class indices.
///
/// Training maps each raw label to its class index; prediction maps the
/// winning class index back to the original value. Persisted with the
/// model so both directions survive a reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMap {
    values: Vec<f32>,
}

impl LabelMap {
    /// Build from training labels: distinct values, ascending.
    pub fn from_labels(labels: impl IntoIterator<Item = f32>) -> Result<Self> {
        let mut values: Vec<f32> = labels.into_iter().collect();
        values.sort_by(f32::total_cmp);
        values.dedup();
        if values.is_empty() {
            return Err(DiapredError::Training(
                "Cannot build a label map from an empty dataset".to_string(),
            ));
        }
        Ok(Self { values })
    }

    pub fn num_classes(&self) -> usize {
        self.values.len()
    }

    /// Class index of a raw label value, `None` if unseen at training time.
    pub fn class_of(&self, label: f32) -> Option<usize> {
        self.values.iter().position(|&v| v == label)
    }

    /// Raw label value for a class index.
    pub fn label_of(&self, class: usize) -> Option<f32> {
        self.values.get(class).copied()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_records(n: usize) -> Vec<PatientRecord> {
        (0..n)
            .map(|i| PatientRecord {
                id: i as f32,
                pregnancies: 1.0,
                glucose: 100.0 + i as f32,
                blood_pressure: 70.0,
                skin_thickness: 30.0,
                insulin: 100.0,
                bmi: 28.0,
                diabetes_pedigree_function: 0.4,
                age: 30.0,
                output: (i % 2) as f32,
            })
            .collect()
    }

    #[test]
    fn test_split_sizes_and_disjointness() {
        let split = train_test_split(make_records(100), 0.2, 42);
        assert_eq!(split.test.len(), 20);
        assert_eq!(split.train.len(), 80);

        let train_ids: Vec<u32> = split.train.iter().map(|r| r.id as u32).collect();
        for r in &split.test {
            assert!(!train_ids.contains(&(r.id as u32)));
        }
    }

    #[test]
    fn test_split_rounds_small_fractions() {
        // round(0.2 * 3) = 1
        let split = train_test_split(make_records(3), 0.2, 42);
        assert_eq!(split.test.len(), 1);
        assert_eq!(split.train.len(), 2);
    }

    #[test]
    fn test_split_is_seed_deterministic() {
        let a = train_test_split(make_records(50), 0.2, 7);
        let b = train_test_split(make_records(50), 0.2, 7);
        let ids = |rs: &[PatientRecord]| rs.iter().map(|r| r.id as u32).collect::<Vec<_>>();
        assert_eq!(ids(&a.test), ids(&b.test));
        assert_eq!(ids(&a.train), ids(&b.train));
    }

    #[test]
    fn test_fold_indices_cover_and_do_not_overlap() {
        let folds = fold_indices(25, 10, 42).unwrap();
        assert_eq!(folds.len(), 10);

        let mut seen = vec![false; 25];
        for fold in &folds {
            assert!(!fold.is_empty());
            for &i in fold {
                assert!(!seen[i], "index {i} assigned to two folds");
                seen[i] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_fold_indices_rejects_small_datasets() {
        assert!(fold_indices(9, 10, 42).is_err());
        assert!(fold_indices(10, 0, 42).is_err());
        assert!(fold_indices(10, 10, 42).is_ok());
    }

    #[test]
    fn test_features_tensor_shape() {
        let records = make_records(4);
        let t = features_tensor(&records, &Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[4, PatientSchema::FEATURE_DIM]);
        let rows: Vec<Vec<f32>> = t.to_vec2().unwrap();
        assert_eq!(rows[2][1], 102.0); // glucose of the third record
    }

    #[test]
    fn test_label_map_sorts_and_dedups() {
        let map = LabelMap::from_labels([1.0, 0.0, 1.0, 0.0, 1.0]).unwrap();
        assert_eq!(map.num_classes(), 2);
        assert_eq!(map.values(), &[0.0, 1.0]);
        assert_eq!(map.class_of(0.0), Some(0));
        assert_eq!(map.class_of(1.0), Some(1));
        assert_eq!(map.class_of(2.0), None);
        assert_eq!(map.label_of(1), Some(1.0));
        assert_eq!(map.label_of(5), None);
    }

    #[test]
    fn test_label_map_rejects_empty_input() {
        assert!(LabelMap::from_labels([]).is_err());
    }

    #[test]
    fn test_scaler_standardizes_columns() {
        let records = make_records(5); // glucose 100..104, other columns constant
        let scaler = FeatureScaler::fit(&records).unwrap();
        let scaled = scaler
            .transform(&features_tensor(&records, &Device::Cpu).unwrap())
            .unwrap();
        let rows: Vec<Vec<f32>> = scaled.to_vec2().unwrap();

        // Glucose column: mean 0, symmetric around the middle row.
        let glucose: Vec<f32> = rows.iter().map(|r| r[1]).collect();
        let mean: f32 = glucose.iter().sum::<f32>() / 5.0;
        assert!(mean.abs() < 1e-5);
        assert!((glucose[0] + glucose[4]).abs() < 1e-5);

        // Constant columns center to zero without dividing by zero.
        for row in &rows {
            assert!(row[2].abs() < 1e-6); // blood pressure
            assert!(row[2].is_finite());
        }
    }

    #[test]
    fn test_scaler_rejects_empty_input() {
        assert!(FeatureScaler::fit(&[]).is_err());
    }
}
