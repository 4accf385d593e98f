//! K-fold cross-validation over the training subset.

use crate::data::fold_indices;
use crate::metrics::{evaluate, MulticlassMetrics};
use crate::pipeline::PipelineSpec;
use crate::trainer;
use diapred_core::{PatientRecord, Result};
use std::collections::HashSet;
use tracing::debug;

/// Run k-fold cross-validation of the declared pipeline.
///
/// Each fold is held out once while the pipeline is fitted on the
/// complement; the result is one metrics record per fold. A failure in
/// any fold aborts the whole run.
pub fn cross_validate(
    spec: &PipelineSpec,
    records: &[PatientRecord],
    folds: usize,
    seed: u64,
) -> Result<Vec<MulticlassMetrics>> {
    let fold_sets = fold_indices(records.len(), folds, seed)?;
    let mut out = Vec::with_capacity(folds);

    for (fold, holdout) in fold_sets.iter().enumerate() {
        let holdout_set: HashSet<usize> = holdout.iter().copied().collect();
        let train: Vec<PatientRecord> = records
            .iter()
            .enumerate()
            .filter(|(i, _)| !holdout_set.contains(i))
            .map(|(_, r)| r.clone())
            .collect();
        let eval: Vec<PatientRecord> = holdout.iter().map(|&i| records[i].clone()).collect();

        let model = trainer::fit(spec, &train)?;
        let metrics = evaluate(&model, &eval)?;
        debug!(fold = fold + 1, %metrics, "fold evaluated");
        out.push(metrics);
    }

    Ok(out)
}
