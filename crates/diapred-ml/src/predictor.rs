//! Single-record prediction engine over a fitted model.

use crate::metrics::argmax;
use crate::model::OneVsAllClassifier;
use diapred_core::{DiapredError, PatientRecord, Prediction, Result};

/// Scores individual patient records against a fitted model.
pub struct PredictionEngine {
    model: OneVsAllClassifier,
}

impl PredictionEngine {
    pub fn new(model: OneVsAllClassifier) -> Self {
        Self { model }
    }

    /// Predict the class of one record. The record's `output` field is
    /// ignored; features are read in the same schema order used at
    /// training time.
    pub fn predict(&self, record: &PatientRecord) -> Result<Prediction> {
        let scores = self.model.score_one(&record.features())?;
        let class = argmax(&scores);
        let label = self.model.label_map().label_of(class).ok_or_else(|| {
            DiapredError::Training("Score vector is wider than the label map".to_string())
        })?;
        Ok(Prediction { label, scores })
    }

    pub fn model(&self) -> &OneVsAllClassifier {
        &self.model
    }
}
