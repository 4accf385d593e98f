//! Declarative training pipeline description.

use diapred_core::PatientSchema;

/// Declarative description of the training pipeline: label mapping,
/// feature concatenation order (via the schema), and the one-vs-all
/// logistic learner's hyperparameters.
///
/// One value of this type drives both cross-validation and the final fit,
/// so the evaluated pipeline and the shipped pipeline are identical.
#[derive(Debug, Clone)]
pub struct PipelineSpec {
    /// Column schema shared with the data loader.
    pub schema: PatientSchema,
    /// Cap on full-batch gradient iterations per class learner.
    pub max_iterations: usize,
    /// Learner step size.
    pub learning_rate: f64,
    /// L2 penalty, applied through the optimizer's weight decay.
    pub weight_decay: f64,
    /// Base seed for weight initialization; per-class learners derive
    /// their own seeds from it.
    pub seed: u64,
}

impl Default for PipelineSpec {
    fn default() -> Self {
        Self {
            schema: PatientSchema::default(),
            max_iterations: 10,
            learning_rate: 0.1,
            weight_decay: 1e-4,
            seed: 42,
        }
    }
}
