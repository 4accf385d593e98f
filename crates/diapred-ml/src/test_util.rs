//! Shared fixtures for unit tests.

use diapred_core::PatientRecord;

/// Synthetic cohort: odd rows are diabetic (high glucose/insulin/BMI),
/// even rows are not.
pub(crate) fn synthetic_cohort(n: usize) -> Vec<PatientRecord> {
    (0..n)
        .map(|i| {
            let diabetic = i % 2 == 1;
            PatientRecord {
                id: i as f32,
                pregnancies: if diabetic { 6.0 } else { 1.0 },
                glucose: if diabetic { 150.0 + i as f32 } else { 80.0 + i as f32 },
                blood_pressure: 70.0,
                skin_thickness: 30.0,
                insulin: if diabetic { 200.0 } else { 90.0 },
                bmi: if diabetic { 34.0 } else { 26.0 },
                diabetes_pedigree_function: 0.5,
                age: if diabetic { 50.0 } else { 30.0 },
                output: if diabetic { 1.0 } else { 0.0 },
            }
        })
        .collect()
}
