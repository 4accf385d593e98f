//! Core types shared across the diapred crates.
//!
//! This crate contains the patient record and its statically declared
//! column schema, the prediction result type, the data-source trait the
//! storage layer implements, and the crate-wide error enum.

pub mod settings;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Patient record & schema
// ---------------------------------------------------------------------------

/// One row of the `Patient` table.
///
/// Every field is `f32`: the SQL query casts `Id` and `Output` to REAL and
/// the learner consumes single-precision features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Row identifier. Carried through for traceability, never used as a
    /// feature.
    pub id: f32,
    pub pregnancies: f32,
    pub glucose: f32,
    pub blood_pressure: f32,
    pub skin_thickness: f32,
    pub insulin: f32,
    pub bmi: f32,
    pub diabetes_pedigree_function: f32,
    pub age: f32,
    /// Diagnosis label (0 = no diabetes, 1 = diabetes). Ignored at
    /// inference time.
    pub output: f32,
}

impl PatientRecord {
    /// Feature values in [`PatientSchema::FEATURE_COLUMNS`] order.
    ///
    /// Training and inference both read features through this accessor,
    /// so the column ordering cannot drift between the two.
    pub fn features(&self) -> [f32; PatientSchema::FEATURE_DIM] {
        [
            self.pregnancies,
            self.glucose,
            self.blood_pressure,
            self.skin_thickness,
            self.insulin,
            self.bmi,
            self.diabetes_pedigree_function,
            self.age,
        ]
    }
}

/// Statically declared column schema for the `Patient` table.
///
/// The SQL SELECT, the feature-tensor assembly, and the prediction engine
/// all consume the same ordered column list, and the schema is embedded in
/// the model artifact so a loaded model can verify it was trained against
/// the same feature set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientSchema {
    pub id_column: String,
    pub feature_columns: Vec<String>,
    pub label_column: String,
}

impl PatientSchema {
    /// Number of feature columns.
    pub const FEATURE_DIM: usize = 8;

    /// Ordered feature column names.
    pub const FEATURE_COLUMNS: [&'static str; Self::FEATURE_DIM] = [
        "Pregnancies",
        "Glucose",
        "BloodPressure",
        "SkinThickness",
        "Insulin",
        "BMI",
        "DiabetesPedigreeFunction",
        "Age",
    ];

    pub const ID_COLUMN: &'static str = "Id";
    pub const LABEL_COLUMN: &'static str = "Output";
    pub const TABLE: &'static str = "Patient";
}

impl Default for PatientSchema {
    fn default() -> Self {
        Self {
            id_column: Self::ID_COLUMN.to_string(),
            feature_columns: Self::FEATURE_COLUMNS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            label_column: Self::LABEL_COLUMN.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Prediction result
// ---------------------------------------------------------------------------

/// Outcome of scoring one patient record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted label, mapped back to its original value.
    pub label: f32,
    /// Per-class scores, normalized to sum to 1.
    pub scores: Vec<f32>,
}

// ---------------------------------------------------------------------------
// Data source seam
// ---------------------------------------------------------------------------

/// A source of patient records, typically a SQL database.
#[async_trait]
pub trait PatientSource: Send + Sync {
    /// Materialize the full result set as an ordered sequence of records.
    async fn fetch_all(&self) -> Result<Vec<PatientRecord>>;
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Core error types. Every variant is fatal for a single run.
#[derive(thiserror::Error, Debug)]
pub enum DiapredError {
    /// Settings file missing, unreadable, or missing the connection string.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database unreachable or a row failed to decode.
    #[error("Data source error: {0}")]
    DataSource(String),

    /// Pipeline fitting or evaluation error.
    #[error("Training error: {0}")]
    Training(String),

    /// Model artifact write or read error.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Convenience alias for `std::result::Result<T, DiapredError>`.
pub type Result<T> = std::result::Result<T, DiapredError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PatientRecord {
        PatientRecord {
            id: 1.0,
            pregnancies: 6.0,
            glucose: 148.0,
            blood_pressure: 72.0,
            skin_thickness: 35.0,
            insulin: 200.0,
            bmi: 33.6,
            diabetes_pedigree_function: 0.627,
            age: 50.0,
            output: 1.0,
        }
    }

    #[test]
    fn test_features_follow_schema_order() {
        let f = record().features();
        assert_eq!(f.len(), PatientSchema::FEATURE_DIM);
        // Spot-check the ends and one middle column against the schema.
        assert_eq!(PatientSchema::FEATURE_COLUMNS[0], "Pregnancies");
        assert_eq!(f[0], 6.0);
        assert_eq!(PatientSchema::FEATURE_COLUMNS[4], "Insulin");
        assert_eq!(f[4], 200.0);
        assert_eq!(PatientSchema::FEATURE_COLUMNS[7], "Age");
        assert_eq!(f[7], 50.0);
    }

    #[test]
    fn test_default_schema_matches_consts() {
        let schema = PatientSchema::default();
        assert_eq!(schema.feature_columns.len(), PatientSchema::FEATURE_DIM);
        assert_eq!(schema.id_column, "Id");
        assert_eq!(schema.label_column, "Output");
        assert_eq!(schema.feature_columns[2], "BloodPressure");
    }

    #[test]
    fn test_schema_round_trips_through_json() {
        let schema = PatientSchema::default();
        let json = serde_json::to_string(&schema).unwrap();
        let back: PatientSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn test_error_display_names_the_step() {
        let e = DiapredError::DataSource("connection refused".to_string());
        assert!(e.to_string().contains("Data source error"));
        let e = DiapredError::Config("missing".to_string());
        assert!(e.to_string().starts_with("Configuration error"));
    }
}
