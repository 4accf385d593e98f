//! Single-file model persistence.
//!
//! The artifact is a safetensors payload holding every class learner's
//! weight and bias, with the training schema and label map embedded as
//! JSON in the safetensors metadata header. Loading verifies the embedded
//! schema against the caller's, so a model can never silently score a
//! different feature set than it was trained on.

use crate::data::{FeatureScaler, LabelMap};
use crate::model::OneVsAllClassifier;
use candle_core::{Device, Tensor};
use diapred_core::{DiapredError, PatientSchema, Result};
use safetensors::SafeTensors;
use std::collections::HashMap;
use std::path::Path;

const SCHEMA_KEY: &str = "diapred.schema";
const LABELS_KEY: &str = "diapred.labels";
const SCALER_KEY: &str = "diapred.scaler";

/// Serialize the fitted model and its training schema to `path`,
/// overwriting any existing file.
pub fn save(model: &OneVsAllClassifier, schema: &PatientSchema, path: &Path) -> Result<()> {
    let mut tensors: Vec<(String, Tensor)> = Vec::with_capacity(model.num_classes() * 2);
    for (class, learner) in model.learners.iter().enumerate() {
        tensors.push((
            format!("class{class}.weight"),
            learner.weight.as_tensor().clone(),
        ));
        tensors.push((
            format!("class{class}.bias"),
            learner.bias.as_tensor().clone(),
        ));
    }

    let mut metadata = HashMap::new();
    metadata.insert(
        SCHEMA_KEY.to_string(),
        serde_json::to_string(schema)
            .map_err(|e| DiapredError::Persistence(format!("Failed to encode schema: {e}")))?,
    );
    metadata.insert(
        LABELS_KEY.to_string(),
        serde_json::to_string(model.label_map())
            .map_err(|e| DiapredError::Persistence(format!("Failed to encode label map: {e}")))?,
    );
    metadata.insert(
        SCALER_KEY.to_string(),
        serde_json::to_string(model.scaler())
            .map_err(|e| DiapredError::Persistence(format!("Failed to encode scaler: {e}")))?,
    );

    let payload = safetensors::serialize(
        tensors.iter().map(|(name, t)| (name.as_str(), t)),
        &Some(metadata),
    )
    .map_err(|e| DiapredError::Persistence(format!("Failed to serialize model: {e}")))?;

    std::fs::write(path, payload).map_err(|e| {
        DiapredError::Persistence(format!("Failed to write {}: {e}", path.display()))
    })
}

/// Load a fitted model from `path`, verifying its embedded schema against
/// `expected_schema`.
pub fn load(
    path: &Path,
    expected_schema: &PatientSchema,
    device: &Device,
) -> Result<OneVsAllClassifier> {
    let data = std::fs::read(path)
        .map_err(|e| DiapredError::Persistence(format!("Failed to read {}: {e}", path.display())))?;

    let (schema, label_map, scaler) = read_manifest(&data)?;
    if &schema != expected_schema {
        return Err(DiapredError::Persistence(
            "Artifact schema does not match the expected patient schema".to_string(),
        ));
    }

    let tensors = SafeTensors::deserialize(&data)
        .map_err(|e| DiapredError::Persistence(format!("Failed to parse artifact: {e}")))?;

    let mut parts = Vec::with_capacity(label_map.num_classes());
    for class in 0..label_map.num_classes() {
        let weight = tensor_f32(&tensors, &format!("class{class}.weight"), device)?;
        let bias = tensor_f32(&tensors, &format!("class{class}.bias"), device)?;
        if weight.dims() != [1, PatientSchema::FEATURE_DIM] {
            return Err(DiapredError::Persistence(format!(
                "Weight tensor for class {class} has shape {:?}, expected [1, {}]",
                weight.dims(),
                PatientSchema::FEATURE_DIM
            )));
        }
        parts.push((weight, bias));
    }

    OneVsAllClassifier::from_parts(parts, label_map, scaler, device)
}

/// Decode the schema, label map, and scaler from the metadata header.
fn read_manifest(data: &[u8]) -> Result<(PatientSchema, LabelMap, FeatureScaler)> {
    let (_header_len, header) = SafeTensors::read_metadata(data)
        .map_err(|e| DiapredError::Persistence(format!("Failed to read artifact header: {e}")))?;
    let table = header.metadata().as_ref().ok_or_else(|| {
        DiapredError::Persistence("Artifact carries no metadata header".to_string())
    })?;

    let schema: PatientSchema = table
        .get(SCHEMA_KEY)
        .ok_or_else(|| DiapredError::Persistence("Artifact is missing its schema".to_string()))
        .and_then(|raw| {
            serde_json::from_str(raw)
                .map_err(|e| DiapredError::Persistence(format!("Invalid schema JSON: {e}")))
        })?;
    let label_map: LabelMap = table
        .get(LABELS_KEY)
        .ok_or_else(|| DiapredError::Persistence("Artifact is missing its label map".to_string()))
        .and_then(|raw| {
            serde_json::from_str(raw)
                .map_err(|e| DiapredError::Persistence(format!("Invalid label map JSON: {e}")))
        })?;
    let scaler: FeatureScaler = table
        .get(SCALER_KEY)
        .ok_or_else(|| DiapredError::Persistence("Artifact is missing its scaler".to_string()))
        .and_then(|raw| {
            serde_json::from_str(raw)
                .map_err(|e| DiapredError::Persistence(format!("Invalid scaler JSON: {e}")))
        })?;

    Ok((schema, label_map, scaler))
}

/// Read one named f32 tensor out of the parsed payload.
fn tensor_f32(tensors: &SafeTensors, name: &str, device: &Device) -> Result<Tensor> {
    let view = tensors.tensor(name).map_err(|e| {
        DiapredError::Persistence(format!("Tensor '{name}' not found in artifact: {e}"))
    })?;
    let shape: Vec<usize> = view.shape().to_vec();
    let floats: Vec<f32> = view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Tensor::from_vec(floats, shape.as_slice(), device)
        .map_err(|e| DiapredError::Persistence(format!("Failed to rebuild tensor '{name}': {e}")))
}
