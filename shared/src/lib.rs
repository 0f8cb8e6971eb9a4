use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PredictRequest {
    #[serde(default)]
    pub image: Option<String>,
}

/// Body of every `/predict` reply. Successful replies carry the prediction
/// fields, failed ones only `message`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prediction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

impl PredictResponse {
    pub fn success(prediction: String, confidence: f64, accuracy: f64) -> Self {
        Self {
            success: true,
            prediction: Some(prediction),
            confidence: Some(confidence),
            accuracy: Some(accuracy),
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            prediction: None,
            confidence: None,
            accuracy: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AccuracyDataResponse {
    pub success: bool,
    pub data: BTreeMap<String, f64>,
}
