use serde_json::{Map, Value};

pub const UNKNOWN_PREDICTION_ERROR: &str = "Unknown prediction error";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OutputError {
    #[error("No output from classifier")]
    NoOutput,
    #[error("No valid JSON response from classifier")]
    NoJsonFound,
    #[error("Invalid JSON response from classifier: {0}")]
    MalformedJson(String),
}

/// What the classifier concluded, once its output has been read.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierVerdict {
    Prediction { label: String, confidence: f64 },
    Error(String),
}

pub fn parse_output(stdout: &str) -> Result<ClassifierVerdict, OutputError> {
    let payload = extract_payload(stdout)?;
    Ok(interpret(&payload))
}

/// Finds the classifier's JSON object in stdout that may also carry free-form
/// diagnostics. Lines are scanned from the end; a line that looks like an
/// object but fails to parse is skipped in favour of earlier ones.
pub fn extract_payload(stdout: &str) -> Result<Map<String, Value>, OutputError> {
    if stdout.trim().is_empty() {
        return Err(OutputError::NoOutput);
    }

    let mut last_error = None;
    for line in stdout.lines().rev() {
        let line = line.trim();
        if !(line.starts_with('{') && line.contains('}')) {
            continue;
        }
        match serde_json::from_str::<Map<String, Value>>(line) {
            Ok(payload) => return Ok(payload),
            Err(e) => {
                log::debug!("Skipping unparseable candidate line {:?}: {}", line, e);
                last_error.get_or_insert(e.to_string());
            }
        }
    }

    match last_error {
        Some(e) => Err(OutputError::MalformedJson(e)),
        None => Err(OutputError::NoJsonFound),
    }
}

pub fn interpret(payload: &Map<String, Value>) -> ClassifierVerdict {
    if let Some(error) = payload.get("error").filter(|v| !v.is_null()) {
        return ClassifierVerdict::Error(value_to_message(error));
    }

    let label = payload
        .get("prediction")
        .and_then(|v| match v {
            Value::String(s) => Some(s.trim().to_uppercase()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|label| !label.is_empty());

    match label {
        Some(label) => ClassifierVerdict::Prediction {
            label,
            confidence: round2(payload.get("confidence").map_or(0.0, coerce_float)),
        },
        None => ClassifierVerdict::Error(UNKNOWN_PREDICTION_ERROR.to_string()),
    }
}

fn value_to_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_float(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => leading_float(s),
        Value::Bool(true) => 1.0,
        _ => 0.0,
    };
    if parsed.is_finite() { parsed } else { 0.0 }
}

// "92.5%" reads as 92.5, anything without a numeric prefix as 0.
fn leading_float(s: &str) -> f64 {
    let s = s.trim_start();
    let numeric_len = s
        .char_indices()
        .take_while(|(i, c)| {
            c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))
        })
        .count();
    (1..=numeric_len)
        .rev()
        .find_map(|end| s[..end].parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
