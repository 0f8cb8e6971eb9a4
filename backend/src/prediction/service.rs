use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::imaging::{DecodeError, ImageDecoder};
use crate::pyprocess::{
    ClassifierInvocation, ClassifierInvoker, InterpreterResolver, InvokerError,
};
use crate::storage::{ScratchService, StorageError};

use super::accuracy::AccuracyTable;
use super::output::{self, ClassifierVerdict, OutputError};

pub const IMAGE_REQUIRED: &str = "The image field is required.";

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
    pub accuracy: f64,
}

/// Process details kept for the logs when the classifier output is unusable.
#[derive(Debug, Clone, Default)]
pub struct ProcessDiagnostics {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<&ClassifierInvocation> for ProcessDiagnostics {
    fn from(invocation: &ClassifierInvocation) -> Self {
        Self {
            exit_code: invocation.exit_code,
            stdout: invocation.stdout.clone(),
            stderr: invocation.stderr.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("Request validation failed: {0}")]
    Validation(String),
    #[error("Image decoding failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("Scratch storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("Classifier invocation failed: {0}")]
    Invoker(#[from] InvokerError),
    #[error("Classifier timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),
    #[error("Unusable classifier output: {source}")]
    Output {
        source: OutputError,
        diagnostics: ProcessDiagnostics,
    },
    #[error("Classifier reported an error: {0}")]
    ClassifierReported(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PredictionError {
    /// Message safe to hand back to the caller.
    pub fn client_message(&self) -> String {
        match self {
            PredictionError::Validation(message) => message.clone(),
            PredictionError::Decode(_) => "Invalid or corrupted image data".to_string(),
            PredictionError::Storage(_) => "Failed to save image to storage".to_string(),
            PredictionError::Invoker(e @ InvokerError::MissingDependency { .. }) => e.to_string(),
            PredictionError::Invoker(_) => "Failed to execute classifier".to_string(),
            PredictionError::Timeout(limit) => {
                format!("Classifier timed out after {} seconds", limit.as_secs())
            }
            PredictionError::Output { source, .. } => match source {
                OutputError::NoOutput => "No output from classifier".to_string(),
                OutputError::NoJsonFound => "No valid JSON response from classifier".to_string(),
                OutputError::MalformedJson(_) => {
                    "Invalid JSON response from classifier".to_string()
                }
            },
            PredictionError::ClassifierReported(message) => message.clone(),
            PredictionError::Internal(_) => "Prediction failed: internal error".to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, PredictionError::Validation(_))
    }

    /// Failures of the server itself rather than of the image or classifier.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            PredictionError::Internal(_) | PredictionError::Invoker(InvokerError::Wait(_))
        )
    }

    pub fn log(&self) {
        match self {
            PredictionError::Validation(_) | PredictionError::ClassifierReported(_) => {
                log::warn!("⚠️ {}", self)
            }
            PredictionError::Output { diagnostics, .. } => log::error!(
                "❌ {} (exit code {:?}, raw output {:?}, stderr {:?})",
                self,
                diagnostics.exit_code,
                diagnostics.stdout,
                diagnostics.stderr
            ),
            _ => log::error!("❌ {}", self),
        }
    }
}

/// Runs one frame through decode, scratch storage, the classifier and
/// output interpretation. Each call owns its own scratch file and child
/// process, so the service can be shared freely between workers.
#[derive(Clone, Debug)]
pub struct PredictionService {
    decoder: ImageDecoder,
    scratch: ScratchService,
    invoker: ClassifierInvoker,
    accuracy: Arc<AccuracyTable>,
}

impl PredictionService {
    pub fn new(
        decoder: ImageDecoder,
        scratch: ScratchService,
        invoker: ClassifierInvoker,
        accuracy: Arc<AccuracyTable>,
    ) -> Self {
        Self {
            decoder,
            scratch,
            invoker,
            accuracy,
        }
    }

    pub fn from_config(config: &AppConfig, accuracy: Arc<AccuracyTable>) -> Self {
        let classifier = &config.classifier;
        Self::new(
            ImageDecoder::new(config.min_image_bytes),
            ScratchService::new(&config.scratch_dir),
            ClassifierInvoker::new(
                &classifier.script_path,
                &classifier.model_path,
                classifier.timeout,
                InterpreterResolver::new(
                    classifier.interpreter_candidates.clone(),
                    classifier.fallback_interpreter.clone(),
                ),
            ),
            accuracy,
        )
    }

    pub fn accuracy_table(&self) -> &AccuracyTable {
        &self.accuracy
    }

    pub async fn predict(&self, encoded_image: &str) -> Result<Prediction, PredictionError> {
        if encoded_image.trim().is_empty() {
            return Err(PredictionError::Validation(IMAGE_REQUIRED.to_string()));
        }

        let image = self.decoder.decode(encoded_image)?;
        let scratch = self.scratch.store(image.bytes()).await?;
        drop(image);

        let invocation = self.invoker.invoke(scratch.path()).await;
        self.scratch.release(scratch).await;

        self.interpret(invocation?)
    }

    fn interpret(&self, invocation: ClassifierInvocation) -> Result<Prediction, PredictionError> {
        if invocation.timed_out {
            return Err(PredictionError::Timeout(self.invoker.timeout()));
        }

        match output::parse_output(&invocation.stdout) {
            Ok(ClassifierVerdict::Prediction { label, confidence }) => {
                let accuracy = self.accuracy.lookup(&label);
                log::info!(
                    "✅ Prediction {} (confidence {}, accuracy {})",
                    label,
                    confidence,
                    accuracy
                );
                Ok(Prediction {
                    label,
                    confidence,
                    accuracy,
                })
            }
            Ok(ClassifierVerdict::Error(message)) => {
                Err(PredictionError::ClassifierReported(message))
            }
            Err(source) => Err(PredictionError::Output {
                source,
                diagnostics: ProcessDiagnostics::from(&invocation),
            }),
        }
    }
}
