pub mod accuracy;
pub mod output;
pub mod service;

pub use accuracy::{AccuracyTable, AccuracyTableError, DEFAULT_ACCURACY};
pub use service::{Prediction, PredictionError, PredictionService};
