use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Reported for labels the table does not know about.
pub const DEFAULT_ACCURACY: f64 = 95.0;

const BUILTIN_ACCURACY: [(&str, f64); 26] = [
    ("A", 100.00),
    ("B", 100.00),
    ("C", 100.00),
    ("D", 100.00),
    ("E", 100.00),
    ("F", 100.00),
    ("G", 100.00),
    ("H", 100.00),
    ("I", 100.00),
    ("J", 100.00),
    ("K", 95.65),
    ("L", 100.00),
    ("M", 100.00),
    ("N", 100.00),
    ("O", 95.24),
    ("P", 100.00),
    ("Q", 100.00),
    ("R", 100.00),
    ("S", 100.00),
    ("T", 95.65),
    ("U", 95.24),
    ("V", 95.00),
    ("W", 100.00),
    ("X", 96.00),
    ("Y", 100.00),
    ("Z", 100.00),
];

#[derive(Debug, thiserror::Error)]
pub enum AccuracyTableError {
    #[error("Failed to read accuracy table: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse accuracy table: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid label '{0}': expected a single letter")]
    InvalidLabel(String),
    #[error("Accuracy for '{label}' out of range: {value}")]
    OutOfRange { label: String, value: f64 },
}

#[derive(Debug, Serialize, Deserialize)]
struct AccuracyTableFile {
    #[serde(default = "default_accuracy")]
    default_accuracy: f64,
    letters: BTreeMap<String, f64>,
}

fn default_accuracy() -> f64 {
    DEFAULT_ACCURACY
}

/// Historical per-letter accuracy of the deployed model. Built once at
/// startup and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyTable {
    letters: BTreeMap<String, f64>,
    default_accuracy: f64,
}

impl Default for AccuracyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AccuracyTable {
    pub fn builtin() -> Self {
        Self {
            letters: BUILTIN_ACCURACY
                .iter()
                .map(|(label, value)| (label.to_string(), *value))
                .collect(),
            default_accuracy: DEFAULT_ACCURACY,
        }
    }

    pub fn load(path: &Path) -> Result<Self, AccuracyTableError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, AccuracyTableError> {
        let file: AccuracyTableFile = serde_yaml::from_str(contents)?;
        check_range("default", file.default_accuracy)?;

        let mut letters = BTreeMap::new();
        for (label, value) in file.letters {
            let normalized = label.trim().to_uppercase();
            let mut chars = normalized.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_alphabetic() => {}
                _ => return Err(AccuracyTableError::InvalidLabel(label)),
            }
            check_range(&normalized, value)?;
            letters.insert(normalized, value);
        }

        Ok(Self {
            letters,
            default_accuracy: file.default_accuracy,
        })
    }

    /// Accuracy for an already normalized (upper-case) label.
    pub fn lookup(&self, label: &str) -> f64 {
        self.letters
            .get(label)
            .copied()
            .unwrap_or(self.default_accuracy)
    }

    pub fn default_accuracy(&self) -> f64 {
        self.default_accuracy
    }

    pub fn entries(&self) -> &BTreeMap<String, f64> {
        &self.letters
    }

    pub fn len(&self) -> usize {
        self.letters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }
}

fn check_range(label: &str, value: f64) -> Result<(), AccuracyTableError> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(AccuracyTableError::OutOfRange {
            label: label.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_covers_the_alphabet() {
        let table = AccuracyTable::builtin();
        assert_eq!(table.len(), 26);

        let labels: Vec<&str> = table.entries().keys().map(String::as_str).collect();
        let expected: Vec<String> = ('A'..='Z').map(|c| c.to_string()).collect();
        assert_eq!(labels, expected);

        for value in table.entries().values() {
            assert!((95.0..=100.0).contains(value));
        }
        assert_eq!(table.lookup("K"), 95.65);
        assert_eq!(table.lookup("X"), 96.0);
    }

    #[test]
    fn unknown_labels_use_the_default() {
        let table = AccuracyTable::builtin();
        assert_eq!(table.lookup("NOTHING"), DEFAULT_ACCURACY);
        assert_eq!(table.lookup("k"), DEFAULT_ACCURACY);
    }

    #[test]
    fn loads_alternate_table_from_yaml() {
        let table = AccuracyTable::from_yaml_str(
            "default_accuracy: 80.5\nletters:\n  a: 90.0\n  B: 99.5\n",
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("A"), 90.0);
        assert_eq!(table.lookup("B"), 99.5);
        assert_eq!(table.lookup("C"), 80.5);
    }

    #[test]
    fn default_accuracy_is_optional_in_yaml() {
        let table = AccuracyTable::from_yaml_str("letters:\n  Q: 97.0\n").unwrap();
        assert_eq!(table.default_accuracy(), DEFAULT_ACCURACY);
    }

    #[test]
    fn rejects_bad_labels_and_values() {
        assert!(matches!(
            AccuracyTable::from_yaml_str("letters:\n  AB: 90.0\n"),
            Err(AccuracyTableError::InvalidLabel(_))
        ));
        assert!(matches!(
            AccuracyTable::from_yaml_str("letters:\n  A: 120.0\n"),
            Err(AccuracyTableError::OutOfRange { .. })
        ));
        assert!(matches!(
            AccuracyTable::from_yaml_str("letters: [1, 2]\n"),
            Err(AccuracyTableError::Yaml(_))
        ));
    }

    #[test]
    fn shipped_config_matches_builtin_table() {
        let path = format!("{}/../config/accuracy.yaml", env!("CARGO_MANIFEST_DIR"));
        let table = AccuracyTable::load(Path::new(&path)).unwrap();
        assert_eq!(table, AccuracyTable::builtin());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accuracy.yaml");
        std::fs::write(&path, "letters:\n  Z: 99.0\n").unwrap();

        let table = AccuracyTable::load(&path).unwrap();
        assert_eq!(table.lookup("Z"), 99.0);
        assert!(matches!(
            AccuracyTable::load(&dir.path().join("missing.yaml")),
            Err(AccuracyTableError::Io(_))
        ));
    }
}
