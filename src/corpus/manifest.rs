//! Manifest and lexicon parsing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{RecError, RecResult};

/// The corpus split a batch source draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Training split (`annotation_train.txt`).
    Train,
    /// Validation split (`annotation_val.txt`).
    Val,
    /// Test split (`annotation_test.txt`).
    Test,
}

impl Split {
    /// The split name as it appears in the annotation file name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }

    /// File name of this split's manifest.
    pub fn annotation_file(&self) -> String {
        format!("annotation_{}.txt", self.as_str())
    }
}

/// One corpus entry: an image path and its resolved label.
///
/// Samples are read from the manifest at batch-source construction and are
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Absolute path of the image file.
    pub path: PathBuf,
    /// The label string resolved through the lexicon.
    pub label: String,
}

/// Loads the manifest of a split and resolves every label eagerly.
///
/// # Errors
///
/// Returns [`RecError::CorpusLoad`] if the manifest or lexicon is missing,
/// if a manifest line is not a `path index` pair, or if an index points
/// outside the lexicon. No partially loaded corpus is ever returned.
pub fn load_manifest(root: &Path, split: Split) -> RecResult<Vec<Sample>> {
    let lexicon_path = root.join("lexicon.txt");
    let lexicon_text = std::fs::read_to_string(&lexicon_path)
        .map_err(|e| RecError::corpus_load(&lexicon_path, e.to_string()))?;
    let lexicon: Vec<&str> = lexicon_text.lines().collect();

    let manifest_path = root.join(split.annotation_file());
    let manifest_text = std::fs::read_to_string(&manifest_path)
        .map_err(|e| RecError::corpus_load(&manifest_path, e.to_string()))?;

    let mut samples = Vec::new();
    for (number, line) in manifest_text.lines().enumerate() {
        let mut fields = line.split_whitespace();
        let (Some(relative), Some(index)) = (fields.next(), fields.next()) else {
            return Err(RecError::corpus_load(
                &manifest_path,
                format!("line {}: expected 'path index', got {line:?}", number + 1),
            ));
        };
        let index: usize = index.parse().map_err(|_| {
            RecError::corpus_load(
                &manifest_path,
                format!("line {}: label index {index:?} is not an integer", number + 1),
            )
        })?;
        let label = lexicon.get(index).ok_or_else(|| {
            RecError::corpus_load(
                &manifest_path,
                format!(
                    "line {}: label index {index} outside lexicon of {} entries",
                    number + 1,
                    lexicon.len()
                ),
            )
        })?;
        samples.push(Sample {
            path: root.join(relative),
            label: (*label).to_string(),
        });
    }

    tracing::debug!(
        split = split.as_str(),
        samples = samples.len(),
        "loaded corpus manifest"
    );
    Ok(samples)
}
