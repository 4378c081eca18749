//! Error types for the recognition pipeline.
//!
//! This module defines the errors that can occur while encoding labels,
//! loading the corpus, feeding batches, or running the network, together
//! with helper constructors for the free-form variants.

use std::path::PathBuf;
use thiserror::Error;

/// Enum representing the errors that can occur in the recognition pipeline.
#[derive(Error, Debug)]
pub enum RecError {
    /// A label character falls outside the supported alphabet.
    #[error("unsupported symbol {symbol:?} in label")]
    InvalidSymbol {
        /// The offending character.
        symbol: char,
    },

    /// The corpus manifest or lexicon is missing or malformed.
    #[error("corpus load failed for '{}': {message}", path.display())]
    CorpusLoad {
        /// The file that could not be loaded.
        path: PathBuf,
        /// What went wrong while reading or parsing it.
        message: String,
    },

    /// An image in a requested batch could not be decoded.
    #[error("image decode failed for '{}'", path.display())]
    ImageDecode {
        /// The image that failed to decode.
        path: PathBuf,
        /// The underlying decoder error.
        #[source]
        source: image::ImageError,
    },

    /// A target label cannot be aligned within the available input frames.
    ///
    /// The required frame count is the label length plus one separator frame
    /// per adjacent repeated symbol.
    #[error(
        "label of sample {index} needs {required} frames but only {available} are available"
    )]
    LabelTooLong {
        /// Index of the sample inside the batch.
        index: usize,
        /// Minimum number of frames the label needs.
        required: usize,
        /// Frames actually available for the sample.
        available: usize,
    },

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    Config {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error from host-side tensor reshaping.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

/// Convenient result alias for recognition operations.
pub type RecResult<T> = Result<T, RecError>;

impl RecError {
    /// Creates an `InvalidInput` error from any displayable message.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a `Config` error from any displayable message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a `CorpusLoad` error for the given file.
    pub fn corpus_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CorpusLoad {
            path: path.into(),
            message: message.into(),
        }
    }
}
