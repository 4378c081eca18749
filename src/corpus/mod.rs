//! Corpus access: manifest loading and cursor-based batch feeding.
//!
//! A corpus directory contains one `annotation_<split>.txt` manifest per
//! split, each line pairing a relative image path with an index into a shared
//! `lexicon.txt`, whose line *i* is the label string for index *i*. The
//! [`BatchSource`] resolves labels eagerly at construction and then serves
//! fixed-size batches of resized images plus encoded labels, wrapping its
//! cursor around at the end of the corpus.

pub mod batcher;
pub mod manifest;

pub use batcher::{Batch, BatchSource, Tensor4D};
pub use manifest::{load_manifest, Sample, Split};
