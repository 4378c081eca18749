//! # wordrec
//!
//! A trainable text recognizer for word images. A convolutional stack turns an
//! image into a horizontal sequence of feature vectors, a bidirectional
//! recurrent encoder maps that sequence to per-frame symbol distributions, and
//! a connectionist temporal alignment loss lets the model learn without
//! per-character segmentation. Inference reconstructs strings from the frame
//! lattice with a prefix beam search and reports a log-probability confidence
//! margin.
//!
//! ## Modules
//!
//! * [`codec`] - Character/code bijection and sparse batch label encoding
//! * [`core`] - Error handling and model configuration
//! * [`corpus`] - Manifest-driven batch source with deterministic resizing
//! * [`model`] - Convolutional feature extractor and recurrent sequence encoder
//! * [`loss`] - CTC alignment loss over the frame lattice
//! * [`decode`] - Beam-search decoding and confidence scoring
//! * [`session`] - Mode-dispatched training, evaluation, and prediction
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use wordrec::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ModelConfig::default();
//! let mut source = BatchSource::new(&config, "data/corpus", Split::Train)?;
//! let mut session = Session::new(config)?;
//!
//! for _ in 0..100 {
//!     let batch = source.next_batch(32)?;
//!     let out = session.train_step(&batch)?;
//!     println!("step {} loss {:.4}", out.step, out.loss);
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod core;
pub mod corpus;
pub mod decode;
pub mod loss;
pub mod model;
pub mod session;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::codec::{encode_batch, SparseLabels, ALPHABET_SIZE, BLANK_CODE};
    pub use crate::core::{ModelConfig, OptimizerKind, RecError, RecResult};
    pub use crate::corpus::{Batch, BatchSource, Split};
    pub use crate::decode::BeamDecoder;
    pub use crate::model::{usable_sequence_length, CpuBackend, Crnn, TrainBackend};
    pub use crate::session::{EvalOutput, PredictOutput, Session, TrainOutput, WordPrediction};
}
