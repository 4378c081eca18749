//! Alignment loss over the frame lattice.

pub mod ctc;

pub use ctc::{validate_alignment, CtcLoss};
