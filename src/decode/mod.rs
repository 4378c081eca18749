//! Decoding of the frame lattice into symbol sequences.

pub mod beam;

pub use beam::{greedy_collapse, BeamDecoder, Decoded};
