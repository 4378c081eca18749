//! Prefix beam search over the symbol-probability lattice.
//!
//! The decoder walks a `[time, classes]` window of log-probabilities per
//! sample, keeping the most probable label prefixes. Paths that collapse to
//! the same prefix are merged by summing their probabilities, split into a
//! blank-terminated and a label-terminated share so repeated symbols stay
//! distinguishable from collapsed runs. The gap between the two best
//! hypotheses doubles as a confidence signal; no threshold is applied here.

use std::collections::HashMap;

use ndarray::{Array3, ArrayView2, Axis};

use crate::codec::BLANK_CODE;
use crate::core::{RecError, RecResult};

/// Default number of hypotheses retained at every time step.
pub const BEAM_WIDTH: usize = 100;

/// One decoded sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Collapsed symbol codes of the best hypothesis, blanks removed.
    pub codes: Vec<u32>,
    /// Log-probability of the best hypothesis.
    pub score: f32,
    /// Log-probability margin between the two best hypotheses.
    ///
    /// Always non-negative; infinite when the search produced a single
    /// hypothesis. Larger means more confident; thresholding is left to the
    /// caller.
    pub confidence: f32,
}

/// Beam-search decoder over frame lattices.
#[derive(Debug, Clone)]
pub struct BeamDecoder {
    beam_width: usize,
    blank: u32,
}

impl Default for BeamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BeamDecoder {
    /// Creates a decoder with the default beam width.
    pub fn new() -> Self {
        Self {
            beam_width: BEAM_WIDTH,
            blank: BLANK_CODE,
        }
    }

    /// Overrides the beam width.
    pub fn with_beam_width(mut self, beam_width: usize) -> Self {
        self.beam_width = beam_width.max(1);
        self
    }

    /// Decodes every sample of a time-major lattice `[time, batch, classes]`.
    ///
    /// `input_lengths` gives the valid window per sample; frames past the
    /// window are ignored.
    pub fn decode_batch(
        &self,
        lattice: &Array3<f32>,
        input_lengths: &[usize],
    ) -> RecResult<Vec<Decoded>> {
        let (time, batch, _) = lattice.dim();
        if input_lengths.len() != batch {
            return Err(RecError::invalid_input(format!(
                "{} input lengths for a batch of {batch}",
                input_lengths.len()
            )));
        }
        Ok(input_lengths
            .iter()
            .enumerate()
            .map(|(sample, &length)| {
                let window = lattice.slice(ndarray::s![..length.min(time), sample, ..]);
                self.decode(window)
            })
            .collect())
    }

    /// Decodes a single `[time, classes]` window of log-probabilities.
    pub fn decode(&self, window: ArrayView2<f32>) -> Decoded {
        // Probabilities per prefix, split into (ends in blank, ends in label).
        let mut beam: Vec<(Vec<u32>, (f32, f32))> =
            vec![(Vec::new(), (0.0, f32::NEG_INFINITY))];

        for frame in window.outer_iter() {
            let mut next: HashMap<Vec<u32>, (f32, f32)> =
                HashMap::with_capacity(beam.len() * frame.len());

            for (prefix, (p_blank, p_label)) in &beam {
                let total = log_add(*p_blank, *p_label);

                for (code, &lp) in frame.iter().enumerate() {
                    let code = code as u32;
                    if code == self.blank {
                        // The prefix survives unchanged through a blank.
                        let slot = entry(&mut next, prefix);
                        slot.0 = log_add(slot.0, total + lp);
                    } else if Some(code) == prefix.last().copied() {
                        // A repeat collapses onto the existing run unless a
                        // blank separated it from the run's last frame.
                        let slot = entry(&mut next, prefix);
                        slot.1 = log_add(slot.1, p_label + lp);

                        let extended = extend(prefix, code);
                        let slot = entry(&mut next, &extended);
                        slot.1 = log_add(slot.1, p_blank + lp);
                    } else {
                        let extended = extend(prefix, code);
                        let slot = entry(&mut next, &extended);
                        slot.1 = log_add(slot.1, total + lp);
                    }
                }
            }

            let mut merged: Vec<(Vec<u32>, (f32, f32))> = next.into_iter().collect();
            merged.sort_by(|a, b| score(b.1).total_cmp(&score(a.1)));
            merged.truncate(self.beam_width);
            beam = merged;
        }

        let best_score = score(beam[0].1);
        let confidence = match beam.get(1) {
            Some(runner_up) => best_score - score(runner_up.1),
            None => f32::INFINITY,
        };
        Decoded {
            codes: beam[0].0.clone(),
            score: best_score,
            confidence,
        }
    }
}

/// Greedy arg-max collapse of a `[time, classes]` window.
///
/// Picks the strongest symbol per frame, merges adjacent repeats, and drops
/// blanks. Used for the diagnostic raw prediction path and as the reference
/// behavior for near-one-hot lattices.
pub fn greedy_collapse(window: ArrayView2<f32>, blank: u32) -> Vec<u32> {
    let mut out = Vec::new();
    let mut previous = blank;
    for frame in window.outer_iter() {
        let code = argmax(frame);
        if code != previous && code != blank {
            out.push(code);
        }
        previous = code;
    }
    out
}

/// Arg-max over one frame of the lattice.
pub fn argmax(frame: ndarray::ArrayView1<f32>) -> u32 {
    frame
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(code, _)| code as u32)
        .unwrap_or(0)
}

/// Raw per-frame arg-max codes of one sample, over the full lattice depth.
pub fn raw_codes(lattice: &Array3<f32>, sample: usize) -> Vec<u32> {
    lattice
        .index_axis(Axis(1), sample)
        .outer_iter()
        .map(argmax)
        .collect()
}

fn entry<'a>(
    next: &'a mut HashMap<Vec<u32>, (f32, f32)>,
    prefix: &[u32],
) -> &'a mut (f32, f32) {
    next.entry(prefix.to_vec())
        .or_insert((f32::NEG_INFINITY, f32::NEG_INFINITY))
}

fn extend(prefix: &[u32], code: u32) -> Vec<u32> {
    let mut extended = Vec::with_capacity(prefix.len() + 1);
    extended.extend_from_slice(prefix);
    extended.push(code);
    extended
}

fn score((p_blank, p_label): (f32, f32)) -> f32 {
    log_add(p_blank, p_label)
}

fn log_add(a: f32, b: f32) -> f32 {
    if a == f32::NEG_INFINITY {
        return b;
    }
    if b == f32::NEG_INFINITY {
        return a;
    }
    let larger = a.max(b);
    larger + (-(a - b).abs()).exp().ln_1p()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    const CLASSES: usize = 4;
    const BLANK: u32 = 3;

    /// Builds a near-one-hot log-probability window from a code sequence.
    fn one_hot(codes: &[u32]) -> Array2<f32> {
        let mut window = Array2::from_elem((codes.len(), CLASSES), f32::NEG_INFINITY);
        for (t, &code) in codes.iter().enumerate() {
            window[[t, code as usize]] = 0.0;
        }
        window
    }

    fn decoder() -> BeamDecoder {
        BeamDecoder {
            beam_width: 10,
            blank: BLANK,
        }
    }

    #[test]
    fn collapses_blanks_and_repeats() {
        // Path 0, 0, blank, 1, 1, 2 collapses to [0, 1, 2].
        let window = one_hot(&[0, 0, BLANK, 1, 1, 2]);
        let decoded = decoder().decode(window.view());
        assert_eq!(decoded.codes, vec![0, 1, 2]);
        assert_eq!(decoded.score, 0.0);
        assert_eq!(greedy_collapse(window.view(), BLANK), vec![0, 1, 2]);
    }

    #[test]
    fn blank_separates_repeated_symbols() {
        let window = one_hot(&[0, BLANK, 0]);
        let decoded = decoder().decode(window.view());
        assert_eq!(decoded.codes, vec![0, 0]);
        assert_eq!(greedy_collapse(window.view(), BLANK), vec![0, 0]);
    }

    #[test]
    fn beam_outscores_greedy_by_summing_paths() {
        // Frame 1: blank 0.8, label 0.2; frame 2: blank 0.6, label 0.4.
        // Greedy reads blanks everywhere, but the paths that emit the label
        // carry more total mass: 0.8*0.4 + 0.2*0.6 + 0.2*0.4 = 0.52 > 0.48.
        let mut window = Array2::from_elem((2, 2), f32::NEG_INFINITY);
        window[[0, 1]] = 0.8f32.ln();
        window[[0, 0]] = 0.2f32.ln();
        window[[1, 1]] = 0.6f32.ln();
        window[[1, 0]] = 0.4f32.ln();

        let decoder = BeamDecoder {
            beam_width: 10,
            blank: 1,
        };
        let decoded = decoder.decode(window.view());
        assert_eq!(decoded.codes, vec![0]);
        assert!((decoded.score - 0.52f32.ln()).abs() < 1e-5);
        assert!((decoded.confidence - (0.52f32.ln() - 0.48f32.ln())).abs() < 1e-5);

        assert!(greedy_collapse(window.view(), 1).is_empty());

        // A beam of one degenerates to the greedy path.
        let narrow = BeamDecoder {
            beam_width: 1,
            blank: 1,
        };
        assert!(narrow.decode(window.view()).codes.is_empty());
    }

    #[test]
    fn confidence_margin_is_non_negative() {
        let mut window = Array2::zeros((3, CLASSES));
        for (t, row) in [[0.1f32, 0.5, 0.2, 0.2], [0.3, 0.3, 0.2, 0.2], [0.25, 0.25, 0.25, 0.25]]
            .iter()
            .enumerate()
        {
            for (c, p) in row.iter().enumerate() {
                window[[t, c]] = p.ln();
            }
        }
        let decoded = decoder().decode(window.view());
        assert!(decoded.confidence >= 0.0);
    }

    #[test]
    fn respects_per_sample_windows() {
        // Sample 0 is three frames long, sample 1 only one.
        let mut lattice = Array3::from_elem((3, 2, CLASSES), f32::NEG_INFINITY);
        for (t, code) in [0usize, 1, 2].iter().enumerate() {
            lattice[[t, 0, *code]] = 0.0;
        }
        lattice[[0, 1, 2]] = 0.0;
        lattice[[1, 1, 0]] = 0.0;
        lattice[[2, 1, 0]] = 0.0;

        let decoded = decoder().decode_batch(&lattice, &[3, 1]).unwrap();
        assert_eq!(decoded[0].codes, vec![0, 1, 2]);
        assert_eq!(decoded[1].codes, vec![2]);

        assert!(decoder().decode_batch(&lattice, &[3]).is_err());
    }

    #[test]
    fn empty_window_yields_the_empty_word() {
        let lattice = Array3::from_elem((0, 1, CLASSES), 0.0);
        let decoded = decoder().decode_batch(&lattice, &[0]).unwrap();
        assert!(decoded[0].codes.is_empty());
        assert_eq!(decoded[0].confidence, f32::INFINITY);
    }

    #[test]
    fn raw_codes_read_the_full_depth() {
        let window = one_hot(&[0, BLANK, 1]);
        let lattice = window.insert_axis(Axis(1));
        assert_eq!(raw_codes(&lattice, 0), vec![0, BLANK, 1]);
    }
}
