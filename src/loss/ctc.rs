//! Connectionist temporal classification loss.
//!
//! The loss is the negative log-likelihood of a target sequence marginalized
//! over every frame-to-symbol alignment that collapses to it, computed with
//! the standard forward algorithm in log space over the blank-interleaved
//! target lattice. All recursion steps are tensor operations, so gradients
//! flow to the frame log-probabilities under an autodiff backend.

use burn::tensor::backend::Backend;
use burn::tensor::{Bool, Int, Tensor};

use crate::core::{RecError, RecResult};

/// The CTC alignment loss.
#[derive(Debug, Clone)]
pub struct CtcLoss {
    blank: usize,
}

impl CtcLoss {
    /// Creates the loss with the given blank code.
    pub fn new(blank: usize) -> Self {
        Self { blank }
    }

    /// Batch-mean loss; see [`CtcLoss::forward`].
    pub fn mean<B: Backend>(
        &self,
        log_probs: Tensor<B, 3>,
        targets: Tensor<B, 2, Int>,
        input_lengths: Tensor<B, 1, Int>,
        target_lengths: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        self.forward(log_probs, targets, input_lengths, target_lengths)
            .mean()
    }

    /// Per-sample negative log-likelihoods.
    ///
    /// # Shapes
    ///
    /// - `log_probs`: `[time, batch, classes]`, log-softmax over classes.
    /// - `targets`: `[batch, max_target_len]`, symbol codes without blanks,
    ///   zero-padded past each sample's length.
    /// - `input_lengths`, `target_lengths`: `[batch]`.
    ///
    /// A sample whose label cannot fit its input window yields a non-finite
    /// loss; call [`validate_alignment`] first to reject such input with a
    /// proper error.
    pub fn forward<B: Backend>(
        &self,
        log_probs: Tensor<B, 3>,
        targets: Tensor<B, 2, Int>,
        input_lengths: Tensor<B, 1, Int>,
        target_lengths: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        let device = log_probs.device();
        let [max_time, batch, classes] = log_probs.dims();
        let max_target = targets.dims()[1];
        let lattice_len = 2 * max_target + 1;

        // Interleave blanks around every label: [b, l1, b, l2, ..., ln, b].
        let blanks = Tensor::<B, 2, Int>::full([batch, max_target], self.blank as i64, &device);
        let interleaved =
            Tensor::stack::<3>(vec![blanks, targets], 2).reshape([batch, 2 * max_target]);
        let final_blank = Tensor::<B, 2, Int>::full([batch, 1], self.blank as i64, &device);
        let lattice = Tensor::cat(vec![interleaved, final_blank], 1);

        // A skip transition from s-2 is allowed where the symbol is not a
        // blank and differs from the symbol two slots back.
        let not_blank = lattice.clone().not_equal_elem(self.blank as i64);
        let differs = lattice
            .clone()
            .not_equal(shift_codes(lattice.clone(), 2, self.blank as i64));
        let skip_allowed = both(not_blank, differs);

        // Forward variable at t = 0: only the first blank and first label.
        let lp0 = log_probs
            .clone()
            .slice([0..1, 0..batch, 0..classes])
            .reshape([batch, classes]);
        let init_cols = 2.min(lattice_len);
        let init = lp0.gather(1, lattice.clone().slice([0..batch, 0..init_cols]));
        let mut log_alpha =
            Tensor::<B, 2>::full([batch, lattice_len], f32::NEG_INFINITY, &device);
        log_alpha = log_alpha.slice_assign([0..batch, 0..init_cols], init);

        // Lattice positions past 2 * target_len + 1 never participate.
        let positions = Tensor::<B, 1, Int>::arange(0..lattice_len as i64, &device)
            .reshape([1, lattice_len])
            .expand([batch, lattice_len]);
        let limits = target_lengths
            .clone()
            .mul_scalar(2)
            .add_scalar(1)
            .reshape([batch, 1])
            .expand([batch, lattice_len]);
        let s_valid = positions.lower(limits);

        for t in 1..max_time {
            let stay = log_alpha.clone();
            let advance = shift_alpha(log_alpha.clone(), 1);
            let skip = shift_alpha(log_alpha.clone(), 2);

            let no_skip = log_add(stay, advance);
            let with_skip = log_add(no_skip.clone(), skip);
            let recursed = no_skip.mask_where(skip_allowed.clone(), with_skip);

            let lp_t = log_probs
                .clone()
                .slice([t..t + 1, 0..batch, 0..classes])
                .reshape([batch, classes]);
            let candidate = recursed + lp_t.gather(1, lattice.clone());

            // Samples whose input ended keep their forward variables frozen.
            let t_valid = input_lengths
                .clone()
                .greater_elem(t as i64)
                .reshape([batch, 1])
                .expand([batch, lattice_len]);
            let active = both(t_valid, s_valid.clone());
            log_alpha = log_alpha.mask_where(active, candidate);
        }

        // The likelihood ends on the final blank or the final label.
        let last_blank = target_lengths.clone().mul_scalar(2).reshape([batch, 1]);
        let last_label = last_blank.clone().sub_scalar(1).clamp_min(0);
        let via_blank = log_alpha.clone().gather(1, last_blank).reshape([batch]);
        let via_label = log_alpha.gather(1, last_label).reshape([batch]);

        // An empty target only has the all-blank path.
        let empty = target_lengths.equal_elem(0);
        let via_label = via_label.mask_fill(empty, f32::NEG_INFINITY);

        log_add(via_blank, via_label).neg()
    }
}

/// Rejects samples whose label cannot be aligned inside its input window.
///
/// A label needs one frame per symbol plus one separating blank frame per
/// adjacent repeated pair; anything longer makes the loss undefined.
pub fn validate_alignment(targets: &[Vec<u32>], input_lengths: &[usize]) -> RecResult<()> {
    for (index, (codes, &available)) in targets.iter().zip(input_lengths).enumerate() {
        let repeats = codes.windows(2).filter(|pair| pair[0] == pair[1]).count();
        let required = codes.len() + repeats;
        if required > available {
            return Err(RecError::LabelTooLong {
                index,
                required,
                available,
            });
        }
    }
    Ok(())
}

/// Elementwise log(exp(a) + exp(b)) in log space.
///
/// Infinite operands are replaced by zero before any arithmetic so no NaN is
/// ever produced, then the special cases are selected back in: one-sided -inf
/// yields the finite side, double -inf stays -inf. Keeping the arithmetic
/// NaN-free matters for gradients, which would otherwise pick up NaN factors
/// from the masked-out branch.
fn log_add<B: Backend, const D: usize>(a: Tensor<B, D>, b: Tensor<B, D>) -> Tensor<B, D> {
    let a_infinite = a.clone().equal_elem(f32::NEG_INFINITY);
    let b_infinite = b.clone().equal_elem(f32::NEG_INFINITY);
    let one_sided = a.clone().mask_where(a_infinite.clone(), b.clone());

    let a_safe = a.mask_fill(a_infinite.clone(), 0.0);
    let b_safe = b.mask_fill(b_infinite.clone(), 0.0);
    let larger = a_safe.clone().max_pair(b_safe.clone());
    let summed = larger + (a_safe - b_safe).abs().neg().exp().add_scalar(1.0).log();

    let any_infinite = either(a_infinite, b_infinite);
    summed.mask_where(any_infinite, one_sided)
}

/// Shifts forward variables right by `by` slots, filling with -inf.
fn shift_alpha<B: Backend>(alpha: Tensor<B, 2>, by: usize) -> Tensor<B, 2> {
    let [batch, len] = alpha.dims();
    let device = alpha.device();
    if by >= len {
        return Tensor::full([batch, len], f32::NEG_INFINITY, &device);
    }
    let pad = Tensor::<B, 2>::full([batch, by], f32::NEG_INFINITY, &device);
    Tensor::cat(vec![pad, alpha.slice([0..batch, 0..len - by])], 1)
}

/// Shifts symbol codes right by `by` slots, filling with `fill`.
fn shift_codes<B: Backend>(codes: Tensor<B, 2, Int>, by: usize, fill: i64) -> Tensor<B, 2, Int> {
    let [batch, len] = codes.dims();
    let device = codes.device();
    if by >= len {
        return Tensor::full([batch, len], fill, &device);
    }
    let pad = Tensor::<B, 2, Int>::full([batch, by], fill, &device);
    Tensor::cat(vec![pad, codes.slice([0..batch, 0..len - by])], 1)
}

/// Elementwise conjunction of two boolean masks.
fn both<B: Backend, const D: usize>(
    a: Tensor<B, D, Bool>,
    b: Tensor<B, D, Bool>,
) -> Tensor<B, D, Bool> {
    (a.int() + b.int()).equal_elem(2)
}

/// Elementwise disjunction of two boolean masks.
fn either<B: Backend, const D: usize>(
    a: Tensor<B, D, Bool>,
    b: Tensor<B, D, Bool>,
) -> Tensor<B, D, Bool> {
    (a.int() + b.int()).greater_elem(0)
}
