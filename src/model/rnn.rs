//! Bidirectional recurrent sequence encoder.
//!
//! Two stacked bidirectional LSTM layers read the convolutional feature
//! sequence in both directions; their concatenated output passes through a
//! dropout layer (active only under the autodiff backend, i.e. during
//! training) and a linear projection onto the 37-symbol alphabet. The
//! result is reordered to the time-major layout expected by the alignment
//! loss and the decoder.

use burn::module::Module;
use burn::nn::{
    BiLstm, BiLstmConfig, Dropout, DropoutConfig, Initializer, Linear, LinearConfig, Lstm,
};
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::codec::ALPHABET_SIZE;

/// Hidden units per direction in each recurrent layer.
pub const HIDDEN_SIZE: usize = 256;

/// Drop probability of the encoder output, i.e. a keep probability of 0.7.
pub const DROPOUT_PROB: f64 = 0.3;

/// Penalty subtracted from non-digit, non-blank logits in digits-only mode.
pub const DIGIT_PENALTY: f32 = 100.0;

/// The recurrent encoder producing the frame lattice.
#[derive(Module, Debug)]
pub struct SequenceEncoder<B: Backend> {
    lstm1: BiLstm<B>,
    lstm2: BiLstm<B>,
    dropout: Dropout,
    projection: Linear<B>,
    digits_only: bool,
}

impl<B: Backend> SequenceEncoder<B> {
    /// Builds the encoder for feature vectors of the given dimension.
    pub fn new(feature_dim: usize, digits_only: bool, device: &B::Device) -> Self {
        Self {
            lstm1: unit_forget_bias(BiLstmConfig::new(feature_dim, HIDDEN_SIZE, true).init(device)),
            lstm2: unit_forget_bias(
                BiLstmConfig::new(2 * HIDDEN_SIZE, HIDDEN_SIZE, true).init(device),
            ),
            dropout: DropoutConfig::new(DROPOUT_PROB).init(),
            projection: zero_bias(
                LinearConfig::new(2 * HIDDEN_SIZE, ALPHABET_SIZE)
                    .with_initializer(Initializer::Normal {
                        mean: 0.0,
                        std: 0.02,
                    })
                    .init(device),
            ),
            digits_only,
        }
    }

    /// Encodes a feature sequence `[batch, time, features]` into the
    /// time-major lattice `[time, batch, 37]` of log-probabilities.
    pub fn forward(&self, features: Tensor<B, 3>) -> Tensor<B, 3> {
        let (x, _) = self.lstm1.forward(features, None);
        let (x, _) = self.lstm2.forward(x, None);
        let x = self.dropout.forward(x);
        let mut logits = self.projection.forward(x);
        if self.digits_only {
            let device = logits.device();
            logits = logits - penalty_tensor(&device);
        }
        log_softmax(logits, 2).swap_dims(0, 1)
    }
}

/// The additive mask of digits-only mode.
///
/// Digits and the blank keep their logits; every letter is pushed down by
/// [`DIGIT_PENALTY`], which removes letters from the decodable alphabet
/// unless their evidence outweighs the penalty.
pub fn digit_penalty_mask() -> [f32; ALPHABET_SIZE] {
    let mut mask = [DIGIT_PENALTY; ALPHABET_SIZE];
    for entry in mask.iter_mut().take(10) {
        *entry = 0.0;
    }
    mask[ALPHABET_SIZE - 1] = 0.0;
    mask
}

fn penalty_tensor<B: Backend>(device: &B::Device) -> Tensor<B, 3> {
    Tensor::<B, 1>::from_floats(digit_penalty_mask(), device).reshape([1, 1, ALPHABET_SIZE])
}

/// Forces the forget-gate bias of both directions to 1.0.
fn unit_forget_bias<B: Backend>(mut lstm: BiLstm<B>) -> BiLstm<B> {
    lstm.forward = unit_forget_cell(lstm.forward);
    lstm.reverse = unit_forget_cell(lstm.reverse);
    lstm
}

fn unit_forget_cell<B: Backend>(mut cell: Lstm<B>) -> Lstm<B> {
    cell.forget_gate.input_transform.bias = cell
        .forget_gate
        .input_transform
        .bias
        .map(|bias| bias.map(|tensor| tensor.ones_like()));
    cell.forget_gate.hidden_transform.bias = cell
        .forget_gate
        .hidden_transform
        .bias
        .map(|bias| bias.map(|tensor| tensor.zeros_like()));
    cell
}

fn zero_bias<B: Backend>(mut linear: Linear<B>) -> Linear<B> {
    linear.bias = linear.bias.map(|bias| bias.map(|tensor| tensor.zeros_like()));
    linear
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CpuBackend;

    fn argmax(row: &[f32]) -> usize {
        row.iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn lattice_rows_are_log_distributions() {
        let device = Default::default();
        let encoder = SequenceEncoder::<CpuBackend>::new(512, false, &device);
        let features = Tensor::<CpuBackend, 3>::zeros([2, 5, 512], &device);

        let lattice = encoder.forward(features);
        assert_eq!(lattice.dims(), [5, 2, ALPHABET_SIZE]);

        let values = lattice.into_data().to_vec::<f32>().unwrap();
        for row in values.chunks(ALPHABET_SIZE) {
            let total: f32 = row.iter().map(|lp| lp.exp()).sum();
            assert!((total - 1.0).abs() < 1e-4, "softmax row sums to {total}");
        }
    }

    #[test]
    fn penalty_mask_spares_digits_and_blank() {
        let mask = digit_penalty_mask();
        assert!(mask[..10].iter().all(|&m| m == 0.0));
        assert!(mask[10..36].iter().all(|&m| m == DIGIT_PENALTY));
        assert_eq!(mask[36], 0.0);
    }

    #[test]
    fn penalty_shifts_argmax_toward_near_digits() {
        // A letter wins by less than the penalty, so masking flips the argmax
        // to the strongest digit.
        let mut logits = [0.0f32; ALPHABET_SIZE];
        logits[20] = 60.0; // letter 'k'
        logits[7] = 10.0; // digit '7'
        assert_eq!(argmax(&logits), 20);

        let mask = digit_penalty_mask();
        let masked: Vec<f32> = logits.iter().zip(mask.iter()).map(|(l, m)| l - m).collect();
        assert_eq!(argmax(&masked), 7);

        // A letter that clears the penalty margin keeps winning.
        let mut logits = [0.0f32; ALPHABET_SIZE];
        logits[20] = 120.0;
        logits[7] = 10.0;
        let masked: Vec<f32> = logits.iter().zip(mask.iter()).map(|(l, m)| l - m).collect();
        assert_eq!(argmax(&masked), 20);
    }
}
