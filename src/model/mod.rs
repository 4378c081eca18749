//! The recognition network: convolutional features plus a recurrent encoder.
//!
//! [`Crnn`] chains the seven-stage convolutional stack of [`cnn::ConvStack`]
//! with the bidirectional recurrent encoder of [`rnn::SequenceEncoder`]. Its
//! output is the time-major frame lattice consumed by the alignment loss and
//! the decoder. Every layer constructor returns its parameter handles
//! directly as module fields; nothing is looked up by name.

pub mod cnn;
pub mod rnn;

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::core::ModelConfig;

pub use cnn::ConvStack;
pub use rnn::SequenceEncoder;

/// CPU inference backend.
pub type CpuBackend = burn::backend::NdArray<f32>;

/// Autodiff-decorated backend used for training.
pub type TrainBackend = burn::backend::Autodiff<CpuBackend>;

/// Number of frames the network produces for an image of the given width.
///
/// The two width-halving poolings reduce the width by a factor of four; one
/// more frame is subtracted to match how downstream lengths have always been
/// derived from the pooled width. The actual convolutional output is never
/// shorter than this, so the value is safe to pass as a valid window to the
/// loss and the decoder.
pub fn usable_sequence_length(width: usize) -> usize {
    (width / 4).saturating_sub(1)
}

/// The full recognition network.
#[derive(Module, Debug)]
pub struct Crnn<B: Backend> {
    features: ConvStack<B>,
    encoder: SequenceEncoder<B>,
}

impl<B: Backend> Crnn<B> {
    /// Builds the network for a validated configuration.
    pub fn new(config: &ModelConfig, device: &B::Device) -> Self {
        let feature_dim = (config.image_height / 16 - 1) * cnn::FEATURE_CHANNELS;
        Self {
            features: ConvStack::new(config.channels, device),
            encoder: SequenceEncoder::new(feature_dim, config.digits_only, device),
        }
    }

    /// Runs the network over an image batch `[batch, channels, height, width]`.
    ///
    /// Returns the time-major frame lattice `[time, batch, 37]` of
    /// log-probabilities over the symbol alphabet.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        self.encoder.forward(self.features.forward(images))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usable_length_follows_pooled_width() {
        assert_eq!(usable_sequence_length(100), 24);
        assert_eq!(usable_sequence_length(20), 4);
        assert_eq!(usable_sequence_length(8), 1);
        assert_eq!(usable_sequence_length(102), 24);
        assert_eq!(usable_sequence_length(4), 0);
    }

    #[test]
    fn forward_produces_a_time_major_lattice() {
        let config = ModelConfig::new().with_image_width(20).with_max_label_length(4);
        let device = Default::default();
        let model = Crnn::<CpuBackend>::new(&config, &device);
        let images = Tensor::<CpuBackend, 4>::zeros([2, 1, 32, 20], &device);

        let lattice = model.forward(images);
        assert_eq!(lattice.dims(), [4, 2, crate::codec::ALPHABET_SIZE]);
    }
}
