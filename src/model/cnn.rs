//! Seven-stage convolutional feature extractor.
//!
//! The stack follows the published recognition topology: 3x3 convolutions
//! growing from 64 to 512 channels, 2x2 poolings after stages 1 and 2,
//! width-preserving 2x2 poolings with (2, 1) strides after stages 4 and 6,
//! batch normalization on stages 3, 5, and 7, and a final 2x2 valid
//! convolution. The width axis of the result becomes the time axis of the
//! downstream sequence model.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Channel count of the final convolutional stage.
pub const FEATURE_CHANNELS: usize = 512;

/// Standard deviation of the truncated-normal style weight initialization.
const WEIGHT_STD: f64 = 0.02;

/// The convolutional feature stack.
#[derive(Module, Debug)]
pub struct ConvStack<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    conv4: Conv2d<B>,
    conv5: Conv2d<B>,
    conv6: Conv2d<B>,
    conv7: Conv2d<B>,
    norm3: BatchNorm<B, 2>,
    norm5: BatchNorm<B, 2>,
    norm7: BatchNorm<B, 2>,
    pool_half: MaxPool2d,
    pool_wide: MaxPool2d,
}

impl<B: Backend> ConvStack<B> {
    /// Builds the stack for the given number of input channels.
    pub fn new(input_channels: usize, device: &B::Device) -> Self {
        Self {
            conv1: conv3x3(input_channels, 64, device),
            conv2: conv3x3(64, 128, device),
            conv3: conv3x3(128, 256, device),
            conv4: conv3x3(256, 256, device),
            conv5: conv3x3(256, 512, device),
            conv6: conv3x3(512, 512, device),
            conv7: zero_bias(
                Conv2dConfig::new([512, FEATURE_CHANNELS], [2, 2])
                    .with_padding(PaddingConfig2d::Valid)
                    .with_initializer(Initializer::Normal {
                        mean: 0.0,
                        std: WEIGHT_STD,
                    })
                    .init(device),
            ),
            norm3: BatchNormConfig::new(256).init(device),
            norm5: BatchNormConfig::new(512).init(device),
            norm7: BatchNormConfig::new(FEATURE_CHANNELS).init(device),
            pool_half: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            pool_wide: MaxPool2dConfig::new([2, 2]).with_strides([2, 1]).init(),
        }
    }

    /// Extracts the feature sequence of an image batch.
    ///
    /// Input is `[batch, channels, height, width]`; the result is
    /// `[batch, width', height' * 512]`, one feature vector per horizontal
    /// position.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let x = relu(self.conv1.forward(images));
        let x = self.pool_half.forward(x);

        let x = relu(self.conv2.forward(x));
        let x = self.pool_half.forward(x);

        let x = relu(self.norm3.forward(self.conv3.forward(x)));

        let x = relu(self.conv4.forward(x));
        let x = self.pool_wide.forward(pad_width(x));

        let x = relu(self.norm5.forward(self.conv5.forward(x)));

        let x = relu(self.conv6.forward(x));
        let x = self.pool_wide.forward(pad_width(x));

        let x = relu(self.norm7.forward(self.conv7.forward(x)));

        // [batch, channels, height, width] -> [batch, width, height * channels]
        let [batch, channels, height, width] = x.dims();
        x.permute([0, 3, 2, 1])
            .reshape([batch, width, height * channels])
    }
}

/// A same-padded 3x3 convolution with normal weights and zero biases.
fn conv3x3<B: Backend>(input: usize, output: usize, device: &B::Device) -> Conv2d<B> {
    zero_bias(
        Conv2dConfig::new([input, output], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .with_initializer(Initializer::Normal {
                mean: 0.0,
                std: WEIGHT_STD,
            })
            .init(device),
    )
}

fn zero_bias<B: Backend>(mut conv: Conv2d<B>) -> Conv2d<B> {
    conv.bias = conv.bias.map(|bias| bias.map(|tensor| tensor.zeros_like()));
    conv
}

/// Right-pads the width axis so a kernel-2, stride-1 pooling preserves width.
///
/// The padding value never survives the pooling because every output column
/// still covers at least one real input column.
fn pad_width<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    x.pad((0, 1, 0, 0), f32::NEG_INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CpuBackend;

    #[test]
    fn output_shape_matches_the_stage_table() {
        let device = Default::default();
        let stack = ConvStack::<CpuBackend>::new(1, &device);
        let images = Tensor::<CpuBackend, 4>::zeros([1, 1, 32, 20], &device);

        let features = stack.forward(images);
        // 20 -> 10 -> 5 -> 5 -> 5 -> 4 frames; 32 -> 1 row of 512 channels.
        assert_eq!(features.dims(), [1, 4, 512]);
    }

    #[test]
    fn taller_images_widen_the_feature_vector() {
        let device = Default::default();
        let stack = ConvStack::<CpuBackend>::new(1, &device);
        let images = Tensor::<CpuBackend, 4>::zeros([1, 1, 48, 20], &device);

        let features = stack.forward(images);
        // 48 / 16 - 1 = 2 rows of 512 channels each.
        assert_eq!(features.dims(), [1, 4, 1024]);
    }

    #[test]
    fn width_padding_is_invisible_to_the_pooling() {
        let device = Default::default();
        let x = Tensor::<CpuBackend, 4>::from_floats([[[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]]], &device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 1]).init();

        let pooled = pool.forward(pad_width(x));
        assert_eq!(pooled.dims(), [1, 1, 1, 3]);
        let values = pooled.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![5.0, 6.0, 6.0]);
    }
}
