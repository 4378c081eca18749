//! Configuration for the recognition model and its training schedule.
//!
//! `ModelConfig` describes everything a session needs to build the network
//! and drive optimization: canonical image geometry, learning-rate schedule,
//! optimizer choice, and the digits-only prediction flag. Validation happens
//! once, up front, so the model constructors can assume a consistent shape.

use serde::{Deserialize, Serialize};

use crate::core::{RecError, RecResult};

/// The optimizer applied during training.
///
/// Parsed from the `ada` / `adam` / `rms` configuration names. Unrecognized
/// names degrade to [`OptimizerKind::Rms`] with a warning rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// Adaptive per-parameter learning rates (AdaGrad family).
    Ada,
    /// Adam with a first-moment decay of 0.5.
    Adam,
    /// RMSProp, the default.
    Rms,
}

impl OptimizerKind {
    /// Resolves an optimizer name, falling back to RMSProp for unknown names.
    pub fn from_name(name: &str) -> Self {
        match name {
            "ada" => Self::Ada,
            "adam" => Self::Adam,
            "rms" => Self::Rms,
            other => {
                tracing::warn!("unrecognized optimizer '{other}', using rms instead");
                Self::Rms
            }
        }
    }

    /// The configuration name of this optimizer.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ada => "ada",
            Self::Adam => "adam",
            Self::Rms => "rms",
        }
    }
}

impl Default for OptimizerKind {
    fn default() -> Self {
        Self::Rms
    }
}

/// Configuration of the recognition model and its training schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Canonical image height every sample is resized to.
    pub image_height: usize,
    /// Canonical image width every sample is resized to.
    pub image_width: usize,
    /// Number of image channels fed to the network (1 or 3).
    pub channels: usize,
    /// Learning rate before any decay is applied.
    pub base_learning_rate: f64,
    /// Number of optimizer steps between learning-rate decays.
    pub decay_steps: usize,
    /// Multiplicative decay factor applied every `decay_steps` steps.
    pub decay_rate: f64,
    /// Optimizer applied during training.
    pub optimizer: OptimizerKind,
    /// Longest label the corpus is expected to contain.
    pub max_label_length: usize,
    /// Restrict decodable symbols to digits plus blank.
    pub digits_only: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            image_height: 32,
            image_width: 100,
            channels: 1,
            base_learning_rate: 1e-3,
            decay_steps: 1000,
            decay_rate: 0.9,
            optimizer: OptimizerKind::Rms,
            max_label_length: 24,
            digits_only: false,
        }
    }
}

impl ModelConfig {
    /// Creates a configuration with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the canonical image height.
    pub fn with_image_height(mut self, height: usize) -> Self {
        self.image_height = height;
        self
    }

    /// Sets the canonical image width.
    pub fn with_image_width(mut self, width: usize) -> Self {
        self.image_width = width;
        self
    }

    /// Sets the number of input channels.
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    /// Sets the base learning rate.
    pub fn with_base_learning_rate(mut self, rate: f64) -> Self {
        self.base_learning_rate = rate;
        self
    }

    /// Sets the decay interval in optimizer steps.
    pub fn with_decay_steps(mut self, steps: usize) -> Self {
        self.decay_steps = steps;
        self
    }

    /// Sets the multiplicative decay factor.
    pub fn with_decay_rate(mut self, rate: f64) -> Self {
        self.decay_rate = rate;
        self
    }

    /// Sets the optimizer.
    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sets the longest expected label length.
    pub fn with_max_label_length(mut self, length: usize) -> Self {
        self.max_label_length = length;
        self
    }

    /// Enables or disables digits-only prediction.
    pub fn with_digits_only(mut self, digits_only: bool) -> Self {
        self.digits_only = digits_only;
        self
    }

    /// Number of frames the encoder produces for the configured width.
    pub fn sequence_length(&self) -> usize {
        crate::model::usable_sequence_length(self.image_width)
    }

    /// Validates the configuration.
    ///
    /// The convolutional stack divides the height by 16 and consumes one more
    /// row in its final valid convolution, so the height must be a multiple
    /// of 16 of at least 32. The width must leave at least one output frame.
    pub fn validate(&self) -> RecResult<()> {
        if self.image_height < 32 || self.image_height % 16 != 0 {
            return Err(RecError::config(format!(
                "image height must be a multiple of 16 of at least 32, got {}",
                self.image_height
            )));
        }
        if self.image_width < 8 {
            return Err(RecError::config(format!(
                "image width must be at least 8, got {}",
                self.image_width
            )));
        }
        if self.channels != 1 && self.channels != 3 {
            return Err(RecError::config(format!(
                "channel count must be 1 or 3, got {}",
                self.channels
            )));
        }
        if !(self.base_learning_rate > 0.0) {
            return Err(RecError::config(format!(
                "base learning rate must be positive, got {}",
                self.base_learning_rate
            )));
        }
        if self.decay_steps == 0 {
            return Err(RecError::config("decay interval must be positive"));
        }
        if !(self.decay_rate > 0.0 && self.decay_rate <= 1.0) {
            return Err(RecError::config(format!(
                "decay rate must be in (0, 1], got {}",
                self.decay_rate
            )));
        }
        if self.max_label_length > self.sequence_length() {
            return Err(RecError::config(format!(
                "max label length {} exceeds the {} frames produced for width {}",
                self.max_label_length,
                self.sequence_length(),
                self.image_width
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ModelConfig::default().validate().is_ok());
    }

    #[test]
    fn builder_sets_fields() {
        let config = ModelConfig::new()
            .with_image_height(48)
            .with_image_width(160)
            .with_base_learning_rate(1e-4)
            .with_optimizer(OptimizerKind::Adam)
            .with_digits_only(true);
        assert_eq!(config.image_height, 48);
        assert_eq!(config.image_width, 160);
        assert_eq!(config.optimizer, OptimizerKind::Adam);
        assert!(config.digits_only);
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(ModelConfig::new().with_image_height(30).validate().is_err());
        assert!(ModelConfig::new().with_image_height(16).validate().is_err());
        assert!(ModelConfig::new().with_image_width(4).validate().is_err());
        assert!(ModelConfig::new().with_channels(2).validate().is_err());
    }

    #[test]
    fn rejects_label_longer_than_sequence() {
        let config = ModelConfig::new().with_image_width(40).with_max_label_length(10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_optimizer_name_degrades_to_rms() {
        assert_eq!(OptimizerKind::from_name("ada"), OptimizerKind::Ada);
        assert_eq!(OptimizerKind::from_name("adam"), OptimizerKind::Adam);
        assert_eq!(OptimizerKind::from_name("sgd"), OptimizerKind::Rms);
    }

    #[test]
    fn sequence_length_tracks_width() {
        let config = ModelConfig::new().with_image_width(100);
        assert_eq!(config.sequence_length(), 24);
    }
}
