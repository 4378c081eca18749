//! Mode-dispatched orchestration of the recognition pipeline.
//!
//! A [`Session`] owns the model parameters, the optimizer, the learning-rate
//! schedule, and the smoothed-loss state, and exposes one entry point per
//! mode: [`train_step`](Session::train_step) applies a single optimizer step,
//! [`evaluate`](Session::evaluate) adds loss monitoring and sequence metrics,
//! and [`predict`](Session::predict) runs the decoder alone. Each entry point
//! returns its own output struct; no mode shares a half-filled record with
//! another.

pub mod metrics;

use std::path::PathBuf;

use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{
    AdaGrad, AdaGradConfig, Adam, AdamConfig, GradientsParams, Optimizer, RmsProp, RmsPropConfig,
};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use ndarray::Array3;

use crate::codec::{decode_codes, BLANK_CODE};
use crate::core::{ModelConfig, OptimizerKind, RecError, RecResult};
use crate::corpus::{Batch, Tensor4D};
use crate::decode::{beam, BeamDecoder};
use crate::loss::{validate_alignment, CtcLoss};
use crate::model::{usable_sequence_length, CpuBackend, Crnn, TrainBackend};

/// Decay of the smoothed-loss exponential moving average.
const LOSS_EMA_DECAY: f64 = 0.99;

type TrainModel = Crnn<TrainBackend>;
type Device = <TrainBackend as Backend>::Device;

/// One recognized word with its diagnostics.
#[derive(Debug, Clone)]
pub struct WordPrediction {
    /// The decoded word, lowercase-normalized.
    pub word: String,
    /// Raw per-frame arg-max codes over the full lattice depth.
    pub raw_codes: Vec<u32>,
    /// Log-probability margin between the two best beam hypotheses.
    pub confidence: f32,
    /// Source image path, passed through from the batch.
    pub source: PathBuf,
}

/// Result of one training step.
#[derive(Debug, Clone)]
pub struct TrainOutput {
    /// Batch-mean alignment loss.
    pub loss: f32,
    /// Exponential moving average of the loss.
    pub smoothed_loss: f32,
    /// Learning rate the step was applied with.
    pub learning_rate: f64,
    /// Step counter after the update.
    pub step: usize,
}

/// Result of one evaluation pass.
#[derive(Debug, Clone)]
pub struct EvalOutput {
    /// Batch-mean alignment loss, for monitoring.
    pub loss: f32,
    /// Mean normalized edit distance between predictions and targets.
    pub character_error_rate: f32,
    /// Exact-match accuracy against lowercase-folded targets.
    pub accuracy: f32,
    /// The decoded predictions.
    pub predictions: Vec<WordPrediction>,
}

/// Result of one prediction pass.
#[derive(Debug, Clone)]
pub struct PredictOutput {
    /// The decoded predictions, in batch order.
    pub predictions: Vec<WordPrediction>,
}

/// Exponential moving average of the training loss.
///
/// Session-owned observability state: it never feeds back into gradients and
/// can be reset explicitly. The first observation seeds the average.
#[derive(Debug, Clone)]
pub struct LossAverage {
    decay: f64,
    value: Option<f64>,
}

impl LossAverage {
    /// Creates an average with the given decay.
    pub fn new(decay: f64) -> Self {
        Self { decay, value: None }
    }

    /// Folds in a new observation and returns the updated average.
    pub fn update(&mut self, observation: f64) -> f64 {
        let updated = match self.value {
            Some(value) => self.decay * value + (1.0 - self.decay) * observation,
            None => observation,
        };
        self.value = Some(updated);
        updated
    }

    /// The current average, if any observation arrived yet.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Clears the average.
    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// Exponential-decay learning-rate schedule with staircase steps.
#[derive(Debug, Clone)]
pub struct LearningRateSchedule {
    base: f64,
    decay_steps: usize,
    decay_rate: f64,
}

impl LearningRateSchedule {
    /// Builds the schedule from the model configuration.
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            base: config.base_learning_rate,
            decay_steps: config.decay_steps,
            decay_rate: config.decay_rate,
        }
    }

    /// Learning rate at the given step; decays step-wise, not continuously.
    pub fn at_step(&self, step: usize) -> f64 {
        self.base * self.decay_rate.powi((step / self.decay_steps) as i32)
    }
}

/// The optimizer applied by [`Session::train_step`].
enum ModelOptimizer {
    Ada(OptimizerAdaptor<AdaGrad, TrainModel, TrainBackend>),
    Adam(OptimizerAdaptor<Adam, TrainModel, TrainBackend>),
    Rms(OptimizerAdaptor<RmsProp, TrainModel, TrainBackend>),
}

impl ModelOptimizer {
    fn new(kind: OptimizerKind) -> Self {
        match kind {
            OptimizerKind::Ada => Self::Ada(AdaGradConfig::new().init()),
            OptimizerKind::Adam => Self::Adam(AdamConfig::new().with_beta_1(0.5).init()),
            OptimizerKind::Rms => Self::Rms(RmsPropConfig::new().init()),
        }
    }

    fn step(
        &mut self,
        learning_rate: f64,
        model: TrainModel,
        grads: GradientsParams,
    ) -> TrainModel {
        match self {
            Self::Ada(optimizer) => optimizer.step(learning_rate, model, grads),
            Self::Adam(optimizer) => optimizer.step(learning_rate, model, grads),
            Self::Rms(optimizer) => optimizer.step(learning_rate, model, grads),
        }
    }
}

/// Orchestrates training, evaluation, and prediction over one model.
///
/// Model parameters are mutated only by [`train_step`](Session::train_step);
/// the other modes read them through the autodiff-free view of the module.
pub struct Session {
    config: ModelConfig,
    device: Device,
    model: TrainModel,
    optimizer: ModelOptimizer,
    schedule: LearningRateSchedule,
    loss_average: LossAverage,
    loss: CtcLoss,
    decoder: BeamDecoder,
    step: usize,
}

impl Session {
    /// Builds a session with freshly initialized model parameters.
    pub fn new(config: ModelConfig) -> RecResult<Self> {
        config.validate()?;
        let device = Device::default();
        let model = Crnn::new(&config, &device);
        Ok(Self {
            optimizer: ModelOptimizer::new(config.optimizer),
            schedule: LearningRateSchedule::new(&config),
            loss_average: LossAverage::new(LOSS_EMA_DECAY),
            loss: CtcLoss::new(BLANK_CODE as usize),
            decoder: BeamDecoder::new(),
            step: 0,
            config,
            device,
            model,
        })
    }

    /// The configuration the session was built with.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Number of optimizer steps applied so far.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Learning rate the next training step will use.
    pub fn learning_rate(&self) -> f64 {
        self.schedule.at_step(self.step)
    }

    /// Clears the smoothed-loss average.
    pub fn reset_loss_average(&mut self) {
        self.loss_average.reset();
    }

    /// Applies one optimizer step on the given batch.
    pub fn train_step(&mut self, batch: &Batch) -> RecResult<TrainOutput> {
        let input_lengths = self.input_lengths(batch);
        validate_alignment(&batch.encoded.sequences(), &input_lengths)?;

        let images = image_tensor::<TrainBackend>(&batch.images, &self.device);
        let lattice = self.model.forward(images);
        let (targets, target_lengths) = target_tensors::<TrainBackend>(batch, &self.device);
        let loss = self.loss.mean(
            lattice,
            targets,
            length_tensor::<TrainBackend>(&input_lengths, &self.device),
            target_lengths,
        );
        let loss_value: f32 = loss.clone().into_scalar();

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        let learning_rate = self.schedule.at_step(self.step);
        self.model = self.optimizer.step(learning_rate, self.model.clone(), grads);
        self.step += 1;

        let smoothed_loss = self.loss_average.update(loss_value as f64) as f32;
        tracing::debug!(
            step = self.step,
            loss = loss_value,
            smoothed = smoothed_loss,
            learning_rate,
            "train step"
        );
        Ok(TrainOutput {
            loss: loss_value,
            smoothed_loss,
            learning_rate,
            step: self.step,
        })
    }

    /// Evaluates the batch: monitoring loss, CER, accuracy, and predictions.
    pub fn evaluate(&self, batch: &Batch) -> RecResult<EvalOutput> {
        let input_lengths = self.input_lengths(batch);
        let sequences = batch.encoded.sequences();
        validate_alignment(&sequences, &input_lengths)?;

        let model = self.model.valid();
        let images = image_tensor::<CpuBackend>(&batch.images, &self.device);
        let lattice = model.forward(images);

        let (targets, target_lengths) = target_tensors::<CpuBackend>(batch, &self.device);
        let loss: f32 = self
            .loss
            .mean(
                lattice.clone(),
                targets,
                length_tensor::<CpuBackend>(&input_lengths, &self.device),
                target_lengths,
            )
            .into_scalar();

        let lattice = host_lattice(lattice)?;
        let decoded = self.decoder.decode_batch(&lattice, &input_lengths)?;
        let code_sequences: Vec<Vec<u32>> = decoded.iter().map(|d| d.codes.clone()).collect();
        let character_error_rate = metrics::character_error_rate(&code_sequences, &sequences);

        let predictions = predictions_from(decoded, &lattice, &batch.paths)?;
        let words: Vec<String> = predictions.iter().map(|p| p.word.clone()).collect();
        let accuracy = metrics::sequence_accuracy(&words, &batch.labels);

        tracing::debug!(loss, character_error_rate, accuracy, "evaluation");
        Ok(EvalOutput {
            loss,
            character_error_rate,
            accuracy,
            predictions,
        })
    }

    /// Runs the decoder only; labels in the batch are ignored.
    pub fn predict(&self, batch: &Batch) -> RecResult<PredictOutput> {
        let input_lengths = self.input_lengths(batch);
        let model = self.model.valid();
        let images = image_tensor::<CpuBackend>(&batch.images, &self.device);
        let lattice = host_lattice(model.forward(images))?;
        let decoded = self.decoder.decode_batch(&lattice, &input_lengths)?;
        let predictions = predictions_from(decoded, &lattice, &batch.paths)?;
        Ok(PredictOutput { predictions })
    }

    fn input_lengths(&self, batch: &Batch) -> Vec<usize> {
        batch
            .widths
            .iter()
            .map(|&width| usable_sequence_length(width))
            .collect()
    }
}

/// Turns decoded hypotheses into prediction records with diagnostics.
fn predictions_from(
    decoded: Vec<crate::decode::Decoded>,
    lattice: &Array3<f32>,
    paths: &[PathBuf],
) -> RecResult<Vec<WordPrediction>> {
    decoded
        .into_iter()
        .enumerate()
        .map(|(sample, decoded)| {
            Ok(WordPrediction {
                word: decode_codes(&decoded.codes)?,
                raw_codes: beam::raw_codes(lattice, sample),
                confidence: decoded.confidence,
                source: paths.get(sample).cloned().unwrap_or_default(),
            })
        })
        .collect()
}

/// Uploads a host image stack to the given backend.
fn image_tensor<B: Backend>(images: &Tensor4D, device: &B::Device) -> Tensor<B, 4> {
    let (n, c, h, w) = images.dim();
    let data: Vec<f32> = images.iter().copied().collect();
    Tensor::from_data(TensorData::new(data, [n, c, h, w]), device)
}

/// Builds the padded target matrix and target-length vector of a batch.
fn target_tensors<B: Backend>(
    batch: &Batch,
    device: &B::Device,
) -> (Tensor<B, 2, Int>, Tensor<B, 1, Int>) {
    let (padded, shape) = batch.encoded.padded();
    let targets = Tensor::from_data(TensorData::new(padded, shape), device);
    let lengths: Vec<i64> = batch.label_lengths.iter().map(|&l| l as i64).collect();
    let count = lengths.len();
    let target_lengths = Tensor::from_data(TensorData::new(lengths, [count]), device);
    (targets, target_lengths)
}

fn length_tensor<B: Backend>(lengths: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let data: Vec<i64> = lengths.iter().map(|&l| l as i64).collect();
    Tensor::from_data(TensorData::new(data, [lengths.len()]), device)
}

/// Downloads a time-major lattice into a host array.
fn host_lattice<B: Backend>(lattice: Tensor<B, 3>) -> RecResult<Array3<f32>> {
    let [time, batch, classes] = lattice.dims();
    let values = lattice
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| RecError::invalid_input(format!("lattice transfer failed: {e:?}")))?;
    Ok(Array3::from_shape_vec((time, batch, classes), values)?)
}
