//! Cursor-based batch feeding with deterministic image preprocessing.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;

use crate::codec::{encode_batch, SparseLabels};
use crate::core::{ModelConfig, RecError, RecResult};
use crate::corpus::manifest::{load_manifest, Sample, Split};

/// A 4-dimensional tensor represented as a 4D array of f32 values.
pub type Tensor4D = ndarray::Array4<f32>;

/// One batch of samples, ready for the network.
///
/// Images are stacked `[batch, channels, height, width]` with raw intensity
/// values in `0..=255`. The encoded labels, raw label strings, per-sample
/// label lengths, pixel widths, and source paths all share the batch order.
#[derive(Debug)]
pub struct Batch {
    /// Image stack, `[batch, channels, height, width]`.
    pub images: Tensor4D,
    /// Sparse encoding of the batch labels.
    pub encoded: SparseLabels,
    /// The raw label strings.
    pub labels: Vec<String>,
    /// Per-sample label lengths in symbols.
    pub label_lengths: Vec<usize>,
    /// Per-sample pixel widths after resizing.
    pub widths: Vec<usize>,
    /// Source image paths, passed through to prediction records.
    pub paths: Vec<PathBuf>,
}

impl Batch {
    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the batch contains no samples.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Iterates a labeled image corpus in fixed-size batches.
///
/// The source keeps an internal cursor that advances with every
/// [`next_batch`](BatchSource::next_batch) call and wraps to zero after the
/// final, possibly undersized, batch of a pass. `next_batch` both reads and
/// advances the cursor non-atomically, so a source must not be shared across
/// concurrent callers without external synchronization.
#[derive(Debug)]
pub struct BatchSource {
    samples: Vec<Sample>,
    cursor: usize,
    height: u32,
    width: u32,
    channels: usize,
}

impl BatchSource {
    /// Opens the given split of a corpus directory.
    ///
    /// The manifest and lexicon are read and cross-checked eagerly; see
    /// [`load_manifest`] for the failure modes.
    pub fn new(config: &ModelConfig, root: impl AsRef<Path>, split: Split) -> RecResult<Self> {
        let samples = load_manifest(root.as_ref(), split)?;
        Ok(Self {
            samples,
            cursor: 0,
            height: config.image_height as u32,
            width: config.image_width as u32,
            channels: config.channels,
        })
    }

    /// Number of samples in the corpus split.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the split contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Current cursor position, for diagnostics.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns up to `batch_size` consecutive samples starting at the cursor.
    ///
    /// Every image is decoded, converted to the configured channel layout,
    /// and resized to the canonical width and height with Catmull-Rom (cubic)
    /// interpolation. If fewer than `batch_size` samples remain, the batch is
    /// truncated to the remainder and the cursor wraps to zero for the next
    /// call; no sample repeats within one pass.
    ///
    /// # Errors
    ///
    /// Returns [`RecError::ImageDecode`] naming the offending path if any
    /// image fails to decode; the whole call aborts rather than skipping or
    /// substituting the sample. Label encoding failures propagate as
    /// [`RecError::InvalidSymbol`].
    pub fn next_batch(&mut self, batch_size: usize) -> RecResult<Batch> {
        if batch_size == 0 {
            return Err(RecError::invalid_input("batch size must be positive"));
        }
        if self.samples.is_empty() {
            return Err(RecError::invalid_input("corpus split is empty"));
        }

        let end = (self.cursor + batch_size).min(self.samples.len());
        let chunk = &self.samples[self.cursor..end];
        let n = chunk.len();
        let (height, width) = (self.height as usize, self.width as usize);

        let mut images = Tensor4D::zeros((n, self.channels, height, width));
        for (i, sample) in chunk.iter().enumerate() {
            let decoded = image::open(&sample.path).map_err(|source| RecError::ImageDecode {
                path: sample.path.clone(),
                source,
            })?;
            match self.channels {
                1 => {
                    let gray = image::imageops::resize(
                        &decoded.to_luma8(),
                        self.width,
                        self.height,
                        FilterType::CatmullRom,
                    );
                    for (x, y, pixel) in gray.enumerate_pixels() {
                        images[[i, 0, y as usize, x as usize]] = pixel.0[0] as f32;
                    }
                }
                _ => {
                    let rgb = image::imageops::resize(
                        &decoded.to_rgb8(),
                        self.width,
                        self.height,
                        FilterType::CatmullRom,
                    );
                    for (x, y, pixel) in rgb.enumerate_pixels() {
                        for (c, &value) in pixel.0.iter().enumerate() {
                            images[[i, c, y as usize, x as usize]] = value as f32;
                        }
                    }
                }
            }
        }

        let labels: Vec<String> = chunk.iter().map(|s| s.label.clone()).collect();
        let paths: Vec<PathBuf> = chunk.iter().map(|s| s.path.clone()).collect();
        let (encoded, label_lengths) = encode_batch(&labels)?;
        let widths = vec![width; n];

        self.cursor = end;
        if self.cursor >= self.samples.len() {
            self.cursor = 0;
            tracing::debug!(samples = self.samples.len(), "corpus pass complete, cursor reset");
        }

        Ok(Batch {
            images,
            encoded,
            labels,
            label_lengths,
            widths,
            paths,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Writes a tiny synthetic corpus: `count` gray PNGs plus manifest files.
    fn synthetic_corpus(dir: &Path, count: usize, labels: &[&str]) {
        std::fs::create_dir_all(dir.join("img")).unwrap();
        let mut annotation = String::new();
        let mut lexicon = String::new();
        for (i, label) in labels.iter().enumerate() {
            lexicon.push_str(label);
            lexicon.push('\n');
            if i < count {
                let img = image::GrayImage::from_fn(12, 6, |x, y| {
                    image::Luma([(x * 20 + y * 7 + i as u32 * 13) as u8])
                });
                img.save(dir.join(format!("img/{i}.png"))).unwrap();
                annotation.push_str(&format!("img/{i}.png {i}\n"));
            }
        }
        let mut f = std::fs::File::create(dir.join("annotation_train.txt")).unwrap();
        write!(f, "{annotation}").unwrap();
        let mut f = std::fs::File::create(dir.join("lexicon.txt")).unwrap();
        write!(f, "{lexicon}").unwrap();
    }

    fn config() -> ModelConfig {
        ModelConfig::new().with_image_width(20).with_max_label_length(4)
    }

    #[test]
    fn batches_have_canonical_shape() {
        let dir = tempfile::tempdir().unwrap();
        synthetic_corpus(dir.path(), 3, &["cat", "dog", "bird"]);
        let mut source = BatchSource::new(&config(), dir.path(), Split::Train).unwrap();

        let batch = source.next_batch(2).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.images.dim(), (2, 1, 32, 20));
        assert_eq!(batch.labels, vec!["cat", "dog"]);
        assert_eq!(batch.label_lengths, vec![3, 3]);
        assert_eq!(batch.widths, vec![20, 20]);
        assert_eq!(batch.encoded.dense_shape, [2, 3]);
    }

    #[test]
    fn wraps_after_emitting_the_short_final_batch() {
        let dir = tempfile::tempdir().unwrap();
        synthetic_corpus(dir.path(), 5, &["a", "b", "c", "d", "e"]);
        let mut source = BatchSource::new(&config(), dir.path(), Split::Train).unwrap();

        assert_eq!(source.next_batch(2).unwrap().len(), 2);
        assert_eq!(source.next_batch(2).unwrap().len(), 2);
        let last = source.next_batch(2).unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last.labels, vec!["e"]);
        assert_eq!(source.cursor(), 0);

        // The next pass restarts at sample 0.
        let batch = source.next_batch(2).unwrap();
        assert_eq!(batch.labels, vec!["a", "b"]);
    }

    #[test]
    fn never_wraps_while_samples_remain() {
        let dir = tempfile::tempdir().unwrap();
        synthetic_corpus(dir.path(), 4, &["a", "b", "c", "d"]);
        let mut source = BatchSource::new(&config(), dir.path(), Split::Train).unwrap();

        source.next_batch(2).unwrap();
        assert_eq!(source.cursor(), 2);
        // An evenly divisible pass wraps exactly at the end.
        source.next_batch(2).unwrap();
        assert_eq!(source.cursor(), 0);
    }

    #[test]
    fn undecodable_image_aborts_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        synthetic_corpus(dir.path(), 2, &["a", "b"]);
        std::fs::write(dir.path().join("img/1.png"), b"not a png").unwrap();
        let mut source = BatchSource::new(&config(), dir.path(), Split::Train).unwrap();

        let err = source.next_batch(2).unwrap_err();
        match err {
            RecError::ImageDecode { path, .. } => {
                assert!(path.ends_with("img/1.png"));
            }
            other => panic!("expected ImageDecode, got {other:?}"),
        }
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        synthetic_corpus(dir.path(), 1, &["a"]);
        let mut source = BatchSource::new(&config(), dir.path(), Split::Train).unwrap();
        assert!(source.next_batch(0).is_err());
    }
}
