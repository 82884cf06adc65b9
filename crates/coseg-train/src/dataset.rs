//! Labelled image/mask dataset for pairwise co-segmentation.
//!
//! Layout on disk:
//!
//! ```text
//! <image_root>/<class>/<stem>.<ext>
//! <mask_root>/<class>/<stem>.<ext>
//! ```
//!
//! Class directories sorted by name define the label ids. Datasets return raw
//! data and the batcher creates tensors on the target device.

use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
};

use burn::{
    data::{
        dataloader::batcher::Batcher,
        dataset::{Dataset, InMemDataset},
    },
    tensor::{backend::Backend, Tensor, TensorData},
};
use derive_new::new;
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use walkdir::WalkDir;

use crate::error::{DatasetError, DatasetResult};

/// ImageNet channel means.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Masks are foreground where the resized grey value is at least this.
const MASK_THRESHOLD: f32 = 0.5;

/// A single preprocessed sample.
#[derive(Debug, Clone)]
pub struct CoSegItem {
    /// RGB data `[H, W, C]` in `[0, 1]`.
    pub image: Vec<f32>,
    /// Binary mask data `[H, W]`, values 0.0 or 1.0.
    pub mask: Vec<f32>,
    pub label: usize,
    pub height: usize,
    pub width: usize,
}

/// A batch of samples on a device.
#[derive(new, Debug, Clone)]
pub struct CoSegBatch<B: Backend> {
    /// `[N, 3, H, W]`
    pub images: Tensor<B, 4>,
    /// `[N, H, W]`
    pub masks: Tensor<B, 3>,
    pub labels: Vec<usize>,
}

/// Converts [`CoSegItem`]s into a [`CoSegBatch`].
#[derive(Clone, Debug)]
pub struct CoSegBatcher<B: Backend> {
    normalize: bool,
    _phantom: PhantomData<B>,
}

impl<B: Backend> Default for CoSegBatcher<B> {
    fn default() -> Self {
        Self::new(true)
    }
}

impl<B: Backend> CoSegBatcher<B> {
    /// `normalize` toggles ImageNet normalization of the images.
    pub const fn new(normalize: bool) -> Self {
        Self {
            normalize,
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, CoSegItem, CoSegBatch<B>> for CoSegBatcher<B> {
    fn batch(&self, items: Vec<CoSegItem>, device: &B::Device) -> CoSegBatch<B> {
        let batch_size = items.len();

        let mut images = Vec::with_capacity(batch_size);
        let mut masks = Vec::with_capacity(batch_size);
        let mut labels = Vec::with_capacity(batch_size);

        for item in items {
            let image = Tensor::<B, 3>::from_data(
                TensorData::new(item.image, [item.height, item.width, 3]),
                device,
            )
            .permute([2, 0, 1]); // HWC to CHW

            let mask = Tensor::<B, 2>::from_data(
                TensorData::new(item.mask, [item.height, item.width]),
                device,
            );

            images.push(image);
            masks.push(mask);
            labels.push(item.label);
        }

        let images = Tensor::stack(images, 0);
        let images = if self.normalize {
            normalize_imagenet(images)
        } else {
            images
        };

        CoSegBatch::new(images, Tensor::stack(masks, 0), labels)
    }
}

fn channel_stats<B: Backend>(values: [f32; 3], device: &B::Device) -> Tensor<B, 4> {
    Tensor::<B, 1>::from_floats(values, device).reshape([1, 3, 1, 1])
}

/// `(x - mean) / std` per channel on `[N, 3, H, W]` images.
pub fn normalize_imagenet<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    let device = images.device();
    let mean = channel_stats::<B>(IMAGENET_MEAN, &device);
    let std = channel_stats::<B>(IMAGENET_STD, &device);
    (images - mean) / std
}

/// Inverse of [`normalize_imagenet`].
pub fn denormalize_imagenet<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    let device = images.device();
    images * channel_stats::<B>(IMAGENET_STD, &device) + channel_stats::<B>(IMAGENET_MEAN, &device)
}

#[derive(Debug, Clone)]
struct SampleEntry {
    image: PathBuf,
    mask: PathBuf,
    label: usize,
}

/// Labelled co-segmentation dataset.
#[derive(Debug)]
pub struct CoSegDataset {
    entries: Vec<SampleEntry>,
    classes: Vec<String>,
    image_size: u32,
}

impl CoSegDataset {
    /// Discovers all image/mask pairs below the two roots.
    ///
    /// Images without a matching mask are skipped with a warning.
    pub fn new(
        image_root: impl AsRef<Path>,
        mask_root: impl AsRef<Path>,
        image_size: u32,
    ) -> DatasetResult<Self> {
        let image_root = image_root.as_ref();
        let mask_root = mask_root.as_ref();

        if image_size == 0 {
            return Err(DatasetError::ZeroImageSize);
        }
        if !image_root.is_dir() {
            return Err(DatasetError::ImageDirectoryNotFound {
                path: image_root.to_path_buf(),
            });
        }
        if !mask_root.is_dir() {
            return Err(DatasetError::MaskDirectoryNotFound {
                path: mask_root.to_path_buf(),
            });
        }

        let classes = Self::collect_classes(image_root)?;
        if classes.is_empty() {
            return Err(DatasetError::NoClasses {
                path: image_root.to_path_buf(),
            });
        }

        let extensions = supported_image_extensions();
        let mut entries = Vec::new();

        for (label, class) in classes.iter().enumerate() {
            let class_dir = image_root.join(class);
            for entry in WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|source| DatasetError::DirectoryReadFailed {
                    path: class_dir.clone(),
                    source,
                })?;
                let path = entry.path();
                if !entry.file_type().is_file() || !has_extension(path, &extensions) {
                    continue;
                }

                match find_mask(&mask_root.join(class), path, &extensions) {
                    Some(mask) => entries.push(SampleEntry {
                        image: path.to_path_buf(),
                        mask,
                        label,
                    }),
                    None => tracing::warn!(image = %path.display(), "no mask found, skipping"),
                }
            }
        }

        if entries.is_empty() {
            return Err(DatasetError::NoValidPairs {
                path: image_root.to_path_buf(),
            });
        }

        tracing::info!(
            samples = entries.len(),
            classes = classes.len(),
            root = %image_root.display(),
            "loaded co-segmentation dataset"
        );

        Ok(Self {
            entries,
            classes,
            image_size,
        })
    }

    fn collect_classes(image_root: &Path) -> DatasetResult<Vec<String>> {
        let mut classes = Vec::new();
        for entry in WalkDir::new(image_root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|source| DatasetError::DirectoryReadFailed {
                path: image_root.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry
                .file_name()
                .to_str()
                .ok_or_else(|| DatasetError::InvalidUtf8Path {
                    path: entry.path().to_path_buf(),
                })?;
            classes.push(name.to_owned());
        }
        Ok(classes)
    }

    /// Class names, indexed by label id.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn label(&self, index: usize) -> Option<usize> {
        self.entries.get(index).map(|entry| entry.label)
    }

    pub const fn image_size(&self) -> u32 {
        self.image_size
    }

    fn load(&self, entry: &SampleEntry) -> Result<CoSegItem, image::ImageError> {
        let size = self.image_size;

        let image = image::open(&entry.image)?.resize_exact(size, size, FilterType::Lanczos3);
        let mask = image::open(&entry.mask)?.resize_exact(size, size, FilterType::Nearest);

        Ok(CoSegItem {
            image: image_to_array(image),
            mask: mask_to_array(mask),
            label: entry.label,
            height: size as usize,
            width: size as usize,
        })
    }
}

impl Dataset<CoSegItem> for CoSegDataset {
    fn get(&self, index: usize) -> Option<CoSegItem> {
        let entry = self.entries.get(index)?;
        match self.load(entry) {
            Ok(item) => Some(item),
            Err(err) => {
                tracing::error!(
                    image = %entry.image.display(),
                    mask = %entry.mask.display(),
                    error = %err,
                    "failed to load sample"
                );
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A dataset whose labels can be listed without decoding any image.
pub trait LabeledDataset: Dataset<CoSegItem> {
    /// Label of every sample, in index order.
    fn labels(&self) -> Vec<usize>;
}

impl LabeledDataset for CoSegDataset {
    fn labels(&self) -> Vec<usize> {
        self.entries.iter().map(|entry| entry.label).collect()
    }
}

impl LabeledDataset for InMemDataset<CoSegItem> {
    fn labels(&self) -> Vec<usize> {
        self.iter().map(|item| item.label).collect()
    }
}

fn image_to_array(image: DynamicImage) -> Vec<f32> {
    image.to_rgb32f().into_raw()
}

fn mask_to_array(mask: DynamicImage) -> Vec<f32> {
    mask.to_luma32f()
        .into_raw()
        .into_iter()
        .map(|value| if value >= MASK_THRESHOLD { 1.0 } else { 0.0 })
        .collect()
}

/// Lower-case extensions of every format the `image` crate knows.
fn supported_image_extensions() -> Vec<&'static str> {
    let mut extensions: Vec<_> = ImageFormat::all()
        .filter(|format| format.reading_enabled())
        .flat_map(|format| format.extensions_str().iter().copied())
        .collect();
    extensions.sort_unstable();
    extensions.dedup();
    extensions
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Finds `<mask_dir>/<stem>.<ext>`, trying the image's own extension first.
fn find_mask(mask_dir: &Path, image: &Path, extensions: &[&str]) -> Option<PathBuf> {
    let stem = image.file_stem()?;
    let base = mask_dir.join(stem);

    let mut candidates = Vec::with_capacity(extensions.len() + 1);
    if let Some(ext) = image.extension().and_then(|ext| ext.to_str()) {
        candidates.push(ext.to_owned());
    }
    for ext in extensions {
        candidates.push((*ext).to_owned());
        candidates.push(ext.to_ascii_uppercase());
    }

    candidates
        .into_iter()
        .map(|ext| base.with_extension(ext))
        .find(|candidate| candidate.is_file())
}
