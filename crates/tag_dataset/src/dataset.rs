//! JSON-index dataset adapter: per-sample image loading and label encoding.

use crate::encode::{extract_multi_labels_from_array_cells, generate_itol_ltoi, Ltoi};
use crate::index::{IndexRow, IndexTable};
use crate::types::{DatasetResult, DatasetSample, LabelField, TagDatasetError};
use image::imageops::FilterType;
use image::RgbImage;
use std::path::PathBuf;

/// Resize applied to every image before batching. Images already at the
/// target size pass through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransform {
    pub target_size: (u32, u32),
}

impl ImageTransform {
    pub fn apply(&self, img: RgbImage) -> RgbImage {
        let (width, height) = self.target_size;
        if img.dimensions() == (width, height) {
            return img;
        }
        image::imageops::resize(&img, width, height, FilterType::Triangle)
    }
}

/// Convert an RGB image to CHW floats normalized to [0, 1].
pub fn chw_from_rgb(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let mut chw = Vec::with_capacity(3 * (width as usize) * (height as usize));
    for c in 0..3 {
        for y in 0..height {
            for x in 0..width {
                chw.push(img.get_pixel(x, y)[c] as f32 / 255.0);
            }
        }
    }
    chw
}

#[derive(Debug, Clone)]
pub struct IndexDatasetConfig {
    /// Root path holding the index file and the image subdirectory.
    pub root: PathBuf,
    /// Index file name relative to `root`.
    pub index_file: String,
    /// Image directory relative to `root` (`.` for images next to the index).
    pub image_subdir: String,
    /// Column holding the image file name.
    pub image_column: String,
    /// Column holding the labels.
    pub label_column: String,
    /// Encode labels as one-hot vectors. When false the label column must
    /// already hold numeric code vectors, passed through unmodified.
    pub one_hot_labels: bool,
    /// Build the label map from the label column (one-hot only). An explicit
    /// `label_map` takes precedence.
    pub derive_labels_from_column: bool,
    pub label_map: Option<Ltoi>,
    pub transform: Option<ImageTransform>,
}

impl Default for IndexDatasetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            index_file: "index.json".to_string(),
            image_subdir: "images".to_string(),
            image_column: "file".to_string(),
            label_column: "labels".to_string(),
            one_hot_labels: true,
            derive_labels_from_column: false,
            label_map: None,
            transform: None,
        }
    }
}

/// Multi-label image dataset backed by a JSON index file. Immutable once
/// constructed; reconfigure by rebuilding.
#[derive(Debug, Clone)]
pub struct JsonIndexDataset {
    image_dir: PathBuf,
    image_column: String,
    label_column: String,
    label_map: Option<Ltoi>,
    transform: Option<ImageTransform>,
    table: IndexTable,
}

impl JsonIndexDataset {
    /// Load the index table and validate the label configuration. One-hot
    /// encoding needs a label source: an explicit map wins over deriving
    /// from the label column; neither is a configuration error.
    pub fn new(cfg: IndexDatasetConfig) -> DatasetResult<Self> {
        let table = IndexTable::load(&cfg.root.join(&cfg.index_file))?;
        let label_map = Self::resolve_label_map(&cfg, &table)?;
        Ok(Self {
            image_dir: cfg.root.join(&cfg.image_subdir),
            image_column: cfg.image_column,
            label_column: cfg.label_column,
            label_map,
            transform: cfg.transform,
            table,
        })
    }

    fn resolve_label_map(
        cfg: &IndexDatasetConfig,
        table: &IndexTable,
    ) -> DatasetResult<Option<Ltoi>> {
        if !cfg.one_hot_labels {
            return Ok(None);
        }
        if let Some(map) = &cfg.label_map {
            println!("Label map provided; using it for one-hot encoding");
            return Ok(Some(map.clone()));
        }
        if cfg.derive_labels_from_column {
            println!(
                "Labels will be determined from column {} and used for one-hot encoding",
                cfg.label_column
            );
            let cells = table.label_column(&cfg.label_column)?;
            let labels = extract_multi_labels_from_array_cells(&cells)?;
            let (_, ltoi) = generate_itol_ltoi(&labels);
            return Ok(Some(ltoi));
        }
        Err(TagDatasetError::MissingLabelSource)
    }

    /// Load one sample: decode the image, apply the transform, encode the
    /// labels, and parse the numeric sample id out of the file name.
    pub fn get(&self, idx: usize) -> DatasetResult<DatasetSample> {
        let row = self
            .table
            .row(idx)
            .ok_or_else(|| TagDatasetError::Other(format!("sample index {idx} out of range")))?;
        let file = row.string_field(&self.image_column)?.to_string();
        let sample_id = parse_sample_id(&file)?;

        let path = self.image_dir.join(&file);
        let img = image::open(&path)
            .map_err(|e| TagDatasetError::Image {
                path: path.clone(),
                source: e,
            })?
            .to_rgb8();
        let img = match &self.transform {
            Some(t) => t.apply(img),
            None => img,
        };
        let (width, height) = img.dimensions();
        let target = self.encode_target(row)?;

        Ok(DatasetSample {
            sample_id,
            image_chw: chw_from_rgb(&img),
            width,
            height,
            target,
        })
    }

    fn encode_target(&self, row: &IndexRow) -> DatasetResult<Vec<f32>> {
        let cell = row.label_field(&self.label_column)?;
        match &self.label_map {
            Some(map) => {
                let labels = match cell {
                    LabelField::One(label) => vec![label],
                    LabelField::Many(labels) => labels,
                    LabelField::Codes(_) => {
                        return Err(TagDatasetError::Other(
                            "numeric label cells cannot be one-hot encoded".to_string(),
                        ))
                    }
                };
                let mut codes = vec![0.0f32; map.len()];
                for label in &labels {
                    let i = *map
                        .get(label)
                        .ok_or_else(|| TagDatasetError::UnknownLabel {
                            label: label.clone(),
                        })?;
                    let slot = codes.get_mut(i).ok_or_else(|| {
                        TagDatasetError::Other(format!(
                            "label index {i} outside vocabulary of {}",
                            map.len()
                        ))
                    })?;
                    *slot = 1.0;
                }
                Ok(codes)
            }
            None => match cell {
                LabelField::Codes(codes) => Ok(codes),
                LabelField::One(_) | LabelField::Many(_) => Err(TagDatasetError::Other(
                    "label pass-through requires numeric label cells".to_string(),
                )),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Resolved label-to-integer map; `None` for pass-through datasets.
    pub fn label_map(&self) -> Option<&Ltoi> {
        self.label_map.as_ref()
    }

    pub fn transform(&self) -> Option<&ImageTransform> {
        self.transform.as_ref()
    }
}

/// Parse the numeric sample id from an image file name of the form
/// `<numeric-id>.<3-char-extension>`, e.g. `10091.png`.
pub fn parse_sample_id(file: &str) -> DatasetResult<u64> {
    if file.len() < 5 || !file.is_char_boundary(file.len() - 4) {
        return Err(TagDatasetError::BadSampleId {
            file: file.to_string(),
            msg: "name shorter than its 4-character extension".to_string(),
        });
    }
    let (stem, ext) = file.split_at(file.len() - 4);
    if !ext.starts_with('.') {
        return Err(TagDatasetError::BadSampleId {
            file: file.to_string(),
            msg: format!("expected a dot-led 4-character extension, got {ext:?}"),
        });
    }
    stem.parse::<u64>().map_err(|_| TagDatasetError::BadSampleId {
        file: file.to_string(),
        msg: format!("stem {stem:?} is not numeric"),
    })
}

#[cfg(test)]
mod tests {
    use super::parse_sample_id;
    use crate::types::TagDatasetError;

    #[test]
    fn sample_id_from_numeric_name() {
        assert_eq!(parse_sample_id("10091.png").unwrap(), 10091);
        assert_eq!(parse_sample_id("7.jpg").unwrap(), 7);
    }

    #[test]
    fn sample_id_rejects_non_numeric_stem() {
        assert!(matches!(
            parse_sample_id("abc.png"),
            Err(TagDatasetError::BadSampleId { .. })
        ));
    }

    #[test]
    fn sample_id_rejects_long_extension() {
        // "10091.jpeg" splits as "10091.".."jpeg"; no leading dot in the tail.
        assert!(matches!(
            parse_sample_id("10091.jpeg"),
            Err(TagDatasetError::BadSampleId { .. })
        ));
    }

    #[test]
    fn sample_id_rejects_short_names() {
        assert!(parse_sample_id(".png").is_err());
        assert!(parse_sample_id("png").is_err());
    }
}
