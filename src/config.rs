use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::utils::{parent_dir_of, read_json};

/// Command-line interface for converting, merging and previewing COCO datasets.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Convert a directory of LabelMe JSON files into a COCO dataset
    FromLabelme(FromLabelmeArgs),
    /// Convert a COCO dataset into LabelMe JSON files
    ToLabelme(ToLabelmeArgs),
    /// Merge several COCO datasets into one
    Combine(CombineArgs),
    /// Merge the COCO datasets listed in a dataset path config file
    CombineConfig(CombineConfigArgs),
    /// Render annotations onto the dataset images
    Visualize(VisualizeArgs),
    /// Render annotations into a padded frame sequence
    Video(VideoArgs),
}

#[derive(Args, Debug, Clone)]
pub struct FromLabelmeArgs {
    /// Directory containing LabelMe JSON files
    #[arg(short = 'd', long = "json_dir")]
    pub json_dir: PathBuf,

    /// JSON file holding the list of COCO categories
    #[arg(short = 'c', long = "categories")]
    pub categories: PathBuf,

    /// Path of the COCO JSON file to write
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Look up images in this directory instead of each file's imagePath
    #[arg(long = "img_dir")]
    pub img_dir: Option<PathBuf>,

    /// Keep rectangles drawn inside polygons (and polygons inside rectangles)
    #[arg(long = "keep_redundant")]
    pub keep_redundant: bool,

    /// Do not fail when a keypoint lies outside every polygon and rectangle
    #[arg(long = "allow_unbounded_kpts")]
    pub allow_unbounded_kpts: bool,

    /// Do not fail on shape types other than point, polygon and rectangle
    #[arg(long = "skip_shape_type_check")]
    pub skip_shape_type_check: bool,

    /// Skip polygons and rectangles whose label is not a category
    #[arg(long = "ignore_unspecified_categories")]
    pub ignore_unspecified_categories: bool,

    /// Replace the output file if it exists
    #[arg(long = "overwrite")]
    pub overwrite: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ToLabelmeArgs {
    /// COCO annotation file
    #[arg(short = 'a', long = "ann_path")]
    pub ann_path: PathBuf,

    /// Directory containing the dataset images
    #[arg(long = "img_dir")]
    pub img_dir: Option<PathBuf>,

    /// Directory receiving the LabelMe JSON files
    #[arg(short = 'o', long = "output_dir")]
    pub output_dir: PathBuf,

    /// Which COCO geometry to export as the LabelMe shape
    #[arg(long = "priority", value_enum, default_value = "seg")]
    pub priority: Priority,

    /// Delete the contents of the output directory first
    #[arg(long = "overwrite")]
    pub overwrite: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CombineArgs {
    /// COCO annotation files, in merge order
    #[arg(short = 'a', long = "ann_path", required = true)]
    pub ann_paths: Vec<PathBuf>,

    /// Image directory for each annotation file, in the same order
    #[arg(long = "img_dir")]
    pub img_dirs: Vec<PathBuf>,

    /// Path of the merged COCO JSON file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Replace the output file if it exists
    #[arg(long = "overwrite")]
    pub overwrite: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CombineConfigArgs {
    /// Dataset path config file
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,

    /// Path of the merged COCO JSON file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Replace the output file if it exists
    #[arg(long = "overwrite")]
    pub overwrite: bool,
}

#[derive(Args, Debug, Clone)]
pub struct VisualizeArgs {
    /// COCO annotation file
    #[arg(short = 'a', long = "ann_path")]
    pub ann_path: PathBuf,

    /// Directory containing the dataset images
    #[arg(long = "img_dir")]
    pub img_dir: Option<PathBuf>,

    /// Directory receiving the rendered images
    #[arg(short = 'o', long = "save_dir", default_value = "vis_preview")]
    pub save_dir: PathBuf,

    /// Name outputs by sequence number instead of the original filename
    #[arg(long = "rename")]
    pub rename: bool,

    /// Copy images without drawing annotations
    #[arg(long = "no_annotations")]
    pub no_annotations: bool,

    /// Delete the contents of the save directory first
    #[arg(long = "overwrite")]
    pub overwrite: bool,

    /// First image index to render
    #[arg(long = "start", default_value_t = 0)]
    pub start: usize,

    /// Index one past the last image to render
    #[arg(long = "end")]
    pub end: Option<usize>,

    /// Order in which annotation parts are drawn
    #[arg(long = "draw_order", value_enum, use_value_delimiter = true, default_values_t = DrawTarget::default_order())]
    pub draw_order: Vec<DrawTarget>,
}

#[derive(Args, Debug, Clone)]
pub struct VideoArgs {
    /// COCO annotation file
    #[arg(short = 'a', long = "ann_path")]
    pub ann_path: PathBuf,

    /// Directory containing the dataset images
    #[arg(long = "img_dir")]
    pub img_dir: Option<PathBuf>,

    /// Directory receiving the frames
    #[arg(short = 'o', long = "frame_dir")]
    pub frame_dir: PathBuf,

    /// Frames per second recorded alongside the frames
    #[arg(long = "fps", default_value_t = 20)]
    pub fps: u32,

    /// Only pad frames, without rescaling them first
    #[arg(long = "no_rescale")]
    pub no_rescale: bool,

    /// Copy images without drawing annotations
    #[arg(long = "no_annotations")]
    pub no_annotations: bool,

    /// Delete the contents of the frame directory first
    #[arg(long = "overwrite")]
    pub overwrite: bool,
}

// Which geometry COCO to LabelMe conversion prefers
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum Priority {
    /// Export segmentation polygons when they lie within the bbox
    #[default]
    Seg,
    /// Always export the bbox as a rectangle
    Bbox,
}

// Parts of an annotation that can be drawn
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum DrawTarget {
    Seg,
    Bbox,
    Skeleton,
    Kpt,
}

impl DrawTarget {
    pub fn default_order() -> Vec<DrawTarget> {
        vec![
            DrawTarget::Seg,
            DrawTarget::Bbox,
            DrawTarget::Skeleton,
            DrawTarget::Kpt,
        ]
    }
}

impl std::fmt::Display for DrawTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DrawTarget::Seg => "seg",
            DrawTarget::Bbox => "bbox",
            DrawTarget::Skeleton => "skeleton",
            DrawTarget::Kpt => "kpt",
        };
        f.write_str(name)
    }
}

/// Options for LabelMe to COCO conversion
#[derive(Debug, Clone)]
pub struct FromLabelmeOptions {
    pub img_dir: Option<PathBuf>,
    pub remove_redundant: bool,
    pub ensure_no_unbounded_kpts: bool,
    pub ensure_valid_shape_type: bool,
    pub ignore_unspecified_categories: bool,
    pub license_name: String,
    pub license_url: String,
    pub show_pbar: bool,
}

impl Default for FromLabelmeOptions {
    fn default() -> Self {
        Self {
            img_dir: None,
            remove_redundant: true,
            ensure_no_unbounded_kpts: true,
            ensure_valid_shape_type: true,
            ignore_unspecified_categories: false,
            license_name: "MIT License".to_string(),
            license_url: "https://opensource.org/licenses/MIT".to_string(),
            show_pbar: false,
        }
    }
}

impl From<&FromLabelmeArgs> for FromLabelmeOptions {
    fn from(args: &FromLabelmeArgs) -> Self {
        Self {
            img_dir: args.img_dir.clone(),
            remove_redundant: !args.keep_redundant,
            ensure_no_unbounded_kpts: !args.allow_unbounded_kpts,
            ensure_valid_shape_type: !args.skip_shape_type_check,
            ignore_unspecified_categories: args.ignore_unspecified_categories,
            show_pbar: true,
            ..Self::default()
        }
    }
}

// Annotation formats a dataset path config may reference
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationFormat {
    Coco,
}

/// One dataset listed in a [`DatasetPathConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetPathEntry {
    /// Root of the dataset; relative roots are resolved against the config file
    pub dataset_dir: PathBuf,
    /// Image directory, relative to `dataset_dir` unless absolute
    pub img_dir: PathBuf,
    /// Annotation file, relative to `dataset_dir` unless absolute
    pub ann_path: PathBuf,
    #[serde(default = "default_ann_format")]
    pub ann_format: AnnotationFormat,
}

fn default_ann_format() -> AnnotationFormat {
    AnnotationFormat::Coco
}

/// Resolved locations of one dataset
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetPaths {
    pub dataset_dir: PathBuf,
    pub img_dir: PathBuf,
    pub ann_path: PathBuf,
    pub ann_format: AnnotationFormat,
}

/// A JSON file listing the datasets to merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetPathConfig {
    pub datasets: Vec<DatasetPathEntry>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl DatasetPathConfig {
    pub fn new(datasets: Vec<DatasetPathEntry>) -> Self {
        Self {
            datasets,
            base_dir: PathBuf::from("."),
        }
    }

    pub fn load(config_path: &Path) -> Result<Self> {
        let mut config: DatasetPathConfig = read_json(config_path)?;
        config.base_dir = parent_dir_of(config_path);
        Ok(config)
    }

    pub fn get_paths(&self) -> Vec<DatasetPaths> {
        self.datasets
            .iter()
            .map(|entry| {
                let dataset_dir = self.base_dir.join(&entry.dataset_dir);
                DatasetPaths {
                    img_dir: dataset_dir.join(&entry.img_dir),
                    ann_path: dataset_dir.join(&entry.ann_path),
                    ann_format: entry.ann_format,
                    dataset_dir,
                }
            })
            .collect()
    }
}
