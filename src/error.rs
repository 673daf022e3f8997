use std::path::PathBuf;

/// Errors produced while loading, converting, merging or rendering datasets.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),

    #[error("File not found: {path:?}")]
    FileNotFound { path: PathBuf },

    #[error("Directory not found: {path:?}")]
    DirNotFound { path: PathBuf },

    #[error("File already exists at {path:?}. Use overwrite to replace it")]
    FileExists { path: PathBuf },

    #[error("Directory {path:?} is not empty. Use overwrite to delete its contents first")]
    DirNotEmpty { path: PathBuf },

    #[error(
        "{file_name} already exists in {dir:?}. All filenames must be unique when preserving filenames"
    )]
    DuplicateFilename { file_name: String, dir: PathBuf },

    #[error("Dataset has no images")]
    EmptyDataset,

    #[error("Length mismatch: {what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Need to provide at least one category for conversion to COCO format")]
    NoCategories,

    #[error("Missing required key '{key}'")]
    MissingKey { key: &'static str },

    #[error("Invalid range {start}..{end} for {len} images")]
    InvalidRange { start: usize, end: usize, len: usize },

    #[error("Couldn't find {kind} map using dataset index {dataset_index}, old id {old_id}")]
    MissingIdMapping {
        kind: &'static str,
        dataset_index: usize,
        old_id: u64,
    },

    #[error("No {kind} with id {id}")]
    RecordNotFound { kind: &'static str, id: u64 },

    #[error("Duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: u64 },

    #[error("No {kind} id left after {}", u64::MAX - 1)]
    IdOverflow { kind: &'static str },

    #[error("No category named '{name}'")]
    CategoryNotFound { name: String },

    #[error("Found {count} categories named '{name}'")]
    AmbiguousCategory { name: String, count: usize },

    #[error("Invalid shape type '{shape_type}' in {file_name}. Expected point, polygon or rectangle")]
    InvalidShapeType {
        shape_type: String,
        file_name: String,
    },

    #[error("Label '{label}' in {file_name} does not exist in provided categories {known:?}")]
    UnknownLabel {
        label: String,
        file_name: String,
        known: Vec<String>,
    },

    #[error("The following keypoints were left unbounded in {file_name}: {labels:?}")]
    UnboundedKeypoints {
        file_name: String,
        labels: Vec<String>,
    },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}

pub type Result<T> = std::result::Result<T, Error>;
