//! COCO keypoint dataset toolkit
//!
//! Converts LabelMe annotations into COCO keypoint datasets, merges COCO
//! datasets with id remapping and deduplication, exports COCO back to
//! LabelMe, and renders annotation previews.

pub mod coco;
pub mod config;
pub mod conversion;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod remap;
pub mod types;
pub mod utils;
pub mod visualize;

// Re-export commonly used types
pub use coco::{Annotation, Category, Handler, Image, Info, License, Record};
pub use config::{DatasetPathConfig, DrawTarget, FromLabelmeOptions, Priority};
pub use dataset::CocoDataset;
pub use error::{Error, Result};
pub use geometry::{BBox, Keypoint, Point, Polygon};
pub use types::{ImageAnnotation, LabelmeAnnotationHandler, Shape, ShapeKind};
pub use visualize::{DrawStyle, FrameSequenceSink, FrameSink, VideoOptions, VisualizationOptions};
