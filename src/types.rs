use glob::glob;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::geometry::Point;
use crate::utils::{file_name_of, prepare_output_dir, read_json};

/// LabelMe version written into exported annotation files
pub const LABELME_VERSION: &str = "5.4.1";

// The shape types accepted by the LabelMe to COCO conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Point,
    Polygon,
    Rectangle,
}

impl ShapeKind {
    pub fn parse(shape_type: &str) -> Option<Self> {
        match shape_type {
            "point" => Some(Self::Point),
            "polygon" => Some(Self::Polygon),
            "rectangle" => Some(Self::Rectangle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Polygon => "polygon",
            Self::Rectangle => "rectangle",
        }
    }
}

// The Shape struct representing annotated shapes
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Shape {
    pub label: String,
    pub points: Vec<(f64, f64)>,
    #[serde(default)]
    pub group_id: Option<i64>,
    pub shape_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub flags: HashMap<String, bool>,
    #[serde(default)]
    pub mask: Option<String>,
}

impl Shape {
    pub fn new(label: impl Into<String>, points: &[Point], kind: ShapeKind) -> Self {
        Self {
            label: label.into(),
            points: points.iter().map(|&p| p.into()).collect(),
            group_id: None,
            shape_type: kind.as_str().to_string(),
            description: None,
            flags: HashMap::new(),
            mask: None,
        }
    }

    pub fn kind(&self) -> Option<ShapeKind> {
        ShapeKind::parse(&self.shape_type)
    }

    pub fn points(&self) -> Vec<Point> {
        self.points.iter().map(|&p| Point::from(p)).collect()
    }
}

// The ImageAnnotation struct representing the annotation information of an image
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnnotation {
    pub version: String,
    #[serde(default)]
    pub flags: Option<HashMap<String, bool>>,
    pub shapes: Vec<Shape>,
    pub image_path: String,
    #[serde(default)]
    pub image_data: Option<String>,
    pub image_height: u32,
    pub image_width: u32,
}

impl ImageAnnotation {
    pub fn new(image_path: impl Into<String>, image_height: u32, image_width: u32) -> Self {
        Self {
            version: LABELME_VERSION.to_string(),
            flags: Some(HashMap::new()),
            shapes: Vec::new(),
            image_path: image_path.into(),
            image_data: None,
            image_height,
            image_width,
        }
    }

    /// Base name of `imagePath`.
    pub fn image_file_name(&self) -> String {
        file_name_of(Path::new(&self.image_path))
    }
}

/// An ordered set of LabelMe annotations, one per image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelmeAnnotationHandler {
    pub annotations: Vec<ImageAnnotation>,
}

impl LabelmeAnnotationHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, annotation: ImageAnnotation) {
        self.annotations.push(annotation);
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImageAnnotation> {
        self.annotations.iter()
    }

    /// Load every `*.json` file directly inside `json_dir`, sorted by path.
    ///
    /// Relative `imagePath` values are resolved against `json_dir` so the
    /// converted dataset points at real files.
    pub fn load_from_dir(json_dir: &Path) -> Result<Self> {
        if !json_dir.is_dir() {
            return Err(Error::DirNotFound {
                path: json_dir.to_path_buf(),
            });
        }
        let pattern = json_dir.join("*.json");
        let mut paths: Vec<PathBuf> = glob(&pattern.to_string_lossy())?
            .filter_map(|entry| entry.ok())
            .collect();
        paths.sort();

        let mut handler = Self::new();
        for path in paths {
            let mut annotation: ImageAnnotation = read_json(&path)?;
            let image_path = Path::new(&annotation.image_path);
            if image_path.is_relative() {
                annotation.image_path = json_dir.join(image_path).to_string_lossy().into_owned();
            }
            debug!(
                "Loaded {} shapes from {}",
                annotation.shapes.len(),
                path.display()
            );
            handler.push(annotation);
        }
        info!(
            "Loaded {} LabelMe annotations from {}",
            handler.len(),
            json_dir.display()
        );
        Ok(handler)
    }

    /// Write one `<image stem>.json` per annotation into `output_dir`.
    pub fn save_to_dir(&self, output_dir: &Path, overwrite: bool) -> Result<()> {
        prepare_output_dir(output_dir, overwrite)?;
        for annotation in &self.annotations {
            let stem = Path::new(&annotation.image_path)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "annotation".to_string());
            let output_path = output_dir
                .join(sanitize_filename::sanitize(stem))
                .with_extension("json");
            if output_path.exists() {
                return Err(Error::DuplicateFilename {
                    file_name: file_name_of(&output_path),
                    dir: output_dir.to_path_buf(),
                });
            }
            let mut writer = BufWriter::new(File::create(&output_path)?);
            serde_json::to_writer_pretty(&mut writer, annotation)?;
            writer.flush()?;
        }
        info!(
            "Wrote {} LabelMe annotations to {}",
            self.annotations.len(),
            output_dir.display()
        );
        Ok(())
    }
}

impl<'a> IntoIterator for &'a LabelmeAnnotationHandler {
    type Item = &'a ImageAnnotation;
    type IntoIter = std::slice::Iter<'a, ImageAnnotation>;

    fn into_iter(self) -> Self::IntoIter {
        self.annotations.iter()
    }
}

impl FromIterator<ImageAnnotation> for LabelmeAnnotationHandler {
    fn from_iter<I: IntoIterator<Item = ImageAnnotation>>(iter: I) -> Self {
        Self {
            annotations: iter.into_iter().collect(),
        }
    }
}
