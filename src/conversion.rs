//! Conversion between LabelMe shapes and COCO annotations
//!
//! LabelMe stores unordered shapes with free-form labels. COCO binds each
//! instance to a category and orders its keypoints by the category's keypoint
//! labels. Going from LabelMe to COCO therefore groups shapes per instance:
//! every polygon or rectangle becomes one instance, and each point shape is
//! claimed by the first bounding shape that contains it.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::coco::{Annotation, Category, CategoryHandler, Image, License};
use crate::config::{FromLabelmeOptions, Priority};
use crate::dataset::CocoDataset;
use crate::error::{Error, Result};
use crate::geometry::{BBox, Keypoint, Point, Polygon};
use crate::types::{ImageAnnotation, LabelmeAnnotationHandler, Shape, ShapeKind};
use crate::utils::{capture_time, check_file_exists, create_progress_bar, file_name_of};

/// Description given to the [`crate::coco::Info`] of a converted dataset
pub const FROM_LABELME_DESCRIPTION: &str = "COCO Dataset converted from LabelMe";

/// Id of the single license attached to converted datasets
pub const DEFAULT_LICENSE_ID: u64 = 0;

/// The region an instance is bounded by
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Polygon(Polygon),
    BBox(BBox),
}

impl Bound {
    pub fn contains_point(&self, p: &Point) -> bool {
        match self {
            Bound::Polygon(polygon) => polygon.contains_point(p),
            Bound::BBox(bbox) => bbox.contains_point(p),
        }
    }

    pub fn bbox(&self) -> Result<BBox> {
        match self {
            Bound::Polygon(polygon) => polygon.to_bbox(),
            Bound::BBox(bbox) => Ok(*bbox),
        }
    }
}

/// Point shapes of one image waiting to be claimed, keyed by label in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct KeypointPool {
    entries: Vec<(String, Vec<Point>)>,
}

impl KeypointPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: &str, point: Point) {
        match self.entries.iter_mut().find(|(l, _)| l == label) {
            Some((_, points)) => points.push(point),
            None => self.entries.push((label.to_string(), vec![point])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of points still unclaimed.
    pub fn remaining(&self) -> usize {
        self.entries.iter().map(|(_, points)| points.len()).sum()
    }

    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|(label, _)| label.clone()).collect()
    }

    /// For every label, remove the first point inside `bound` and return it.
    /// Labels whose last point is taken disappear from the pool.
    pub fn claim_within(&mut self, bound: &Bound) -> Vec<(String, Point)> {
        let mut claimed = Vec::new();
        for (label, points) in self.entries.iter_mut() {
            if let Some(pos) = points.iter().position(|p| bound.contains_point(p)) {
                claimed.push((label.clone(), points.remove(pos)));
            }
        }
        self.entries.retain(|(_, points)| !points.is_empty());
        claimed
    }
}

/// One instance under construction: a bounding shape, its category and the
/// keypoints registered inside it.
#[derive(Debug, Clone)]
pub struct KeypointGroup<'a> {
    pub bound: Bound,
    pub category: &'a Category,
    registered: Vec<(Keypoint, String)>,
}

impl<'a> KeypointGroup<'a> {
    pub fn new(bound: Bound, category: &'a Category) -> Self {
        Self {
            bound,
            category,
            registered: Vec::new(),
        }
    }

    pub fn register(&mut self, keypoint: Keypoint, label: String) {
        self.registered.push((keypoint, label));
    }

    pub fn registered(&self) -> &[(Keypoint, String)] {
        &self.registered
    }

    /// Keypoints in the category's label order. Slots without a registered
    /// point are `(0, 0, 0)`.
    pub fn ordered_keypoints(&self) -> Vec<Keypoint> {
        self.category
            .keypoints
            .iter()
            .map(|label| {
                self.registered
                    .iter()
                    .find(|(_, l)| l == label)
                    .map(|(kpt, _)| *kpt)
                    .unwrap_or_else(Keypoint::missing)
            })
            .collect()
    }

    /// Build the COCO annotation for this group. Ids are filled in by the caller.
    pub fn to_annotation(&self, image_id: u64) -> Result<Annotation> {
        let bbox = self.bound.bbox()?;
        let segmentation = match &self.bound {
            Bound::Polygon(polygon) => vec![polygon.clone()],
            Bound::BBox(_) => Vec::new(),
        };
        Ok(Annotation {
            id: 0,
            image_id,
            category_id: self.category.id,
            bbox,
            segmentation,
            keypoints: self.ordered_keypoints(),
            // Counts keypoint slots, not visible keypoints.
            num_keypoints: self.category.keypoints.len(),
            area: bbox.area(),
            iscrowd: 0,
        })
    }
}

/// Keep a bounding shape only when its label names a category.
fn accept_label(
    shape: &Shape,
    categories: &CategoryHandler,
    options: &FromLabelmeOptions,
    file_name: &str,
) -> Result<bool> {
    if categories.contains_name(&shape.label) {
        return Ok(true);
    }
    if options.ignore_unspecified_categories {
        debug!("Skipping shape with unknown label: {}", shape.label);
        return Ok(false);
    }
    Err(Error::UnknownLabel {
        label: shape.label.clone(),
        file_name: file_name.to_string(),
        known: categories.names(),
    })
}

/// Group the shapes of one LabelMe annotation into per-instance groups.
pub fn group_shapes<'a>(
    annotation: &ImageAnnotation,
    categories: &'a CategoryHandler,
    options: &FromLabelmeOptions,
) -> Result<Vec<KeypointGroup<'a>>> {
    let file_name = annotation.image_file_name();

    if options.ensure_valid_shape_type {
        if let Some(shape) = annotation.shapes.iter().find(|s| s.kind().is_none()) {
            return Err(Error::InvalidShapeType {
                shape_type: shape.shape_type.clone(),
                file_name,
            });
        }
    }

    let mut polygons: Vec<(Polygon, &str)> = Vec::new();
    for shape in annotation
        .shapes
        .iter()
        .filter(|s| s.kind() == Some(ShapeKind::Polygon))
    {
        if accept_label(shape, categories, options, &file_name)? {
            polygons.push((Polygon::new(shape.points()), shape.label.as_str()));
        }
    }

    let mut rectangles: Vec<(BBox, &str)> = Vec::new();
    for shape in annotation
        .shapes
        .iter()
        .filter(|s| s.kind() == Some(ShapeKind::Rectangle))
    {
        if accept_label(shape, categories, options, &file_name)? {
            rectangles.push((BBox::from_points(&shape.points())?, shape.label.as_str()));
        }
    }

    if options.remove_redundant {
        // Boxes inside a polygon and polygons inside a box mark the same instance twice.
        rectangles.retain(|(bbox, _)| !polygons.iter().any(|(poly, _)| poly.contains_bbox(bbox)));
        polygons.retain(|(poly, _)| !rectangles.iter().any(|(bbox, _)| bbox.contains_polygon(poly)));
    }

    let mut pool = KeypointPool::new();
    for shape in annotation
        .shapes
        .iter()
        .filter(|s| s.kind() == Some(ShapeKind::Point))
    {
        match shape.points.first() {
            Some(&p) => pool.insert(&shape.label, Point::from(p)),
            None => warn!(
                "Point shape '{}' in {} has no coordinates",
                shape.label, file_name
            ),
        }
    }

    let bounds = polygons
        .into_iter()
        .map(|(poly, label)| (Bound::Polygon(poly), label))
        .chain(
            rectangles
                .into_iter()
                .map(|(bbox, label)| (Bound::BBox(bbox), label)),
        );

    let mut groups = Vec::new();
    for (bound, label) in bounds {
        let category = categories.unique_by_name(label)?;
        let mut group = KeypointGroup::new(bound, category);
        for (kpt_label, point) in pool.claim_within(&group.bound) {
            group.register(Keypoint::visible(point), kpt_label);
        }
        groups.push(group);
    }

    if options.ensure_no_unbounded_kpts && !pool.is_empty() {
        return Err(Error::UnboundedKeypoints {
            file_name,
            labels: pool.labels(),
        });
    }
    if !pool.is_empty() {
        warn!(
            "{} keypoints left unbounded in {}: {:?}",
            pool.remaining(),
            file_name,
            pool.labels()
        );
    }

    Ok(groups)
}

/// Convert LabelMe annotations into a COCO dataset with the given categories.
pub fn from_labelme(
    labelme_handler: &LabelmeAnnotationHandler,
    categories: CategoryHandler,
    options: &FromLabelmeOptions,
) -> Result<CocoDataset> {
    if categories.is_empty() {
        return Err(Error::NoCategories);
    }
    for name in categories.names() {
        categories.unique_by_name(&name)?;
    }

    let mut dataset = CocoDataset::new(FROM_LABELME_DESCRIPTION);
    dataset.licenses.append(License {
        id: DEFAULT_LICENSE_ID,
        name: options.license_name.clone(),
        url: options.license_url.clone(),
    })?;

    let pb = create_progress_bar(labelme_handler.len() as u64, "LabelMe", options.show_pbar);
    let mut output_images = Vec::new();
    let mut output_annotations = Vec::new();
    for labelme_ann in labelme_handler {
        let img_path = resolve_image_path(labelme_ann, options.img_dir.as_deref());
        check_file_exists(&img_path)?;

        let groups = group_shapes(labelme_ann, &categories, options)?;
        pb.inc(1);
        if groups.is_empty() {
            debug!("No instances in {}, dropping image", img_path.display());
            continue;
        }

        let image = Image {
            id: 0,
            file_name: file_name_of(&img_path),
            coco_url: img_path.to_string_lossy().into_owned(),
            width: labelme_ann.image_width,
            height: labelme_ann.image_height,
            date_captured: capture_time(&img_path)?,
            license_id: DEFAULT_LICENSE_ID,
            flickr_url: None,
        };
        let annotations = groups
            .iter()
            .map(|group| group.to_annotation(0))
            .collect::<Result<Vec<_>>>()?;
        output_images.push(image);
        output_annotations.push(annotations);
    }
    pb.finish_and_clear();

    dataset.categories = categories;
    for (image, annotations) in output_images.into_iter().zip(output_annotations) {
        let image_id = dataset.images.push_new(image)?;
        for mut annotation in annotations {
            annotation.image_id = image_id;
            dataset.annotations.push_new(annotation)?;
        }
    }

    info!(
        "Converted {} LabelMe annotations into {} images and {} annotations",
        labelme_handler.len(),
        dataset.images.len(),
        dataset.annotations.len()
    );
    Ok(dataset)
}

/// Convert one COCO annotation into LabelMe shapes.
fn annotation_to_shapes(
    annotation: &Annotation,
    category: &Category,
    priority: Priority,
) -> Vec<Shape> {
    let mut shapes = Vec::new();
    if priority == Priority::Seg && annotation.segmentation_within_bbox() {
        for polygon in annotation.segmentation.iter().filter(|p| p.len() >= 3) {
            shapes.push(Shape::new(&category.name, &polygon.points, ShapeKind::Polygon));
        }
    } else {
        shapes.push(Shape::new(
            &category.name,
            &annotation.bbox.to_corner_points(),
            ShapeKind::Rectangle,
        ));
    }

    for (i, kpt) in annotation.keypoints.iter().enumerate() {
        if !kpt.is_labeled() {
            continue;
        }
        match category.keypoints.get(i) {
            Some(label) => shapes.push(Shape::new(label, &[kpt.point], ShapeKind::Point)),
            None => warn!(
                "Annotation {} has keypoint index {} beyond category '{}' labels",
                annotation.id, i, category.name
            ),
        }
    }
    shapes
}

/// Convert a COCO dataset into one LabelMe annotation per image.
pub fn to_labelme(dataset: &CocoDataset, priority: Priority) -> Result<LabelmeAnnotationHandler> {
    let mut handler = LabelmeAnnotationHandler::new();
    for image in &dataset.images {
        let mut labelme_ann = ImageAnnotation::new(&image.coco_url, image.height, image.width);
        for annotation in dataset.annotations.for_image(image.id) {
            let category = dataset.categories.require(annotation.category_id)?;
            labelme_ann
                .shapes
                .extend(annotation_to_shapes(annotation, category, priority));
        }
        handler.push(labelme_ann);
    }
    Ok(handler)
}

/// Resolve LabelMe image paths against `img_dir` the same way [`from_labelme`] does.
pub fn resolve_image_path(annotation: &ImageAnnotation, img_dir: Option<&Path>) -> PathBuf {
    match img_dir {
        Some(dir) => dir.join(annotation.image_file_name()),
        None => PathBuf::from(&annotation.image_path),
    }
}
