//! COCO format data structures
//!
//! Records mirror the COCO annotation schema. Every record kind lives in a
//! [`Handler`], an ordered collection that owns the id counter for its kind.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::geometry::{keypoint_list, BBox, Keypoint, Polygon};

/// COCO dataset information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub year: u32,
    #[serde(default)]
    pub contributor: String,
    #[serde(default)]
    pub date_created: String,
}

impl Info {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }
}

impl Default for Info {
    fn default() -> Self {
        let today = chrono::Local::now().date_naive();
        Self {
            description: String::new(),
            url: String::new(),
            version: "1.0".to_string(),
            year: chrono::Datelike::year(&today) as u32,
            contributor: String::new(),
            date_created: today.format("%Y/%m/%d").to_string(),
        }
    }
}

/// COCO license information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub id: u64,
    pub name: String,
    pub url: String,
}

/// COCO image information. `coco_url` holds the local image path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: u64,
    pub file_name: String,
    #[serde(default)]
    pub coco_url: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub date_captured: String,
    #[serde(rename = "license")]
    pub license_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flickr_url: Option<String>,
}

/// COCO category information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub supercategory: String,
    /// Keypoint labels. The position of a label defines the slot it occupies
    /// in every annotation of this category.
    #[serde(default)]
    pub keypoints: Vec<String>,
    /// Pairs of keypoint indices, 1-based as in the COCO person category.
    #[serde(default)]
    pub skeleton: Vec<[usize; 2]>,
}

impl Category {
    pub fn new(
        id: u64,
        name: impl Into<String>,
        supercategory: impl Into<String>,
        keypoints: Vec<String>,
        skeleton: Vec<[usize; 2]>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            supercategory: supercategory.into(),
            keypoints,
            skeleton,
        }
    }
}

/// COCO annotation information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    pub bbox: BBox,
    #[serde(default)]
    pub segmentation: Vec<Polygon>,
    #[serde(default, with = "keypoint_list")]
    pub keypoints: Vec<Keypoint>,
    #[serde(default)]
    pub num_keypoints: usize,
    pub area: f64,
    #[serde(default)]
    pub iscrowd: u8,
}

impl Annotation {
    /// True when every segmentation polygon lies inside the bounding box.
    /// An empty segmentation is never considered within.
    pub fn segmentation_within_bbox(&self) -> bool {
        !self.segmentation.is_empty()
            && self
                .segmentation
                .iter()
                .all(|polygon| polygon.within_bbox(&self.bbox))
    }
}

/// Common behaviour of the record kinds stored in a [`Handler`].
pub trait Record: Clone {
    /// Name used in error messages.
    const KIND: &'static str;

    fn id(&self) -> u64;

    fn set_id(&mut self, id: u64);

    /// Field equality ignoring the record's own id.
    fn same_identity(&self, other: &Self) -> bool;
}

impl Record for License {
    const KIND: &'static str = "license";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.name == other.name && self.url == other.url
    }
}

impl Record for Image {
    const KIND: &'static str = "image";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.file_name == other.file_name
            && self.coco_url == other.coco_url
            && self.width == other.width
            && self.height == other.height
            && self.date_captured == other.date_captured
            && self.license_id == other.license_id
            && self.flickr_url == other.flickr_url
    }
}

impl Record for Category {
    const KIND: &'static str = "category";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.name == other.name
            && self.supercategory == other.supercategory
            && self.keypoints == other.keypoints
            && self.skeleton == other.skeleton
    }
}

impl Record for Annotation {
    const KIND: &'static str = "annotation";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.image_id == other.image_id
            && self.category_id == other.category_id
            && self.bbox == other.bbox
            && self.segmentation == other.segmentation
            && self.keypoints == other.keypoints
            && self.num_keypoints == other.num_keypoints
            && self.area == other.area
            && self.iscrowd == other.iscrowd
    }
}

/// Ordered, id-indexed collection of records.
///
/// The handler owns the counter used for new ids. It is rebuilt as
/// `max(id) + 1` when a handler is created from existing records. Ids are
/// unique within a handler and never `u64::MAX`, so the counter cannot wrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<T>", into = "Vec<T>")]
pub struct Handler<T: Record> {
    records: Vec<T>,
    next_id: u64,
}

pub type LicenseHandler = Handler<License>;
pub type ImageHandler = Handler<Image>;
pub type CategoryHandler = Handler<Category>;
pub type AnnotationHandler = Handler<Annotation>;

impl<T: Record> Default for Handler<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            next_id: 0,
        }
    }
}

/// The counter value that follows `id`.
fn id_after<T: Record>(id: u64) -> Result<u64> {
    id.checked_add(1).ok_or(Error::IdOverflow { kind: T::KIND })
}

impl<T: Record> TryFrom<Vec<T>> for Handler<T> {
    type Error = Error;

    fn try_from(records: Vec<T>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(records.len());
        let mut next_id = 0;
        for record in &records {
            let id = record.id();
            if !seen.insert(id) {
                return Err(Error::DuplicateId { kind: T::KIND, id });
            }
            next_id = next_id.max(id_after::<T>(id)?);
        }
        Ok(Self { records, next_id })
    }
}

impl<T: Record> From<Handler<T>> for Vec<T> {
    fn from(handler: Handler<T>) -> Self {
        handler.records
    }
}

impl<T: Record> Handler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next sequential id to `record`, store it and return the id.
    pub fn push_new(&mut self, mut record: T) -> Result<u64> {
        let id = self.next_id;
        let next_id = id_after::<T>(id)?;
        record.set_id(id);
        self.records.push(record);
        self.next_id = next_id;
        Ok(id)
    }

    /// Store `record` keeping its id, which must not be taken yet.
    pub fn append(&mut self, record: T) -> Result<()> {
        let id = record.id();
        if self.get(id).is_some() {
            return Err(Error::DuplicateId { kind: T::KIND, id });
        }
        self.next_id = self.next_id.max(id_after::<T>(id)?);
        self.records.push(record);
        Ok(())
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.records.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.records
    }

    pub fn get(&self, id: u64) -> Option<&T> {
        self.records.iter().find(|r| r.id() == id)
    }

    /// Like [`Handler::get`] but a miss is an error.
    pub fn require(&self, id: u64) -> Result<&T> {
        self.get(id).ok_or(Error::RecordNotFound { kind: T::KIND, id })
    }

    /// First record equal to `record` when ids are ignored.
    pub fn find_identical(&self, record: &T) -> Option<&T> {
        self.records.iter().find(|r| r.same_identity(record))
    }
}

impl<'a, T: Record> IntoIterator for &'a Handler<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl<'a, T: Record> IntoIterator for &'a mut Handler<T> {
    type Item = &'a mut T;
    type IntoIter = std::slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter_mut()
    }
}

impl Handler<Annotation> {
    /// Annotations belonging to `image_id`, in insertion order.
    pub fn for_image(&self, image_id: u64) -> impl Iterator<Item = &Annotation> + '_ {
        self.records.iter().filter(move |a| a.image_id == image_id)
    }
}

impl Handler<Category> {
    pub fn names(&self) -> Vec<String> {
        self.records.iter().map(|c| c.name.clone()).collect()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.records.iter().any(|c| c.name == name)
    }

    /// The single category called `name`.
    pub fn unique_by_name(&self, name: &str) -> Result<&Category> {
        let mut matches = self.records.iter().filter(|c| c.name == name);
        match (matches.next(), matches.count()) {
            (Some(category), 0) => Ok(category),
            (Some(_), extra) => Err(Error::AmbiguousCategory {
                name: name.to_string(),
                count: extra + 1,
            }),
            (None, _) => Err(Error::CategoryNotFound {
                name: name.to_string(),
            }),
        }
    }
}
