//! Merging of independently numbered COCO datasets into one id space
//!
//! Licenses, images and categories are deduplicated by identity (all fields
//! except the id). Annotations are always copied. Every source id is mapped
//! to its destination id per source dataset, and foreign keys are rewritten
//! through those maps.
//!
//! Deduplication is a linear scan of the destination records, so merging is
//! quadratic in the number of records of each kind.

use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;

use crate::coco::{Handler, Record};
use crate::dataset::CocoDataset;
use crate::error::{Error, Result};
use crate::utils::check_file_exists;

/// Description given to the [`crate::coco::Info`] of a merged dataset
pub const COMBINED_DESCRIPTION: &str = "A combination of many COCO datasets";

/// Maps `(source dataset index, old id)` to a destination id for one record kind.
#[derive(Debug, Clone, Default)]
pub struct IdMapper {
    map: HashMap<(usize, u64), u64>,
}

impl IdMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, unique_key: usize, old_id: u64, new_id: u64) {
        self.map.insert((unique_key, old_id), new_id);
    }

    /// `None` when no mapping was recorded, which is distinct from a
    /// mapping to id 0.
    pub fn get_new_id(&self, unique_key: usize, old_id: u64) -> Option<u64> {
        self.map.get(&(unique_key, old_id)).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// One [`IdMapper`] per record kind that other records refer to.
#[derive(Debug, Clone, Default)]
pub struct MapperHandler {
    pub license_mapper: IdMapper,
    pub image_mapper: IdMapper,
    pub category_mapper: IdMapper,
}

fn resolve(mapper: &IdMapper, kind: &'static str, dataset_index: usize, old_id: u64) -> Result<u64> {
    mapper
        .get_new_id(dataset_index, old_id)
        .ok_or(Error::MissingIdMapping {
            kind,
            dataset_index,
            old_id,
        })
}

/// Add `record` to `dst` unless an identical record is already there, and
/// record where the source id ended up. A source id seen twice in one
/// dataset is an error, since its references would be ambiguous.
fn merge_unique<T: Record>(
    dst: &mut Handler<T>,
    mapper: &mut IdMapper,
    dataset_index: usize,
    old_id: u64,
    record: T,
) -> Result<u64> {
    if mapper.get_new_id(dataset_index, old_id).is_some() {
        return Err(Error::DuplicateId {
            kind: T::KIND,
            id: old_id,
        });
    }
    let new_id = match dst.find_identical(&record) {
        Some(existing) => existing.id(),
        None => dst.push_new(record)?,
    };
    mapper.add(dataset_index, old_id, new_id);
    Ok(new_id)
}

/// Merge `datasets` in order. Image paths must already point at existing files.
pub fn combine(datasets: &[CocoDataset]) -> Result<CocoDataset> {
    let mut result = CocoDataset::new(COMBINED_DESCRIPTION);
    let mut maps = MapperHandler::default();

    for (i, dataset) in datasets.iter().enumerate() {
        for license in &dataset.licenses {
            merge_unique(
                &mut result.licenses,
                &mut maps.license_mapper,
                i,
                license.id,
                license.clone(),
            )?;
        }

        for image in &dataset.images {
            check_file_exists(Path::new(&image.coco_url))?;
            let mut new_image = image.clone();
            new_image.license_id = resolve(&maps.license_mapper, "license", i, image.license_id)?;
            merge_unique(
                &mut result.images,
                &mut maps.image_mapper,
                i,
                image.id,
                new_image,
            )?;
        }

        for category in &dataset.categories {
            merge_unique(
                &mut result.categories,
                &mut maps.category_mapper,
                i,
                category.id,
                category.clone(),
            )?;
        }

        for annotation in &dataset.annotations {
            let mut new_annotation = annotation.clone();
            new_annotation.image_id = resolve(&maps.image_mapper, "image", i, annotation.image_id)?;
            new_annotation.category_id =
                resolve(&maps.category_mapper, "category", i, annotation.category_id)?;
            result.annotations.push_new(new_annotation)?;
        }

        debug!(
            "Merged dataset {}: {} licenses, {} images, {} categories, {} annotations",
            i,
            dataset.licenses.len(),
            dataset.images.len(),
            dataset.categories.len(),
            dataset.annotations.len()
        );
    }

    info!(
        "Combined {} datasets into {} licenses, {} images, {} categories, {} annotations",
        datasets.len(),
        result.licenses.len(),
        result.images.len(),
        result.categories.len(),
        result.annotations.len()
    );
    Ok(result)
}
