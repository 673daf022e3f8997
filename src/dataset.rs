use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::coco::{
    AnnotationHandler, CategoryHandler, ImageHandler, Info, LicenseHandler,
};
use crate::config::{DatasetPathConfig, FromLabelmeOptions, Priority};
use crate::conversion;
use crate::error::{Error, Result};
use crate::remap;
use crate::types::LabelmeAnnotationHandler;
use crate::utils::{
    check_can_write, check_dir_exists, check_file_exists, create_progress_bar, extension_of,
    next_dump_path, parent_dir_of, prepare_output_dir, read_json,
};

const TOP_LEVEL_KEYS: [&str; 5] = ["info", "licenses", "images", "annotations", "categories"];

/// A complete COCO dataset: info plus one handler per record kind.
///
/// `Clone` is a deep copy; no record is shared between two datasets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoDataset {
    pub info: Info,
    pub licenses: LicenseHandler,
    pub images: ImageHandler,
    pub annotations: AnnotationHandler,
    pub categories: CategoryHandler,
}

impl CocoDataset {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            info: Info::new(description),
            licenses: LicenseHandler::new(),
            images: ImageHandler::new(),
            annotations: AnnotationHandler::new(),
            categories: CategoryHandler::new(),
        }
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        for key in TOP_LEVEL_KEYS {
            if value.get(key).is_none() {
                return Err(Error::MissingKey { key });
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Write the dataset as pretty-printed JSON.
    pub fn save_to_path(&self, save_path: &Path, overwrite: bool) -> Result<()> {
        check_can_write(save_path, overwrite)?;
        let file = File::create(save_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!("Wrote {}", save_path.display());
        Ok(())
    }

    /// Load a COCO JSON file. With `img_dir`, which must exist, image paths
    /// are rebuilt as `{img_dir}/{file_name}`; with `check_paths`, every
    /// image must exist too.
    pub fn load_from_path(json_path: &Path, img_dir: Option<&Path>, check_paths: bool) -> Result<Self> {
        let value: serde_json::Value = read_json(json_path)?;
        let mut dataset = Self::from_json_value(value)?;
        if let Some(img_dir) = img_dir {
            check_dir_exists(img_dir)?;
            dataset.update_img_dir(img_dir, false)?;
        }
        if check_paths {
            for image in &dataset.images {
                check_file_exists(Path::new(&image.coco_url))?;
            }
        }
        debug!(
            "Loaded {} images and {} annotations from {}",
            dataset.images.len(),
            dataset.annotations.len(),
            json_path.display()
        );
        Ok(dataset)
    }

    /// Point every image at `{new_img_dir}/{file_name}`.
    pub fn update_img_dir(&mut self, new_img_dir: &Path, check_paths: bool) -> Result<()> {
        if check_paths {
            check_dir_exists(new_img_dir)?;
        }
        for image in &mut self.images {
            let path = new_img_dir.join(&image.file_name);
            if check_paths {
                check_file_exists(&path)?;
            }
            image.coco_url = path.to_string_lossy().into_owned();
        }
        Ok(())
    }

    /// Copy every image into `dst_img_dir`.
    ///
    /// With `preserve_filenames` the original names are kept and must be
    /// unique; otherwise images get sequential names. With
    /// `update_img_paths` the dataset is updated to point at the copies.
    pub fn combine_img_dirs(
        &mut self,
        dst_img_dir: &Path,
        preserve_filenames: bool,
        update_img_paths: bool,
        overwrite: bool,
        show_pbar: bool,
    ) -> Result<()> {
        let mut used_img_dirs: Vec<PathBuf> = Vec::new();
        for image in &self.images {
            let used_img_dir = parent_dir_of(Path::new(&image.coco_url));
            if !used_img_dirs.contains(&used_img_dir) {
                check_dir_exists(&used_img_dir)?;
                used_img_dirs.push(used_img_dir);
            }
        }
        if used_img_dirs.is_empty() {
            return Err(Error::EmptyDataset);
        }

        prepare_output_dir(dst_img_dir, overwrite)?;

        let pb = create_progress_bar(self.images.len() as u64, "Copy", show_pbar);
        for image in &mut self.images {
            let src_path = PathBuf::from(&image.coco_url);
            let dst_path = if preserve_filenames {
                let dst_path = dst_img_dir.join(&image.file_name);
                if dst_path.exists() {
                    return Err(Error::DuplicateFilename {
                        file_name: image.file_name.clone(),
                        dir: dst_img_dir.to_path_buf(),
                    });
                }
                dst_path
            } else {
                next_dump_path(dst_img_dir, &extension_of(&src_path))
            };
            fs::copy(&src_path, &dst_path)?;
            if update_img_paths {
                image.coco_url = dst_path.to_string_lossy().into_owned();
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
        info!(
            "Copied {} images into {}",
            self.images.len(),
            dst_img_dir.display()
        );
        Ok(())
    }

    pub fn to_labelme(&self, priority: Priority) -> Result<LabelmeAnnotationHandler> {
        conversion::to_labelme(self, priority)
    }

    pub fn from_labelme(
        labelme_handler: &LabelmeAnnotationHandler,
        categories: CategoryHandler,
        options: &FromLabelmeOptions,
    ) -> Result<Self> {
        conversion::from_labelme(labelme_handler, categories, options)
    }

    /// Merge `datasets` into a new dataset.
    ///
    /// When `img_dirs` is given it must hold one directory per dataset; image
    /// paths of each dataset are rebuilt inside its directory and checked
    /// before merging. The input datasets are left untouched.
    pub fn combine(datasets: &[CocoDataset], img_dirs: Option<&[PathBuf]>) -> Result<Self> {
        let Some(img_dirs) = img_dirs else {
            return remap::combine(datasets);
        };
        if img_dirs.len() != datasets.len() {
            return Err(Error::LengthMismatch {
                what: "img_dirs",
                expected: datasets.len(),
                actual: img_dirs.len(),
            });
        }
        let relocated = datasets
            .iter()
            .zip(img_dirs)
            .map(|(dataset, img_dir)| {
                let mut dataset = dataset.copy();
                dataset.update_img_dir(img_dir, true)?;
                Ok(dataset)
            })
            .collect::<Result<Vec<_>>>()?;
        remap::combine(&relocated)
    }

    /// Merge the datasets listed in a [`DatasetPathConfig`] file.
    pub fn combine_from_config(config_path: &Path) -> Result<Self> {
        let config = DatasetPathConfig::load(config_path)?;
        let datasets = config
            .get_paths()
            .iter()
            .map(|paths| Self::load_from_path(&paths.ann_path, Some(&paths.img_dir), true))
            .collect::<Result<Vec<_>>>()?;
        info!(
            "Loaded {} datasets from {}",
            datasets.len(),
            config_path.display()
        );
        Self::combine(&datasets, None)
    }
}
