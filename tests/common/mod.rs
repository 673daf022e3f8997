#![allow(dead_code)]

use std::path::Path;

use coco_toolkit::coco::{Annotation, Category, Image, License};
use coco_toolkit::geometry::{BBox, Keypoint, Polygon};
use coco_toolkit::CocoDataset;

pub const CAPTURED: &str = "Mon Jan  1 00:00:00 2024";

pub fn write_image(path: &Path, width: u32, height: u32) {
    image::RgbImage::from_pixel(width, height, image::Rgb([40, 40, 40]))
        .save(path)
        .unwrap();
}

pub fn person_category(id: u64) -> Category {
    Category::new(
        id,
        "person",
        "person",
        vec!["nose".to_string(), "eye".to_string()],
        vec![[1, 2]],
    )
}

pub fn image_record(id: u64, img_dir: &Path, file_name: &str, license_id: u64) -> Image {
    Image {
        id,
        file_name: file_name.to_string(),
        coco_url: img_dir.join(file_name).to_string_lossy().into_owned(),
        width: 64,
        height: 48,
        date_captured: CAPTURED.to_string(),
        license_id,
        flickr_url: None,
    }
}

pub fn square_annotation(id: u64, image_id: u64, category_id: u64, x: f64, y: f64) -> Annotation {
    let side = 20.0;
    Annotation {
        id,
        image_id,
        category_id,
        bbox: BBox::new(x, y, side, side),
        segmentation: vec![Polygon::from_flat(&[x, y, x + side, y, x + side, y + side, x, y + side]).unwrap()],
        keypoints: vec![
            Keypoint::new(x + 5.0, y + 5.0, 2),
            Keypoint::new(x + 10.0, y + 10.0, 2),
        ],
        num_keypoints: 2,
        area: side * side,
        iscrowd: 0,
    }
}

/// Two 64x48 images on disk with one annotation each. Source ids are
/// deliberately not zero-based.
pub fn sample_dataset(img_dir: &Path) -> CocoDataset {
    let mut dataset = CocoDataset::new("sample");
    dataset.licenses.append(License {
        id: 3,
        name: "MIT License".to_string(),
        url: "https://opensource.org/licenses/MIT".to_string(),
    })
    .unwrap();
    dataset.categories.append(person_category(5)).unwrap();
    for (i, file_name) in ["a.png", "b.png"].iter().enumerate() {
        write_image(&img_dir.join(file_name), 64, 48);
        dataset
            .images
            .append(image_record(10 + i as u64, img_dir, file_name, 3))
            .unwrap();
    }
    dataset.annotations.append(square_annotation(7, 10, 5, 10.0, 10.0)).unwrap();
    dataset.annotations.append(square_annotation(8, 11, 5, 30.0, 20.0)).unwrap();
    dataset
}
