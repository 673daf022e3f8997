use std::fs;

use coco_toolkit::coco::{Category, CategoryHandler, Handler, License, LicenseHandler};
use coco_toolkit::config::{DatasetPathConfig, DatasetPathEntry, AnnotationFormat};
use coco_toolkit::conversion::{Bound, KeypointPool};
use coco_toolkit::geometry::{BBox, Keypoint, Point, Polygon};
use coco_toolkit::remap::IdMapper;
use coco_toolkit::utils::{next_dump_path, parent_dir_of, prepare_output_dir};
use coco_toolkit::Error;
use tempfile::tempdir;

mod common;

fn square(x: f64, y: f64, side: f64) -> Polygon {
    Polygon::from_flat(&[x, y, x + side, y, x + side, y + side, x, y + side]).unwrap()
}

fn license(id: u64, name: &str) -> License {
    License {
        id,
        name: name.to_string(),
        url: "https://example.com".to_string(),
    }
}

#[test]
fn test_polygon_contains_point() {
    let poly = square(0.0, 0.0, 10.0);
    assert!(poly.contains_point(&Point::new(5.0, 5.0)));
    assert!(poly.contains_point(&Point::new(0.0, 5.0)));
    assert!(poly.contains_point(&Point::new(10.0, 10.0)));
    assert!(!poly.contains_point(&Point::new(10.5, 5.0)));
    assert!(!poly.contains_point(&Point::new(-1.0, -1.0)));
}

#[test]
fn test_concave_polygon_contains_point() {
    // U shape open at the top
    let poly = Polygon::from_flat(&[0.0, 0.0, 3.0, 0.0, 3.0, 3.0, 2.0, 3.0, 2.0, 1.0, 1.0, 1.0, 1.0, 3.0, 0.0, 3.0])
        .unwrap();
    assert!(poly.contains_point(&Point::new(0.5, 2.0)));
    assert!(!poly.contains_point(&Point::new(1.5, 2.0)));
}

#[test]
fn test_polygon_and_bbox_containment() {
    let poly = square(0.0, 0.0, 100.0);
    let inner = BBox::new(10.0, 10.0, 40.0, 40.0);
    let overlapping = BBox::new(80.0, 80.0, 40.0, 40.0);
    assert!(poly.contains_bbox(&inner));
    assert!(!poly.contains_bbox(&overlapping));

    // Notch edges run through two box corners down to the box center.
    let notched = Polygon::from_flat(&[
        -20.0, -5.0, -5.0, -5.0, 5.0, 5.0, 15.0, -5.0, 30.0, -5.0, 30.0, 30.0, -20.0, 30.0,
    ])
    .unwrap();
    let notch_box = BBox::new(0.0, 0.0, 10.0, 10.0);
    assert!(notch_box.corners().iter().all(|c| notched.contains_point(c)));
    assert!(!notched.contains_bbox(&notch_box));
    assert!(notched.contains_bbox(&BBox::new(0.0, 10.0, 10.0, 10.0)));

    let outer = BBox::new(-1.0, -1.0, 102.0, 102.0);
    assert!(outer.contains_polygon(&poly));
    assert!(poly.within_bbox(&outer));
    assert!(!inner.contains_polygon(&poly));
}

#[test]
fn test_polygon_area_and_bbox() {
    let poly = Polygon::from_flat(&[0.0, 0.0, 4.0, 0.0, 0.0, 3.0]).unwrap();
    assert_eq!(poly.area(), 6.0);
    assert_eq!(poly.to_bbox().unwrap(), BBox::new(0.0, 0.0, 4.0, 3.0));
}

#[test]
fn test_polygon_from_flat_rejects_odd_length() {
    assert!(matches!(
        Polygon::from_flat(&[1.0, 2.0, 3.0]),
        Err(Error::InvalidGeometry(_))
    ));
}

#[test]
fn test_bbox_from_points_normalizes_corners() {
    let bbox = BBox::from_points(&[Point::new(50.0, 60.0), Point::new(10.0, 10.0)]).unwrap();
    assert_eq!(bbox, BBox::new(10.0, 10.0, 40.0, 50.0));
    assert_eq!(bbox.area(), 2000.0);
    assert!(bbox.contains_point(&Point::new(50.0, 60.0)));
    assert!(BBox::from_points(&[]).is_err());
}

#[test]
fn test_annotation_json_layout() {
    let ann = common::square_annotation(1, 2, 3, 0.0, 0.0);
    let value = serde_json::to_value(&ann).unwrap();
    assert_eq!(value["bbox"], serde_json::json!([0.0, 0.0, 20.0, 20.0]));
    assert_eq!(
        value["segmentation"],
        serde_json::json!([[0.0, 0.0, 20.0, 0.0, 20.0, 20.0, 0.0, 20.0]])
    );
    assert_eq!(
        value["keypoints"],
        serde_json::json!([5.0, 5.0, 2, 10.0, 10.0, 2])
    );

    let parsed: coco_toolkit::Annotation = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, ann);
}

#[test]
fn test_image_license_key() {
    let dir = tempdir().unwrap();
    let image = common::image_record(4, dir.path(), "a.png", 9);
    let value = serde_json::to_value(&image).unwrap();
    assert_eq!(value["license"], 9);
    assert!(value.get("license_id").is_none());
}

#[test]
fn test_keypoint_list_rejects_partial_triples() {
    let json = serde_json::json!({
        "id": 0, "image_id": 0, "category_id": 0, "bbox": [0, 0, 1, 1],
        "keypoints": [1.0, 2.0], "area": 1.0
    });
    assert!(serde_json::from_value::<coco_toolkit::Annotation>(json).is_err());
}

#[test]
fn test_keypoint_list_rejects_unknown_visibility() {
    for visibility in [serde_json::json!(-1), serde_json::json!(2.7), serde_json::json!(3)] {
        let json = serde_json::json!({
            "id": 0, "image_id": 0, "category_id": 0, "bbox": [0, 0, 1, 1],
            "keypoints": [1.0, 2.0, visibility], "area": 1.0
        });
        assert!(serde_json::from_value::<coco_toolkit::Annotation>(json).is_err());
    }
}

#[test]
fn test_handler_ids_follow_counter() {
    let mut handler = LicenseHandler::new();
    assert_eq!(handler.push_new(license(99, "a")).unwrap(), 0);
    handler.append(license(5, "b")).unwrap();
    assert_eq!(handler.next_id(), 6);
    assert_eq!(handler.push_new(license(0, "c")).unwrap(), 6);
    assert_eq!(handler.len(), 3);
    assert_eq!(handler.get(6).unwrap().name, "c");
}

#[test]
fn test_handler_from_records_rebuilds_counter() {
    let handler = Handler::<License>::try_from(vec![license(2, "a"), license(7, "b")]).unwrap();
    assert_eq!(handler.next_id(), 8);
    assert_eq!(Handler::<License>::new().next_id(), 0);
}

#[test]
fn test_handler_rejects_duplicate_ids() {
    assert!(matches!(
        LicenseHandler::try_from(vec![license(7, "a"), license(7, "b")]),
        Err(Error::DuplicateId { kind: "license", id: 7 })
    ));

    let mut handler = LicenseHandler::new();
    handler.append(license(7, "a")).unwrap();
    assert!(matches!(
        handler.append(license(7, "b")),
        Err(Error::DuplicateId { kind: "license", id: 7 })
    ));
    assert_eq!(handler.len(), 1);

    let json = r#"[{"id":3,"name":"a","url":"u"},{"id":3,"name":"b","url":"u"}]"#;
    assert!(serde_json::from_str::<LicenseHandler>(json).is_err());
}

#[test]
fn test_handler_rejects_exhausted_ids() {
    let json = r#"[{"id":18446744073709551615,"name":"a","url":"u"}]"#;
    assert!(serde_json::from_str::<LicenseHandler>(json).is_err());

    let mut handler = LicenseHandler::new();
    assert!(matches!(
        handler.append(license(u64::MAX, "a")),
        Err(Error::IdOverflow { kind: "license" })
    ));
    assert!(handler.is_empty());

    handler.append(license(u64::MAX - 1, "b")).unwrap();
    assert!(matches!(
        handler.push_new(license(0, "c")),
        Err(Error::IdOverflow { kind: "license" })
    ));
    assert_eq!(handler.len(), 1);
}

#[test]
fn test_handler_find_identical_ignores_id() {
    let handler = LicenseHandler::try_from(vec![license(2, "a"), license(7, "b")]).unwrap();
    assert_eq!(handler.find_identical(&license(100, "b")).unwrap().id, 7);
    assert!(handler.find_identical(&license(7, "c")).is_none());
    assert!(matches!(
        handler.require(3),
        Err(Error::RecordNotFound { kind: "license", id: 3 })
    ));
}

#[test]
fn test_category_lookup_by_name() {
    let mut categories = CategoryHandler::new();
    categories.append(common::person_category(0)).unwrap();
    categories.append(Category::new(1, "car", "vehicle", vec![], vec![])).unwrap();
    assert_eq!(categories.unique_by_name("car").unwrap().id, 1);
    assert!(matches!(
        categories.unique_by_name("dog"),
        Err(Error::CategoryNotFound { .. })
    ));

    categories.append(Category::new(2, "car", "toy", vec![], vec![])).unwrap();
    assert!(matches!(
        categories.unique_by_name("car"),
        Err(Error::AmbiguousCategory { count: 2, .. })
    ));
}

#[test]
fn test_id_mapper_distinguishes_zero_from_missing() {
    let mut mapper = IdMapper::new();
    mapper.add(0, 5, 0);
    mapper.add(1, 5, 3);
    assert_eq!(mapper.get_new_id(0, 5), Some(0));
    assert_eq!(mapper.get_new_id(1, 5), Some(3));
    assert_eq!(mapper.get_new_id(0, 6), None);
    assert_eq!(mapper.get_new_id(2, 5), None);
    assert_eq!(mapper.len(), 2);
}

#[test]
fn test_keypoint_pool_claims_first_point_per_label() {
    let mut pool = KeypointPool::new();
    pool.insert("nose", Point::new(100.0, 100.0));
    pool.insert("nose", Point::new(5.0, 5.0));
    pool.insert("eye", Point::new(6.0, 6.0));
    pool.insert("nose", Point::new(7.0, 7.0));

    let bound = Bound::BBox(BBox::new(0.0, 0.0, 10.0, 10.0));
    let claimed = pool.claim_within(&bound);
    assert_eq!(
        claimed,
        vec![
            ("nose".to_string(), Point::new(5.0, 5.0)),
            ("eye".to_string(), Point::new(6.0, 6.0)),
        ]
    );
    assert_eq!(pool.labels(), vec!["nose".to_string()]);
    assert_eq!(pool.remaining(), 2);

    pool.claim_within(&bound);
    assert_eq!(pool.remaining(), 1);
    assert!(pool.claim_within(&bound).is_empty());
    assert!(!pool.is_empty());
}

#[test]
fn test_keypoint_missing_is_unlabeled() {
    assert_eq!(Keypoint::missing(), Keypoint::new(0.0, 0.0, 0));
    assert!(!Keypoint::missing().is_labeled());
    assert!(Keypoint::visible(Point::new(1.0, 1.0)).is_labeled());
}

#[test]
fn test_prepare_output_dir() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out");
    prepare_output_dir(&out, false).unwrap();
    assert!(out.is_dir());

    fs::write(out.join("stale.txt"), "x").unwrap();
    assert!(matches!(
        prepare_output_dir(&out, false),
        Err(Error::DirNotEmpty { .. })
    ));
    prepare_output_dir(&out, true).unwrap();
    assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
}

#[test]
fn test_next_dump_path_skips_used_names() {
    let dir = tempdir().unwrap();
    assert_eq!(next_dump_path(dir.path(), "png"), dir.path().join("000000.png"));
    fs::write(dir.path().join("000000.png"), "x").unwrap();
    assert_eq!(next_dump_path(dir.path(), ".png"), dir.path().join("000001.png"));
}

#[test]
fn test_parent_dir_of_bare_file_name() {
    assert_eq!(parent_dir_of(std::path::Path::new("config.json")), std::path::PathBuf::from("."));
    assert_eq!(
        parent_dir_of(std::path::Path::new("a/b/config.json")),
        std::path::PathBuf::from("a/b")
    );
}

#[test]
fn test_dataset_path_config_resolves_against_config_dir() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("datasets.json");
    let config = DatasetPathConfig::new(vec![DatasetPathEntry {
        dataset_dir: "first".into(),
        img_dir: "images".into(),
        ann_path: "ann.json".into(),
        ann_format: AnnotationFormat::Coco,
    }]);
    fs::write(&config_path, serde_json::to_string(&config).unwrap()).unwrap();

    let loaded = DatasetPathConfig::load(&config_path).unwrap();
    let paths = loaded.get_paths();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].dataset_dir, dir.path().join("first"));
    assert_eq!(paths[0].img_dir, dir.path().join("first/images"));
    assert_eq!(paths[0].ann_path, dir.path().join("first/ann.json"));
}
