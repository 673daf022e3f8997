use std::fs;

use coco_toolkit::config::DrawTarget;
use coco_toolkit::geometry::{BBox, Keypoint, Polygon};
use coco_toolkit::visualize::{
    draw_bbox, draw_keypoints, draw_segmentation, draw_skeleton, pad_to_max, scale_to_max,
};
use coco_toolkit::{
    CocoDataset, DrawStyle, Error, FrameSequenceSink, VideoOptions, VisualizationOptions,
};
use image::{Rgba, RgbaImage};
use tempfile::tempdir;

mod common;

use common::{image_record, sample_dataset, write_image};

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

fn canvas(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, BLACK)
}

#[test]
fn test_pad_to_max_centers_image() {
    let img = RgbaImage::from_pixel(10, 6, Rgba([255, 0, 0, 255]));
    let padded = pad_to_max(&img, (20, 10)).unwrap();
    assert_eq!(padded.dimensions(), (20, 10));
    assert_eq!(*padded.get_pixel(0, 0), BLACK);
    assert_eq!(*padded.get_pixel(5, 2), Rgba([255, 0, 0, 255]));
    assert_eq!(*padded.get_pixel(14, 7), Rgba([255, 0, 0, 255]));
    assert_eq!(*padded.get_pixel(15, 8), BLACK);

    assert!(matches!(
        pad_to_max(&img, (8, 10)),
        Err(Error::InvalidGeometry(_))
    ));
}

#[test]
fn test_scale_to_max_keeps_aspect_ratio() {
    assert_eq!(scale_to_max(&canvas(10, 5), (40, 40)).dimensions(), (40, 20));
    assert_eq!(scale_to_max(&canvas(100, 50), (20, 20)).dimensions(), (20, 10));
    assert_eq!(scale_to_max(&canvas(30, 60), (64, 48)).dimensions(), (24, 48));
}

#[test]
fn test_draw_bbox_outline() {
    let mut img = canvas(50, 50);
    draw_bbox(&mut img, &BBox::new(10.0, 10.0, 20.0, 20.0), [255, 255, 0], 1);
    assert_eq!(*img.get_pixel(10, 10), Rgba([255, 255, 0, 255]));
    assert_eq!(*img.get_pixel(10, 20), Rgba([255, 255, 0, 255]));
    assert_eq!(*img.get_pixel(20, 20), BLACK);
}

#[test]
fn test_draw_segmentation_fills_polygon() {
    let square = Polygon::from_flat(&[10.0, 10.0, 30.0, 10.0, 30.0, 30.0, 10.0, 30.0]).unwrap();

    let mut opaque = canvas(40, 40);
    draw_segmentation(&mut opaque, &[square.clone()], [0, 255, 255], false);
    assert_eq!(*opaque.get_pixel(20, 20), Rgba([0, 255, 255, 255]));
    assert_eq!(*opaque.get_pixel(35, 35), BLACK);

    let mut blended = canvas(40, 40);
    draw_segmentation(&mut blended, &[square], [0, 255, 255], true);
    let pixel = blended.get_pixel(20, 20);
    assert_eq!(pixel[0], 0);
    assert!(pixel[1] > 0 && pixel[1] < 255);

    let mut untouched = canvas(40, 40);
    let line = Polygon::from_flat(&[1.0, 1.0, 5.0, 5.0]).unwrap();
    draw_segmentation(&mut untouched, &[line], [0, 255, 255], false);
    assert_eq!(untouched, canvas(40, 40));
}

#[test]
fn test_draw_keypoints_skips_unlabeled_and_ignored() {
    let mut img = canvas(50, 50);
    let keypoints = vec![
        Keypoint::new(5.0, 5.0, 0),
        Keypoint::new(25.0, 25.0, 2),
        Keypoint::new(40.0, 40.0, 2),
    ];
    draw_keypoints(&mut img, &keypoints, 3, [255, 0, 0], &[2]);
    assert_eq!(*img.get_pixel(5, 5), BLACK);
    assert_eq!(*img.get_pixel(25, 25), Rgba([255, 0, 0, 255]));
    assert_eq!(*img.get_pixel(40, 40), BLACK);
}

#[test]
fn test_draw_skeleton_with_index_offset() {
    let keypoints = vec![Keypoint::new(5.0, 25.0, 2), Keypoint::new(45.0, 25.0, 2)];

    let mut img = canvas(50, 50);
    draw_skeleton(&mut img, &keypoints, &[[1, 2]], -1, 5, [0, 0, 255], &[]);
    assert_eq!(*img.get_pixel(25, 25), Rgba([0, 0, 255, 255]));
    assert_eq!(*img.get_pixel(25, 24), Rgba([0, 0, 255, 255]));
    assert_eq!(*img.get_pixel(25, 10), BLACK);

    let mut untouched = canvas(50, 50);
    draw_skeleton(&mut untouched, &keypoints, &[[1, 2]], 0, 5, [0, 0, 255], &[]);
    assert_eq!(untouched, canvas(50, 50));
}

#[test]
fn test_get_preview_draws_annotations() {
    let dir = tempdir().unwrap();
    let dataset = sample_dataset(dir.path());
    let preview = dataset.get_preview(10, &DrawStyle::default()).unwrap();
    assert_eq!(preview.dimensions(), (64, 48));
    // bbox edge is drawn over the segmentation
    assert_eq!(*preview.get_pixel(10, 20), Rgba([255, 255, 0, 255]));
    assert_eq!(*preview.get_pixel(15, 15), Rgba([255, 0, 0, 255]));
    assert_eq!(*preview.get_pixel(60, 5), Rgba([40, 40, 40, 255]));

    let bbox_only = DrawStyle {
        draw_order: vec![DrawTarget::Bbox],
        ..DrawStyle::default()
    };
    let preview = dataset.get_preview(10, &bbox_only).unwrap();
    assert_eq!(*preview.get_pixel(15, 15), Rgba([40, 40, 40, 255]));

    assert!(matches!(
        dataset.get_preview(99, &DrawStyle::default()),
        Err(Error::RecordNotFound { kind: "image", id: 99 })
    ));
}

#[test]
fn test_save_visualization() {
    let dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let save_dir = out.path().join("preview");
    let dataset = sample_dataset(dir.path());

    let options = VisualizationOptions {
        save_dir: save_dir.clone(),
        ..VisualizationOptions::default()
    };
    dataset.save_visualization(&options).unwrap();
    let saved = image::open(save_dir.join("a.png")).unwrap();
    assert_eq!((saved.width(), saved.height()), (64, 48));
    assert!(save_dir.join("b.png").is_file());

    assert!(matches!(
        dataset.save_visualization(&options),
        Err(Error::DirNotEmpty { .. })
    ));

    let renamed = VisualizationOptions {
        preserve_filenames: false,
        overwrite: true,
        start_idx: 1,
        show_annotations: false,
        ..options.clone()
    };
    dataset.save_visualization(&renamed).unwrap();
    let names: Vec<_> = fs::read_dir(&save_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["000000.png".to_string()]);

    let out_of_range = VisualizationOptions {
        overwrite: true,
        start_idx: 3,
        ..options
    };
    assert!(matches!(
        dataset.save_visualization(&out_of_range),
        Err(Error::InvalidRange { start: 3, end: 2, len: 2 })
    ));
}

#[test]
fn test_save_video_frames_share_dimensions() {
    let dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let mut dataset = sample_dataset(dir.path());
    write_image(&dir.path().join("tall.png"), 32, 64);
    let mut tall = image_record(20, dir.path(), "tall.png", 3);
    tall.width = 32;
    tall.height = 64;
    dataset.images.append(tall).unwrap();

    let frame_dir = out.path().join("frames");
    let options = VideoOptions {
        save_path: frame_dir.clone(),
        fps: 5,
        ..VideoOptions::default()
    };
    let mut sink = FrameSequenceSink::new(false);
    dataset.save_video(&mut sink, &options).unwrap();
    assert_eq!(sink.frames_written(), 3);

    for index in 0..3 {
        let frame = image::open(frame_dir.join(format!("frame_{:06}.png", index))).unwrap();
        assert_eq!((frame.width(), frame.height()), (64, 64));
    }
    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(frame_dir.join("sequence.json")).unwrap()).unwrap();
    assert_eq!(manifest["fps"], 5);
    assert_eq!(manifest["frames"], 3);
    assert_eq!(manifest["width"], 64);
}

#[test]
fn test_save_video_empty_dataset() {
    let out = tempdir().unwrap();
    let options = VideoOptions {
        save_path: out.path().join("frames"),
        ..VideoOptions::default()
    };
    let mut sink = FrameSequenceSink::new(false);
    assert!(matches!(
        CocoDataset::new("empty").save_video(&mut sink, &options),
        Err(Error::EmptyDataset)
    ));
}
