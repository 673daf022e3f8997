//! Rendering of COCO annotations onto dataset images
//!
//! Drawing works on RGBA buffers so segmentation can be blended. Images are
//! converted to RGB when saved, which keeps JPEG output possible.

use image::{imageops, DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_polygon_mut, Blend,
};
use imageproc::point::Point as PixelPoint;
use imageproc::rect::Rect;
use log::{debug, info};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::coco::Image;
use crate::config::DrawTarget;
use crate::dataset::CocoDataset;
use crate::error::{Error, Result};
use crate::geometry::{BBox, Keypoint, Polygon};
use crate::utils::{
    check_can_write, create_progress_bar, extension_of, next_dump_path, prepare_output_dir,
};

/// Colours are RGB.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawStyle {
    pub draw_order: Vec<DrawTarget>,
    pub bbox_color: [u8; 3],
    pub bbox_thickness: u32,
    pub seg_color: [u8; 3],
    pub seg_transparent: bool,
    pub kpt_radius: i32,
    pub kpt_color: [u8; 3],
    /// Keypoint indices never drawn, in addition to unlabeled ones
    pub ignore_kpt_idx: Vec<usize>,
    /// Added to skeleton indices; COCO skeletons are 1-based, so use -1 for them
    pub kpt_idx_offset: i64,
    pub skeleton_thickness: u32,
    pub skeleton_color: [u8; 3],
}

impl Default for DrawStyle {
    fn default() -> Self {
        Self {
            draw_order: DrawTarget::default_order(),
            bbox_color: [255, 255, 0],
            bbox_thickness: 2,
            seg_color: [0, 255, 255],
            seg_transparent: true,
            kpt_radius: 4,
            kpt_color: [255, 0, 0],
            ignore_kpt_idx: Vec::new(),
            kpt_idx_offset: 0,
            skeleton_thickness: 5,
            skeleton_color: [0, 0, 255],
        }
    }
}

fn rgba([r, g, b]: [u8; 3], alpha: u8) -> Rgba<u8> {
    Rgba([r, g, b, alpha])
}

pub fn draw_bbox(img: &mut RgbaImage, bbox: &BBox, color: [u8; 3], thickness: u32) {
    let color = rgba(color, 255);
    let x = bbox.x.round() as i32;
    let y = bbox.y.round() as i32;
    let width = bbox.width.round().max(0.0) as u32;
    let height = bbox.height.round().max(0.0) as u32;
    for t in 0..thickness.max(1) {
        let rect = Rect::at(x - t as i32, y - t as i32)
            .of_size((width + 2 * t).max(1), (height + 2 * t).max(1));
        draw_hollow_rect_mut(img, rect, color);
    }
}

/// Polygon vertices in pixel space with consecutive duplicates and the
/// closing vertex removed; `None` when fewer than three remain.
fn pixel_polygon(polygon: &Polygon) -> Option<Vec<PixelPoint<i32>>> {
    let mut points: Vec<PixelPoint<i32>> = Vec::with_capacity(polygon.len());
    for p in &polygon.points {
        let point = PixelPoint::new(p.x.round() as i32, p.y.round() as i32);
        if points.last() != Some(&point) {
            points.push(point);
        }
    }
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    (points.len() >= 3).then_some(points)
}

pub fn draw_segmentation(
    img: &mut RgbaImage,
    segmentation: &[Polygon],
    color: [u8; 3],
    transparent: bool,
) {
    let polygons: Vec<_> = segmentation.iter().filter_map(pixel_polygon).collect();
    if polygons.is_empty() {
        return;
    }
    if transparent {
        let mut canvas = Blend(img.clone());
        for points in &polygons {
            draw_polygon_mut(&mut canvas, points, rgba(color, 128));
        }
        *img = canvas.0;
    } else {
        for points in &polygons {
            draw_polygon_mut(img, points, rgba(color, 255));
        }
    }
}

pub fn draw_keypoints(
    img: &mut RgbaImage,
    keypoints: &[Keypoint],
    radius: i32,
    color: [u8; 3],
    ignore_kpt_idx: &[usize],
) {
    let color = rgba(color, 255);
    for (i, kpt) in keypoints.iter().enumerate() {
        if !kpt.is_labeled() || ignore_kpt_idx.contains(&i) {
            continue;
        }
        let center = (kpt.point.x.round() as i32, kpt.point.y.round() as i32);
        draw_filled_circle_mut(img, center, radius, color);
    }
}

fn draw_thick_line(
    img: &mut RgbaImage,
    start: (f32, f32),
    end: (f32, f32),
    thickness: u32,
    color: Rgba<u8>,
) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let len = (dx * dx + dy * dy).sqrt();
    if thickness <= 1 || len == 0.0 {
        draw_line_segment_mut(img, start, end, color);
        return;
    }
    let (nx, ny) = (-dy / len, dx / len);
    let steps = thickness * 2;
    for s in 0..=steps {
        let offset = -(thickness as f32) / 2.0 + s as f32 * thickness as f32 / steps as f32;
        draw_line_segment_mut(
            img,
            (start.0 + nx * offset, start.1 + ny * offset),
            (end.0 + nx * offset, end.1 + ny * offset),
            color,
        );
    }
}

fn skeleton_endpoint<'a>(
    keypoints: &'a [Keypoint],
    index: usize,
    index_offset: i64,
    ignore_kpt_idx: &[usize],
) -> Option<&'a Keypoint> {
    let i = usize::try_from(index as i64 + index_offset).ok()?;
    let kpt = keypoints.get(i)?;
    (kpt.is_labeled() && !ignore_kpt_idx.contains(&i)).then_some(kpt)
}

pub fn draw_skeleton(
    img: &mut RgbaImage,
    keypoints: &[Keypoint],
    skeleton: &[[usize; 2]],
    index_offset: i64,
    thickness: u32,
    color: [u8; 3],
    ignore_kpt_idx: &[usize],
) {
    let color = rgba(color, 255);
    for [a, b] in skeleton {
        let start = skeleton_endpoint(keypoints, *a, index_offset, ignore_kpt_idx);
        let end = skeleton_endpoint(keypoints, *b, index_offset, ignore_kpt_idx);
        if let (Some(start), Some(end)) = (start, end) {
            draw_thick_line(
                img,
                (start.point.x as f32, start.point.y as f32),
                (end.point.x as f32, end.point.y as f32),
                thickness,
                color,
            );
        }
    }
}

/// Scale `img` by one factor so it fits inside `(target_w, target_h)` while
/// touching at least one side.
pub fn scale_to_max(img: &RgbaImage, (target_w, target_h): (u32, u32)) -> RgbaImage {
    let (img_w, img_h) = img.dimensions();
    let ratio = (target_w as f64 / img_w as f64).min(target_h as f64 / img_h as f64);
    let fit_w = ((img_w as f64 * ratio).round() as u32).clamp(1, target_w.max(1));
    let fit_h = ((img_h as f64 * ratio).round() as u32).clamp(1, target_h.max(1));
    imageops::resize(img, fit_w, fit_h, imageops::FilterType::Triangle)
}

/// Center `img` on a black canvas of `(target_w, target_h)`.
pub fn pad_to_max(img: &RgbaImage, (target_w, target_h): (u32, u32)) -> Result<RgbaImage> {
    let (img_w, img_h) = img.dimensions();
    if img_w > target_w || img_h > target_h {
        return Err(Error::InvalidGeometry(format!(
            "image of {}x{} doesn't fit inside {}x{}",
            img_w, img_h, target_w, target_h
        )));
    }
    let mut canvas = RgbaImage::from_pixel(target_w, target_h, Rgba([0, 0, 0, 255]));
    let dx = (target_w - img_w) / 2;
    let dy = (target_h - img_h) / 2;
    imageops::replace(&mut canvas, img, dx as i64, dy as i64);
    Ok(canvas)
}

fn save_rgb(img: RgbaImage, path: &Path) -> Result<()> {
    DynamicImage::ImageRgba8(img).to_rgb8().save(path)?;
    Ok(())
}

/// Receives rendered frames one by one.
pub trait FrameSink {
    fn open(&mut self, path: &Path, dims: (u32, u32), fps: u32) -> Result<()>;
    fn write(&mut self, frame: &RgbaImage) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct SequenceManifest {
    width: u32,
    height: u32,
    fps: u32,
    frames: usize,
    pattern: &'static str,
}

const FRAME_PATTERN: &str = "frame_%06d.png";

/// Writes frames as numbered PNG files plus a `sequence.json` manifest, ready
/// to be encoded by an external tool.
#[derive(Debug, Default)]
pub struct FrameSequenceSink {
    overwrite: bool,
    dir: Option<PathBuf>,
    dims: (u32, u32),
    fps: u32,
    frames: usize,
}

impl FrameSequenceSink {
    pub fn new(overwrite: bool) -> Self {
        Self {
            overwrite,
            ..Self::default()
        }
    }

    pub fn frames_written(&self) -> usize {
        self.frames
    }

    fn dir(&self) -> Result<&Path> {
        self.dir.as_deref().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "frame sink is not open",
            ))
        })
    }
}

impl FrameSink for FrameSequenceSink {
    fn open(&mut self, path: &Path, dims: (u32, u32), fps: u32) -> Result<()> {
        self.dir = Some(prepare_output_dir(path, self.overwrite)?);
        self.dims = dims;
        self.fps = fps;
        self.frames = 0;
        Ok(())
    }

    fn write(&mut self, frame: &RgbaImage) -> Result<()> {
        if frame.dimensions() != self.dims {
            return Err(Error::InvalidGeometry(format!(
                "frame of {:?} does not match sink dimensions {:?}",
                frame.dimensions(),
                self.dims
            )));
        }
        let path = self.dir()?.join(format!("frame_{:06}.png", self.frames));
        save_rgb(frame.clone(), &path)?;
        self.frames += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let manifest = SequenceManifest {
            width: self.dims.0,
            height: self.dims.1,
            fps: self.fps,
            frames: self.frames,
            pattern: FRAME_PATTERN,
        };
        let path = self.dir()?.join("sequence.json");
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, &manifest)?;
        writer.flush()?;
        info!("Wrote {} frames to {}", self.frames, self.dir()?.display());
        self.dir = None;
        Ok(())
    }
}

/// Options for [`CocoDataset::save_visualization`]
#[derive(Debug, Clone)]
pub struct VisualizationOptions {
    pub save_dir: PathBuf,
    pub preserve_filenames: bool,
    pub show_annotations: bool,
    pub overwrite: bool,
    pub start_idx: usize,
    pub end_idx: Option<usize>,
    pub style: DrawStyle,
    pub show_pbar: bool,
}

impl Default for VisualizationOptions {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("vis_preview"),
            preserve_filenames: true,
            show_annotations: true,
            overwrite: false,
            start_idx: 0,
            end_idx: None,
            style: DrawStyle::default(),
            show_pbar: false,
        }
    }
}

/// Options for [`CocoDataset::save_video`]
#[derive(Debug, Clone)]
pub struct VideoOptions {
    pub save_path: PathBuf,
    pub fps: u32,
    pub rescale_before_pad: bool,
    pub show_annotations: bool,
    pub overwrite: bool,
    pub start_idx: usize,
    pub end_idx: Option<usize>,
    pub style: DrawStyle,
    pub show_pbar: bool,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            save_path: PathBuf::from("viz"),
            fps: 20,
            rescale_before_pad: true,
            show_annotations: true,
            overwrite: false,
            start_idx: 0,
            end_idx: None,
            style: DrawStyle::default(),
            show_pbar: false,
        }
    }
}

impl CocoDataset {
    /// Draw one annotation onto `img` in the style's draw order.
    pub fn draw_annotation(&self, img: &mut RgbaImage, ann_id: u64, style: &DrawStyle) -> Result<()> {
        let annotation = self.annotations.require(ann_id)?;
        let category = self.categories.require(annotation.category_id)?;
        for target in &style.draw_order {
            match target {
                DrawTarget::Bbox => {
                    draw_bbox(img, &annotation.bbox, style.bbox_color, style.bbox_thickness)
                }
                DrawTarget::Seg => draw_segmentation(
                    img,
                    &annotation.segmentation,
                    style.seg_color,
                    style.seg_transparent,
                ),
                DrawTarget::Kpt => draw_keypoints(
                    img,
                    &annotation.keypoints,
                    style.kpt_radius,
                    style.kpt_color,
                    &style.ignore_kpt_idx,
                ),
                DrawTarget::Skeleton => draw_skeleton(
                    img,
                    &annotation.keypoints,
                    &category.skeleton,
                    style.kpt_idx_offset,
                    style.skeleton_thickness,
                    style.skeleton_color,
                    &style.ignore_kpt_idx,
                ),
            }
        }
        Ok(())
    }

    /// The image with every one of its annotations drawn.
    pub fn get_preview(&self, image_id: u64, style: &DrawStyle) -> Result<RgbaImage> {
        let image = self.images.require(image_id)?;
        let mut img = image::open(&image.coco_url)?.to_rgba8();
        for annotation in self.annotations.for_image(image.id) {
            self.draw_annotation(&mut img, annotation.id, style)?;
        }
        Ok(img)
    }

    fn image_range(&self, start: usize, end: Option<usize>) -> Result<&[Image]> {
        let images = self.images.as_slice();
        let end = end.unwrap_or(images.len()).min(images.len());
        if start > end {
            return Err(Error::InvalidRange {
                start,
                end,
                len: images.len(),
            });
        }
        Ok(&images[start..end])
    }

    fn render(&self, image: &Image, show_annotations: bool, style: &DrawStyle) -> Result<RgbaImage> {
        if show_annotations {
            self.get_preview(image.id, style)
        } else {
            Ok(image::open(&image.coco_url)?.to_rgba8())
        }
    }

    /// Render images into `options.save_dir`.
    pub fn save_visualization(&self, options: &VisualizationOptions) -> Result<()> {
        let images = self.image_range(options.start_idx, options.end_idx)?;
        prepare_output_dir(&options.save_dir, options.overwrite)?;

        let pb = create_progress_bar(images.len() as u64, "Visualize", options.show_pbar);
        for image in images {
            let img = self.render(image, options.show_annotations, &options.style)?;
            let save_path = if options.preserve_filenames {
                let save_path = options.save_dir.join(&image.file_name);
                if save_path.exists() {
                    return Err(Error::DuplicateFilename {
                        file_name: image.file_name.clone(),
                        dir: options.save_dir.clone(),
                    });
                }
                save_path
            } else {
                next_dump_path(&options.save_dir, &extension_of(Path::new(&image.file_name)))
            };
            save_rgb(img, &save_path)?;
            debug!("Saved {}", save_path.display());
            pb.inc(1);
        }
        pb.finish_and_clear();
        info!(
            "Saved {} visualizations to {}",
            images.len(),
            options.save_dir.display()
        );
        Ok(())
    }

    /// Render images as equally sized frames into `sink`. Every frame is
    /// padded to the largest image dimensions in the dataset.
    pub fn save_video<S: FrameSink>(&self, sink: &mut S, options: &VideoOptions) -> Result<()> {
        if options.save_path.is_file() {
            check_can_write(&options.save_path, options.overwrite)?;
        }
        let max_w = self.images.iter().map(|i| i.width).max().ok_or(Error::EmptyDataset)?;
        let max_h = self.images.iter().map(|i| i.height).max().ok_or(Error::EmptyDataset)?;
        let images = self.image_range(options.start_idx, options.end_idx)?;

        sink.open(&options.save_path, (max_w, max_h), options.fps)?;
        let pb = create_progress_bar(images.len() as u64, "Video", options.show_pbar);
        for image in images {
            let mut img = self.render(image, options.show_annotations, &options.style)?;
            if options.rescale_before_pad {
                img = scale_to_max(&img, (max_w, max_h));
            }
            let frame = pad_to_max(&img, (max_w, max_h))?;
            sink.write(&frame)?;
            pb.inc(1);
        }
        pb.finish_and_clear();
        sink.close()
    }
}
