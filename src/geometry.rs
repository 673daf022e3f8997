//! Geometry primitives used by COCO and LabelMe records
//!
//! Polygons and boxes serialize in the flat COCO layout: a polygon is
//! `[x0, y0, x1, y1, ...]`, a box is `[x, y, width, height]` and a keypoint
//! list is `[x0, y0, v0, x1, y1, v1, ...]`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A 2D point in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn within_bbox(&self, bbox: &BBox) -> bool {
        bbox.contains_point(self)
    }

    pub fn within_polygon(&self, polygon: &Polygon) -> bool {
        polygon.contains_point(self)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<Point> for (f64, f64) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

/// Axis-aligned bounding box stored as COCO `[x, y, width, height]`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest box enclosing all points. LabelMe rectangles carry two
    /// opposite corners in any order, so this normalizes them as well.
    pub fn from_points(points: &[Point]) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::InvalidGeometry(
                "cannot build a bounding box from zero points".to_string(),
            ));
        }
        let (x_min, y_min, x_max, y_max) = points.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(x_min, y_min, x_max, y_max), p| {
                (x_min.min(p.x), y_min.min(p.y), x_max.max(p.x), y_max.max(p.y))
            },
        );
        Ok(Self::new(x_min, y_min, x_max - x_min, y_max - y_min))
    }

    pub fn xmax(&self) -> f64 {
        self.x + self.width
    }

    pub fn ymax(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Corners in clockwise order starting at the top-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.xmax(), self.y),
            Point::new(self.xmax(), self.ymax()),
            Point::new(self.x, self.ymax()),
        ]
    }

    /// Top-left and bottom-right corners, the LabelMe rectangle layout.
    pub fn to_corner_points(&self) -> Vec<Point> {
        vec![
            Point::new(self.x, self.y),
            Point::new(self.xmax(), self.ymax()),
        ]
    }

    /// Edges count as inside.
    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.x && p.x <= self.xmax() && p.y >= self.y && p.y <= self.ymax()
    }

    pub fn contains_polygon(&self, polygon: &Polygon) -> bool {
        !polygon.points.is_empty() && polygon.points.iter().all(|p| self.contains_point(p))
    }
}

impl Serialize for BBox {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        [self.x, self.y, self.width, self.height].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BBox {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let [x, y, width, height] = <[f64; 4]>::deserialize(deserializer)?;
        Ok(Self::new(x, y, width, height))
    }
}

/// A simple polygon given by its vertices, without a repeated closing vertex
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn from_flat(coords: &[f64]) -> Result<Self> {
        if coords.len() % 2 != 0 {
            return Err(Error::InvalidGeometry(format!(
                "polygon has an odd number of coordinates ({})",
                coords.len()
            )));
        }
        Ok(Self::new(
            coords
                .chunks_exact(2)
                .map(|c| Point::new(c[0], c[1]))
                .collect(),
        ))
    }

    pub fn to_flat(&self) -> Vec<f64> {
        self.points.iter().flat_map(|p| [p.x, p.y]).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn to_bbox(&self) -> Result<BBox> {
        BBox::from_points(&self.points)
    }

    /// Shoelace area.
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let twice_area: f64 = (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                a.x * b.y - b.x * a.y
            })
            .sum();
        twice_area.abs() / 2.0
    }

    fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    /// Even-odd ray casting. Points on the boundary count as inside.
    pub fn contains_point(&self, p: &Point) -> bool {
        if self.points.len() < 3 {
            return false;
        }
        if self.edges().any(|(a, b)| on_segment(p, &a, &b)) {
            return true;
        }
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
                if p.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// The box lies inside the polygon when all of its corners do and no
    /// polygon edge passes through the box interior.
    pub fn contains_bbox(&self, bbox: &BBox) -> bool {
        bbox.corners().iter().all(|c| self.contains_point(c))
            && !self.edges().any(|(a, b)| segment_enters_interior(&a, &b, bbox))
    }

    /// True when every vertex lies within the box.
    pub fn within_bbox(&self, bbox: &BBox) -> bool {
        bbox.contains_polygon(self)
    }
}

impl Serialize for Polygon {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_flat().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Polygon {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let coords = Vec::<f64>::deserialize(deserializer)?;
        Polygon::from_flat(&coords).map_err(D::Error::custom)
    }
}

fn cross(o: &Point, a: &Point, b: &Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn on_segment(p: &Point, a: &Point, b: &Point) -> bool {
    cross(a, b, p) == 0.0
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}

/// Whether segment `a`-`b` passes through the open interior of `bbox`.
/// Clips the segment to the closed box, then tests the clipped midpoint.
fn segment_enters_interior(a: &Point, b: &Point, bbox: &BBox) -> bool {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    let bounds = [
        (-dx, a.x - bbox.x),
        (dx, bbox.xmax() - a.x),
        (-dy, a.y - bbox.y),
        (dy, bbox.ymax() - a.y),
    ];
    for (p, q) in bounds {
        if p == 0.0 {
            if q < 0.0 {
                return false;
            }
        } else if p < 0.0 {
            t0 = t0.max(q / p);
        } else {
            t1 = t1.min(q / p);
        }
    }
    if t0 > t1 {
        return false;
    }
    let t = (t0 + t1) / 2.0;
    let (mx, my) = (a.x + t * dx, a.y + t * dy);
    mx > bbox.x && mx < bbox.xmax() && my > bbox.y && my < bbox.ymax()
}

/// A keypoint with COCO visibility: 0 = not labeled, 1 = labeled but not
/// visible, 2 = labeled and visible.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
    pub point: Point,
    pub visibility: u8,
}

impl Keypoint {
    pub fn new(x: f64, y: f64, visibility: u8) -> Self {
        Self {
            point: Point::new(x, y),
            visibility,
        }
    }

    pub fn visible(point: Point) -> Self {
        Self {
            point,
            visibility: 2,
        }
    }

    /// Placeholder for a keypoint slot with no label.
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn is_labeled(&self) -> bool {
        self.visibility > 0
    }
}

/// Serde adapter for `Vec<Keypoint>` in the flat `[x, y, v, ...]` layout.
pub mod keypoint_list {
    use serde::de::Error as _;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Keypoint;

    pub fn serialize<S: Serializer>(
        keypoints: &[Keypoint],
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(keypoints.len() * 3))?;
        for kpt in keypoints {
            seq.serialize_element(&kpt.point.x)?;
            seq.serialize_element(&kpt.point.y)?;
            seq.serialize_element(&kpt.visibility)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Vec<Keypoint>, D::Error> {
        let values = Vec::<f64>::deserialize(deserializer)?;
        if values.len() % 3 != 0 {
            return Err(D::Error::custom(format!(
                "keypoint list length {} is not a multiple of 3",
                values.len()
            )));
        }
        values
            .chunks_exact(3)
            .map(|c| {
                let visibility = match c[2] {
                    v if v == 0.0 => 0,
                    v if v == 1.0 => 1,
                    v if v == 2.0 => 2,
                    v => {
                        return Err(D::Error::custom(format!(
                            "invalid keypoint visibility {}",
                            v
                        )))
                    }
                };
                Ok(Keypoint::new(c[0], c[1], visibility))
            })
            .collect()
    }
}
