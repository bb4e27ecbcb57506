use geo::Polygon;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exposure field geometry shared by every field of a job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Edge length of a field in µm.
    pub size: f64,
    /// Number of exposure dots along one field edge.
    pub dots: u32,
    /// Anchor of the field grid in µm; field (0, 0) is centred here.
    pub center: (f64, f64),
}

impl FieldSpec {
    pub fn new(size: f64, dots: u32, center: (f64, f64)) -> Self {
        Self { size, dots, center }
    }

    /// Dots per µm.
    pub fn scale(&self) -> f64 {
        self.dots as f64 / self.size
    }
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self {
            size: 600.0,
            dots: 60_000,
            center: (0.0, 0.0),
        }
    }
}

/// Axis-aligned field rectangle in µm.
///
/// Centre and half extents are stored as given; grid fields keep their exact anchor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldRect {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
    center: (f64, f64),
    half: (f64, f64),
}

impl FieldRect {
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        let (left, right) = (left.min(right), left.max(right));
        let (bottom, top) = (bottom.min(top), bottom.max(top));
        Self {
            left,
            bottom,
            right,
            top,
            center: ((left + right) / 2.0, (bottom + top) / 2.0),
            half: ((right - left) / 2.0, (top - bottom) / 2.0),
        }
    }

    /// Square field of edge `size` centred on `center`.
    pub fn centered(center: (f64, f64), size: f64) -> Self {
        let half = size / 2.0;
        Self {
            left: center.0 - half,
            bottom: center.1 - half,
            right: center.0 + half,
            top: center.1 + half,
            center,
            half: (half, half),
        }
    }

    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    /// Half the width and half the height.
    pub fn half_size(&self) -> (f64, f64) {
        self.half
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// True when the closed rectangles share any point.
    pub fn touches(&self, other: &FieldRect) -> bool {
        self.left <= other.right
            && other.left <= self.right
            && self.bottom <= other.top
            && other.bottom <= self.top
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        geo::Rect::new(
            geo::coord! { x: self.left, y: self.bottom },
            geo::coord! { x: self.right, y: self.top },
        )
        .to_polygon()
    }
}

impl fmt::Display for FieldRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.3}, {:.3}] - [{:.3}, {:.3}]",
            self.left, self.bottom, self.right, self.top
        )
    }
}

/// Polygons sharing one exposure dose inside a field.
#[derive(Debug, Clone)]
pub struct DoseGroup {
    /// Dose in µs.
    pub dose: f64,
    pub polygons: Vec<Polygon<f64>>,
}

/// Registration marks in µm, in the order they were configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationMarks(pub Vec<(f64, f64)>);

impl RegistrationMarks {
    /// Marks converted to mm, the unit of the job files.
    pub fn in_mm(&self) -> Vec<(f64, f64)> {
        self.0.iter().map(|(x, y)| (x / 1000.0, y / 1000.0)).collect()
    }

    /// The CABL pair, lower mark first (then leftmost on equal heights).
    pub fn cabl_pair_mm(&self) -> Option<[(f64, f64); 2]> {
        let marks = self.in_mm();
        if marks.len() != 2 {
            return None;
        }
        let (a, b) = (marks[0], marks[1]);
        if a.1 > b.1 || (a.0 > b.0 && a.1 == b.1) {
            Some([b, a])
        } else {
            Some([a, b])
        }
    }
}

/// Which exposure job format to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureFormat {
    #[default]
    Cabl,
    Xenos,
}

impl ExposureFormat {
    /// File extensions owned by this format; matching files are removed before writing.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ExposureFormat::Cabl => &["con", "ccc", "cbc"],
            ExposureFormat::Xenos => &["ctl", "pat"],
        }
    }

    /// Number of registration marks the format expects.
    pub fn mark_count(&self) -> usize {
        match self {
            ExposureFormat::Cabl => 2,
            ExposureFormat::Xenos => 4,
        }
    }
}

impl std::str::FromStr for ExposureFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cabl" => Ok(ExposureFormat::Cabl),
            "xenos" => Ok(ExposureFormat::Xenos),
            other => Err(format!("unknown exposure format '{other}'")),
        }
    }
}
