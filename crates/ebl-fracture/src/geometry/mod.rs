use crate::error::LayoutError;
use crate::types::FieldRect;
use geo::{BooleanOps, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

pub mod layout;
pub mod trapezoid;

pub use layout::{Cell, Instance, Layout, LayoutShape};
pub use trapezoid::decompose_trapezoids;

/// Display state of one layout layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerProperties {
    pub layer: u32,
    pub datatype: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub valid: bool,
}

impl LayerProperties {
    pub fn new(layer: u32, datatype: u32) -> Self {
        Self {
            layer,
            datatype,
            name: None,
            visible: true,
            valid: true,
        }
    }

    /// `"layer/datatype"`, the notation used to name the field layer.
    pub fn spec(&self) -> String {
        format!("{}/{}", self.layer, self.datatype)
    }

    /// Whether `key` names this layer: `"1/0"`, the layer name, or `"name (1/0)"`.
    pub fn matches(&self, key: &str) -> bool {
        let spec = self.spec();
        if key == spec {
            return true;
        }
        match &self.name {
            Some(name) => key == name || key == format!("{name} ({spec})"),
            None => false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A polygon in absolute µm coordinates with its resolved dose, if any.
#[derive(Debug, Clone)]
pub struct ProvidedShape {
    pub polygon: Polygon<f64>,
    /// Shape dose, else the deepest enclosing instance dose.
    pub dose: Option<f64>,
}

/// Host layout and polygon algebra the pipeline runs against.
///
/// The polygon operations have geo-backed default implementations; a host
/// with its own boolean engine can override them.
pub trait GeometryProvider {
    /// Name of the cell being converted, `None` when no layout is open.
    fn active_cell(&self) -> Option<String>;

    /// Size of one database unit in µm.
    fn database_unit(&self) -> f64;

    /// Name of the source design, written into job headers.
    fn source_name(&self) -> String;

    fn layers(&self) -> Vec<LayerProperties>;

    /// All shapes of the active cell on `layer`, flattened through the hierarchy.
    fn shapes_on(&self, layer: &LayerProperties) -> Result<Vec<ProvidedShape>, LayoutError>;

    /// Clip `polygons` to `field`. With `merge` the polygons are unioned first
    /// and the result is one polygon set; otherwise each is clipped on its own
    /// and results keep the input order.
    fn intersect(
        &self,
        polygons: &[Polygon<f64>],
        field: &FieldRect,
        merge: bool,
    ) -> Vec<Vec<Polygon<f64>>> {
        let clip = MultiPolygon::new(vec![field.to_polygon()]);
        if merge {
            let merged = union_all(polygons);
            vec![merged.intersection(&clip).0]
        } else {
            polygons
                .iter()
                .map(|polygon| {
                    MultiPolygon::new(vec![polygon.clone()])
                        .intersection(&clip)
                        .0
                })
                .collect()
        }
    }

    /// Split `polygon` into pieces with horizontal top and bottom edges.
    fn decompose_trapezoids(&self, polygon: &Polygon<f64>) -> Vec<Polygon<f64>> {
        decompose_trapezoids(polygon)
    }
}

/// Boolean union of a polygon set.
pub fn union_all(polygons: &[Polygon<f64>]) -> MultiPolygon<f64> {
    polygons
        .iter()
        .fold(MultiPolygon::new(Vec::new()), |acc, polygon| {
            acc.union(&MultiPolygon::new(vec![polygon.clone()]))
        })
}

/// Exterior ring as tuples, without the closing point.
pub fn ring_points(polygon: &Polygon<f64>) -> Vec<(f64, f64)> {
    let mut points: Vec<(f64, f64)> = polygon.exterior().0.iter().map(|c| (c.x, c.y)).collect();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

/// Build a hole-free polygon from ring points (closed or open).
pub fn polygon_from_points(points: &[(f64, f64)]) -> Polygon<f64> {
    Polygon::new(points.to_vec().into(), Vec::new())
}

/// Axis-aligned bounds of a point set as a field rectangle.
pub fn bounds_of(points: &[(f64, f64)]) -> Option<FieldRect> {
    let (first, rest) = points.split_first()?;
    let (mut left, mut bottom, mut right, mut top) = (first.0, first.1, first.0, first.1);
    for &(x, y) in rest {
        left = left.min(x);
        right = right.max(x);
        bottom = bottom.min(y);
        top = top.max(y);
    }
    Some(FieldRect::new(left, bottom, right, top))
}

/// A ring that collapses to a single point in both axes.
pub fn is_degenerate(points: &[(f64, f64)]) -> bool {
    let distinct = |values: Vec<f64>| {
        let mut values = values;
        values.sort_by(f64::total_cmp);
        values.dedup();
        values.len()
    };
    let xs = distinct(points.iter().map(|p| p.0).collect());
    let ys = distinct(points.iter().map(|p| p.1).collect());
    xs < 2 && ys < 2
}

/// The rectangle a ring describes, when it is a true axis-aligned rectangle.
pub fn as_rectangle(points: &[(f64, f64)]) -> Option<FieldRect> {
    let mut corners = remove_collinear(&dedup_ring(points));
    if corners.len() != 4 {
        return None;
    }
    let rect = bounds_of(&corners)?;
    if rect.width() <= 0.0 || rect.height() <= 0.0 {
        return None;
    }
    corners.push(corners[0]);
    let axis_aligned = corners
        .windows(2)
        .all(|w| w[0].0 == w[1].0 || w[0].1 == w[1].1);
    let on_corners = corners.iter().all(|&(x, y)| {
        (x == rect.left || x == rect.right) && (y == rect.bottom || y == rect.top)
    });
    (axis_aligned && on_corners).then_some(rect)
}

/// Drop consecutive duplicates and the closing point of a ring.
pub(crate) fn dedup_ring(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut clean: Vec<(f64, f64)> = Vec::with_capacity(points.len());
    for &p in points {
        if clean.last() != Some(&p) {
            clean.push(p);
        }
    }
    while clean.len() > 1 && clean.first() == clean.last() {
        clean.pop();
    }
    clean
}

/// Drop vertices lying on the straight line through their neighbours, and spikes.
pub(crate) fn remove_collinear(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut ring = points.to_vec();
    let mut changed = true;
    while changed && ring.len() > 3 {
        changed = false;
        let n = ring.len();
        for i in 0..n {
            let prev = ring[(i + n - 1) % n];
            let cur = ring[i];
            let next = ring[(i + 1) % n];
            let (ax, ay) = (cur.0 - prev.0, cur.1 - prev.1);
            let (bx, by) = (next.0 - prev.0, next.1 - prev.1);
            let cross = ax * by - ay * bx;
            if cross.abs() <= 1e-12 * ax.hypot(ay) * bx.hypot(by) {
                ring.remove(i);
                changed = true;
                break;
            }
        }
    }
    ring
}
