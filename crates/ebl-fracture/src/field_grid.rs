use crate::error::{Rejection, RejectionReason};
use crate::geometry::{as_rectangle, bounds_of, ring_points};
use crate::types::{FieldRect, FieldSpec};
use geo::{Intersects, Polygon};
use tracing::warn;

/// Stable identity of a field within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldKey {
    /// Grid tile, counted in field sizes from the grid anchor.
    Tile { ix: i64, iy: i64 },
    /// Position in the explicit field boundary set.
    Explicit(usize),
}

/// Regular grid of square fields; tile (0, 0) is centred on the anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldGrid {
    spec: FieldSpec,
}

impl FieldGrid {
    pub fn new(spec: FieldSpec) -> Self {
        Self { spec }
    }

    /// Index of the tile containing `coord` along one axis.
    pub fn tile_index(&self, coord: f64, anchor: f64) -> i64 {
        ((coord - anchor + self.spec.size / 2.0) / self.spec.size).floor() as i64
    }

    pub fn tile_rect(&self, ix: i64, iy: i64) -> FieldRect {
        let (cx, cy) = self.spec.center;
        FieldRect::centered(
            (
                cx + ix as f64 * self.spec.size,
                cy + iy as f64 * self.spec.size,
            ),
            self.spec.size,
        )
    }

    /// Every tile the bounding box overlaps, row by row from the bottom.
    /// Tiles that only touch the box are included; they clip to nothing later.
    pub fn fields_for(&self, bbox: &FieldRect) -> Vec<(FieldKey, FieldRect)> {
        let (cx, cy) = self.spec.center;
        let (x_min, x_max) = (self.tile_index(bbox.left, cx), self.tile_index(bbox.right, cx));
        let (y_min, y_max) = (self.tile_index(bbox.bottom, cy), self.tile_index(bbox.top, cy));

        let mut fields = Vec::new();
        for iy in y_min..=y_max {
            for ix in x_min..=x_max {
                fields.push((FieldKey::Tile { ix, iy }, self.tile_rect(ix, iy)));
            }
        }
        fields
    }
}

/// Explicit field rectangles read from the field layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldBoundarySet {
    fields: Vec<FieldRect>,
}

impl FieldBoundarySet {
    pub fn new(fields: Vec<FieldRect>) -> Self {
        Self { fields }
    }

    /// Build the set from field-layer polygons. Shapes that are not true
    /// axis-aligned rectangles are rejected and left out.
    pub fn from_polygons(polygons: &[Polygon<f64>]) -> (Self, Vec<Rejection>) {
        let mut fields = Vec::new();
        let mut rejections = Vec::new();
        for polygon in polygons {
            let points = ring_points(polygon);
            match as_rectangle(&points) {
                Some(rect) => fields.push(rect),
                None => {
                    let rejection = Rejection::new(RejectionReason::NotARectangle, points);
                    warn!("{rejection}");
                    rejections.push(rejection);
                }
            }
        }
        (Self { fields }, rejections)
    }

    pub fn fields(&self) -> &[FieldRect] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields the polygon geometrically intersects.
    pub fn fields_for(&self, polygon: &Polygon<f64>) -> Vec<(FieldKey, FieldRect)> {
        let Some(bbox) = bounds_of(&ring_points(polygon)) else {
            return Vec::new();
        };
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, rect)| rect.touches(&bbox) && polygon.intersects(&rect.to_polygon()))
            .map(|(index, rect)| (FieldKey::Explicit(index), *rect))
            .collect()
    }
}

/// Where fields come from for a run.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldLayout {
    Grid(FieldGrid),
    Explicit(FieldBoundarySet),
}

impl FieldLayout {
    /// Candidate fields for a shape.
    pub fn fields_for(&self, polygon: &Polygon<f64>) -> Vec<(FieldKey, FieldRect)> {
        match self {
            FieldLayout::Grid(grid) => bounds_of(&ring_points(polygon))
                .map(|bbox| grid.fields_for(&bbox))
                .unwrap_or_default(),
            FieldLayout::Explicit(set) => set.fields_for(polygon),
        }
    }
}
