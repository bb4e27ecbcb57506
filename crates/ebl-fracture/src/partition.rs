use crate::error::{PipelineError, Rejection, RejectionReason};
use crate::field_grid::{FieldKey, FieldLayout};
use crate::geometry::{ring_points, GeometryProvider};
use crate::pipeline::CancelToken;
use crate::types::{DoseGroup, FieldRect};
use geo::Polygon;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// An input shape with its resolved dose.
#[derive(Debug, Clone)]
pub struct DosedPolygon {
    pub dose: f64,
    pub polygon: Polygon<f64>,
}

impl DosedPolygon {
    pub fn new(dose: f64, polygon: Polygon<f64>) -> Self {
        Self { dose, polygon }
    }
}

/// One field with the trapezoids that fall into it, grouped by dose.
#[derive(Debug, Clone)]
pub struct AssignedField {
    pub key: FieldKey,
    pub rect: FieldRect,
    pub groups: Vec<DoseGroup>,
}

impl AssignedField {
    pub fn trapezoid_count(&self) -> usize {
        self.groups.iter().map(|g| g.polygons.len()).sum()
    }
}

/// Field → dose groups, ordered by field bottom then left edge.
#[derive(Debug, Clone, Default)]
pub struct FieldAssignment {
    fields: Vec<AssignedField>,
}

impl FieldAssignment {
    pub fn fields(&self) -> &[AssignedField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn trapezoid_count(&self) -> usize {
        self.fields.iter().map(AssignedField::trapezoid_count).sum()
    }
}

/// How shapes sharing a field are combined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionOptions {
    /// Union everything in a field into one group exposed with `default_dose`.
    pub merge: bool,
    pub default_dose: f64,
}

/// Result of partitioning: the assignment plus the shapes that fit no field.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub assignment: FieldAssignment,
    pub rejections: Vec<Rejection>,
}

/// Split shapes across fields and decompose the pieces into trapezoids.
///
/// Shapes are attributed to their candidate fields, clipped to each field
/// (merged or one by one) and every clipped polygon is decomposed. Fields
/// left without geometry are dropped. A decomposed piece with a hole aborts
/// the run.
pub fn partition<P: GeometryProvider + ?Sized>(
    provider: &P,
    shapes: &[DosedPolygon],
    layout: &FieldLayout,
    options: PartitionOptions,
    cancel: &CancelToken,
) -> Result<Partition, PipelineError> {
    let mut rejections = Vec::new();
    let mut buckets: BTreeMap<FieldKey, (FieldRect, Vec<&DosedPolygon>)> = BTreeMap::new();

    for shape in shapes {
        let fields = layout.fields_for(&shape.polygon);
        if fields.is_empty() {
            let rejection =
                Rejection::new(RejectionReason::OutsideFields, ring_points(&shape.polygon));
            warn!("{rejection}");
            rejections.push(rejection);
            continue;
        }
        for (key, rect) in fields {
            buckets
                .entry(key)
                .or_insert_with(|| (rect, Vec::new()))
                .1
                .push(shape);
        }
    }

    let mut fields = Vec::with_capacity(buckets.len());
    for (key, (rect, members)) in buckets {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let polygons: Vec<Polygon<f64>> = members.iter().map(|s| s.polygon.clone()).collect();
        let clipped = provider.intersect(&polygons, &rect, options.merge);

        let clipped_groups: Vec<(f64, Vec<Polygon<f64>>)> = if options.merge {
            clipped
                .into_iter()
                .map(|polys| (options.default_dose, polys))
                .collect()
        } else {
            members
                .iter()
                .map(|s| s.dose)
                .zip(clipped)
                .collect()
        };

        let mut groups = Vec::new();
        for (dose, polys) in clipped_groups {
            let mut trapezoids = Vec::new();
            for polygon in &polys {
                for piece in provider.decompose_trapezoids(polygon) {
                    if !piece.interiors().is_empty() {
                        return Err(PipelineError::HoleInPrimitive {
                            hull: ring_points(&piece),
                        });
                    }
                    trapezoids.push(piece);
                }
            }
            if !trapezoids.is_empty() {
                groups.push(DoseGroup {
                    dose,
                    polygons: trapezoids,
                });
            }
        }

        if groups.is_empty() {
            debug!(field = %rect, "field has no geometry after clipping");
            continue;
        }
        fields.push(AssignedField { key, rect, groups });
    }

    fields.sort_by(|a, b| {
        a.rect
            .bottom
            .total_cmp(&b.rect.bottom)
            .then(a.rect.left.total_cmp(&b.rect.left))
    });

    Ok(Partition {
        assignment: FieldAssignment { fields },
        rejections,
    })
}
