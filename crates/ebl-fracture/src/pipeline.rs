use crate::classify::Classifier;
use crate::config::JobConfig;
use crate::encoder::{encoder_for, job_name, EncodeJob, FieldPrimitives};
use crate::error::{EncodeError, PipelineError, Rejection, RejectionReason};
use crate::field_grid::{FieldBoundarySet, FieldGrid, FieldLayout};
use crate::geometry::{is_degenerate, ring_points, GeometryProvider};
use crate::partition::{partition, DosedPolygon, FieldAssignment, PartitionOptions};
use geo::Polygon;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Shared flag a host sets to stop a run between fields.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Shapes read from the design layers (field layer excluded).
    pub input_polygons: usize,
    pub field_count: usize,
    /// Pieces produced by decomposition.
    pub trapezoid_count: usize,
    /// Pieces that survived classification and were written.
    pub primitive_count: usize,
    /// Every skipped shape or primitive, in the order they were met.
    pub rejections: Vec<Rejection>,
    pub files: Vec<PathBuf>,
}

impl RunReport {
    pub fn summary(&self) -> String {
        format!(
            "There were {} polygons. Now there are {} primitives in {} fields.",
            self.input_polygons, self.primitive_count, self.field_count
        )
    }
}

/// Shapes read from the provider, split by role.
#[derive(Debug, Default)]
struct CollectedShapes {
    inputs: Vec<DosedPolygon>,
    field_shapes: Vec<Polygon<f64>>,
    rejections: Vec<Rejection>,
}

fn collect_shapes<P: GeometryProvider + ?Sized>(
    provider: &P,
    config: &JobConfig,
) -> Result<CollectedShapes, PipelineError> {
    let field_layer = config.field_layer();
    let mut collected = CollectedShapes::default();

    for layer in provider.layers() {
        if !layer.valid || (config.visible_only && !layer.visible) {
            continue;
        }
        let is_field_layer = field_layer.is_some_and(|key| layer.matches(key));
        let shapes = provider.shapes_on(&layer)?;
        info!(
            layer = %layer.spec(),
            shapes = shapes.len(),
            field_layer = is_field_layer,
            "collecting layer"
        );

        for shape in shapes {
            let points = ring_points(&shape.polygon);
            if is_degenerate(&points) {
                let rejection = Rejection::new(RejectionReason::NotAPolygon, points);
                warn!("{rejection}");
                collected.rejections.push(rejection);
                continue;
            }
            if is_field_layer {
                collected.field_shapes.push(shape.polygon);
            } else {
                collected.inputs.push(DosedPolygon::new(
                    shape.dose.unwrap_or(config.dose),
                    shape.polygon,
                ));
            }
        }
    }
    Ok(collected)
}

fn classify_fields(
    assignment: &FieldAssignment,
    config: &JobConfig,
    cancel: &CancelToken,
    rejections: &mut Vec<Rejection>,
) -> Result<Vec<FieldPrimitives>, PipelineError> {
    let classifier = Classifier::new(config.field.scale(), config.pitch);
    let mut fields = Vec::with_capacity(assignment.len());

    for assigned in assignment.fields() {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let mut primitives = Vec::new();
        for group in &assigned.groups {
            for polygon in &group.polygons {
                match classifier.classify(&ring_points(polygon), &assigned.rect, group.dose) {
                    Ok(primitive) => primitives.push(primitive),
                    Err(rejection) => {
                        warn!(field = %assigned.rect, "{rejection}");
                        rejections.push(rejection);
                    }
                }
            }
        }
        fields.push(FieldPrimitives {
            rect: assigned.rect,
            primitives,
        });
    }
    Ok(fields)
}

/// Convert the provider's active cell into exposure job files in `out_dir`.
///
/// Stages: collect shapes, build the field layout, partition and decompose,
/// classify, encode. Per-shape problems are logged and reported; a missing
/// layout, a hole in a decomposed piece, I/O failures and cancellation abort
/// the run.
pub fn run<P: GeometryProvider + ?Sized>(
    provider: &P,
    config: &JobConfig,
    out_dir: &Path,
    cancel: &CancelToken,
) -> Result<RunReport, PipelineError> {
    config.validate()?;
    let Some(cell) = provider.active_cell() else {
        return Err(PipelineError::NoActiveLayout);
    };
    info!(
        cell = %cell,
        dbu = provider.database_unit(),
        format = ?config.format,
        merge = config.merge,
        "starting conversion"
    );

    let started = Instant::now();
    let collected = collect_shapes(provider, config)?;
    let mut rejections = collected.rejections;

    let layout = if config.field_layer().is_some() {
        let (set, field_rejections) = FieldBoundarySet::from_polygons(&collected.field_shapes);
        rejections.extend(field_rejections);
        if set.is_empty() {
            warn!("field layer holds no usable field rectangles");
        }
        FieldLayout::Explicit(set)
    } else {
        FieldLayout::Grid(FieldGrid::new(config.field))
    };

    let partitioned = partition(
        provider,
        &collected.inputs,
        &layout,
        PartitionOptions {
            merge: config.merge,
            default_dose: config.dose,
        },
        cancel,
    )?;
    rejections.extend(partitioned.rejections);
    let assignment = partitioned.assignment;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        fields = assignment.len(),
        trapezoids = assignment.trapezoid_count(),
        "partitioned shapes"
    );

    let started = Instant::now();
    let fields = classify_fields(&assignment, config, cancel, &mut rejections)?;
    let primitive_count = fields.iter().map(|f| f.primitives.len()).sum();

    let name = job_name(out_dir);
    let source_name = provider.source_name();
    let job = EncodeJob {
        name: &name,
        out_dir,
        field: config.field,
        marks: config.marks.as_ref(),
        source_name: &source_name,
        beam_current: config.beam_current,
        fields: &fields,
        cancel,
    };
    let files = encoder_for(config.format)
        .encode(&job)
        .map_err(|err| match err {
            EncodeError::Cancelled => PipelineError::Cancelled,
            other => other.into(),
        })?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        files = files.len(),
        "end of writing files"
    );

    let report = RunReport {
        input_polygons: collected.inputs.len(),
        field_count: assignment.len(),
        trapezoid_count: assignment.trapezoid_count(),
        primitive_count,
        rejections,
        files,
    };
    info!("{}", report.summary());
    Ok(report)
}
