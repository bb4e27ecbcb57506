use ebl_fracture::*;
use geo::{Area, BooleanOps, MultiPolygon, Polygon};

fn polygon(points: &[(f64, f64)]) -> Polygon<f64> {
    polygon_from_points(points)
}

fn partition_all(shapes: Vec<DosedPolygon>, field: FieldSpec, merge: bool) -> Partition {
    let provider = Layout::new("test", 0.001);
    partition(
        &provider,
        &shapes,
        &FieldLayout::Grid(FieldGrid::new(field)),
        PartitionOptions {
            merge,
            default_dose: 1.0,
        },
        &CancelToken::new(),
    )
    .expect("Failed to partition")
}

#[test]
fn test_area_invariant_per_field() {
    let star = polygon(&[
        (0.0, -90.0),
        (25.0, -30.0),
        (95.0, -25.0),
        (40.0, 15.0),
        (60.0, 85.0),
        (0.0, 45.0),
        (-60.0, 85.0),
        (-40.0, 15.0),
        (-95.0, -25.0),
        (-25.0, -30.0),
    ]);
    let field = FieldSpec::new(60.0, 6000, (10.0, -5.0));
    let result = partition_all(vec![DosedPolygon::new(2.0, star.clone())], field, false);

    assert!(result.assignment.len() > 4, "star should span several fields");
    let mut total = 0.0;
    for assigned in result.assignment.fields() {
        let expected = MultiPolygon::new(vec![star.clone()])
            .intersection(&MultiPolygon::new(vec![assigned.rect.to_polygon()]))
            .unsigned_area();
        let actual: f64 = assigned
            .groups
            .iter()
            .flat_map(|g| g.polygons.iter())
            .map(|p| p.unsigned_area())
            .sum();
        assert!(
            (expected - actual).abs() < 1e-6,
            "area mismatch in field {}: {expected} vs {actual}",
            assigned.rect
        );
        total += actual;
    }
    assert!((total - star.unsigned_area()).abs() < 1e-6);
}

#[test]
fn test_pieces_are_horizontal_trapezoids() {
    let blob = polygon(&[
        (0.0, 0.0),
        (30.0, 5.0),
        (45.0, 25.0),
        (20.0, 40.0),
        (25.0, 20.0),
        (5.0, 30.0),
    ]);
    let result = partition_all(
        vec![DosedPolygon::new(1.0, blob)],
        FieldSpec::new(1000.0, 1000, (0.0, 0.0)),
        false,
    );
    assert_eq!(result.assignment.len(), 1);

    let classifier = Classifier::new(10.0, 1);
    let assigned = &result.assignment.fields()[0];
    for piece in &assigned.groups[0].polygons {
        let points = ring_points(piece);
        assert!(points.len() == 3 || points.len() == 4, "unexpected piece {points:?}");
        assert!(piece.interiors().is_empty());
        let primitive = classifier
            .classify(&points, &assigned.rect, 1.0)
            .expect("piece should classify");
        assert!(primitive.record.height > 1);
    }
}

#[test]
fn test_merge_mode_groups() {
    let shapes = vec![
        DosedPolygon::new(3.0, polygon(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)])),
        DosedPolygon::new(4.0, polygon(&[(5.0, 5.0), (15.0, 5.0), (15.0, 15.0), (5.0, 15.0)])),
    ];
    let field = FieldSpec::new(100.0, 1000, (0.0, 0.0));

    let merged = partition_all(shapes.clone(), field, true);
    let groups = &merged.assignment.fields()[0].groups;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].dose, 1.0);

    let separate = partition_all(shapes, field, false);
    let doses: Vec<f64> = separate.assignment.fields()[0]
        .groups
        .iter()
        .map(|g| g.dose)
        .collect();
    assert_eq!(doses, vec![3.0, 4.0]);
}

#[test]
fn test_classification_ignores_starting_corner() {
    let field = FieldRect::new(0.0, 0.0, 50.0, 50.0);
    let trapezoid = [(10.0, 10.0), (40.0, 10.0), (30.0, 30.0), (15.0, 30.0)];
    let classifier = Classifier::new(100.0, 3);
    let reference = classifier
        .classify(&trapezoid, &field, 1.25)
        .expect("classify reference");
    assert_eq!(reference.kind, PrimitiveKind::Trapezoid);

    for shift in 0..trapezoid.len() {
        let mut rotated = trapezoid.to_vec();
        rotated.rotate_left(shift);
        let primitive = classifier.classify(&rotated, &field, 1.25).expect("classify");
        assert_eq!(primitive.record, reference.record);
        assert_eq!(primitive.coordinate_text(), reference.coordinate_text());
    }
}
