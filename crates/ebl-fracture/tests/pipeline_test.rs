use ebl_fracture::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Square of `size` µm with its lower-left corner at (`x`, `y`) µm, in dbu.
fn square_dbu(x: f64, y: f64, size: f64) -> Vec<(i64, i64)> {
    let to_dbu = |v: f64| (v * 1000.0).round() as i64;
    vec![
        (to_dbu(x), to_dbu(y)),
        (to_dbu(x + size), to_dbu(y)),
        (to_dbu(x + size), to_dbu(y + size)),
        (to_dbu(x), to_dbu(y + size)),
    ]
}

fn layout_with(shapes: &[(Vec<(i64, i64)>, Option<f64>)]) -> Layout {
    let mut layout = Layout::new("chip", 0.001);
    let layer = layout.add_layer(1, 0);
    let mut top = Cell::new("TOP");
    for (points, dose) in shapes {
        top.add_polygon(&layer, points.clone(), *dose);
    }
    layout.add_cell(top);
    layout.set_top_cell("TOP");
    layout
}

fn job_dir(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).expect("Failed to create job directory");
    dir
}

fn small_field_config() -> JobConfig {
    JobConfig {
        field: FieldSpec::new(100.0, 100_000, (0.0, 0.0)),
        pitch: 4,
        ..JobConfig::default()
    }
}

#[test]
fn test_single_square_scenario() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let dir = job_dir(root.path(), "job");
    let layout = layout_with(&[(square_dbu(-5.0, -5.0, 10.0), Some(5.0))]);

    let report = run(&layout, &small_field_config(), &dir, &CancelToken::new())
        .expect("Failed to run pipeline");

    assert_eq!(report.input_polygons, 1);
    assert_eq!(report.field_count, 1);
    assert_eq!(report.trapezoid_count, 1);
    assert_eq!(report.primitive_count, 1);
    assert!(report.rejections.is_empty());

    let con = fs::read_to_string(dir.join("job.con")).expect("Failed to read .con");
    assert_eq!(
        con,
        "/*--- job.con ---*/\nCZ0.1,100000;\nPCfield_1;\n0.0,0.0;\nPPfield_1;\n0.0,0.0;\n!END\n"
    );

    let ccc = fs::read_to_string(dir.join("field_1.ccc")).expect("Failed to read .ccc");
    let pattern_lines: Vec<&str> = ccc.lines().filter(|l| l.ends_with(");3")).collect();
    assert_eq!(pattern_lines, vec!["DWSL(45000,45000,55000,55000,4,5.0);3"]);

    let cbc = fs::read(dir.join("field_1.cbc")).expect("Failed to read .cbc");
    // 30-byte header, one 38-byte record, 38-byte trailer
    assert_eq!(cbc.len(), 30 + PrimitiveRecord::SIZE + 38);
    let record = &cbc[30..30 + PrimitiveRecord::SIZE];
    assert_eq!(&record[..6], &[0x01, 0x08, 0x13, 0x00, b'x', 0x00]);
    assert_eq!(&record[34..38], &500i32.to_le_bytes(), "dose is written in hundredths");
}

#[test]
fn test_fractional_grid_center_is_written_exactly() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let dir = job_dir(root.path(), "offset");
    let layout = layout_with(&[(square_dbu(-5.0, -5.0, 10.0), None)]);
    let config = JobConfig {
        field: FieldSpec::new(60.0, 10_000, (0.1, 0.1)),
        ..JobConfig::default()
    };

    let report = run(&layout, &config, &dir, &CancelToken::new()).expect("Failed to run pipeline");
    assert_eq!(report.field_count, 1);

    let con = fs::read_to_string(dir.join("offset.con")).expect("Failed to read .con");
    assert!(con.contains("PCfield_1;\n0.0001,0.0001;\n"), "unexpected .con:\n{con}");
    assert!(con.contains("PPfield_1;\n0.0001,0.0001;\n"), "unexpected .con:\n{con}");
}

#[test]
fn test_shape_across_field_boundary_is_split() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let dir = job_dir(root.path(), "split");
    let layout = layout_with(&[(square_dbu(40.0, 10.0, 20.0), None)]);

    let report = run(&layout, &small_field_config(), &dir, &CancelToken::new())
        .expect("Failed to run pipeline");
    assert_eq!(report.field_count, 2);
    assert_eq!(report.primitive_count, 2);

    let con = fs::read_to_string(dir.join("split.con")).expect("Failed to read .con");
    assert!(con.contains("PCfield_1;\n0.0,0.0;\n"));
    assert!(con.contains("PCfield_2;\n0.1,0.0;\n"));

    // each half is a 10x20 µm rectangle at the shared edge
    let left = fs::read_to_string(dir.join("field_1.ccc")).expect("Failed to read field_1");
    assert!(left.contains("DWSL(90000,20000,100000,40000,4,1.0);3"));
    let right = fs::read_to_string(dir.join("field_2.ccc")).expect("Failed to read field_2");
    assert!(right.contains("DWSL(0,20000,10000,40000,4,1.0);3"));
}

#[test]
fn test_output_is_deterministic() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let first = job_dir(&root.path().join("a"), "job");
    let second = job_dir(&root.path().join("b"), "job");
    let layout = layout_with(&[
        (square_dbu(-60.0, -20.0, 80.0), Some(2.0)),
        (
            vec![(10_000, 10_000), (90_000, 30_000), (40_000, 120_000)],
            Some(3.5),
        ),
    ]);

    let config = small_field_config();
    let report_a = run(&layout, &config, &first, &CancelToken::new()).expect("first run");
    let report_b = run(&layout, &config, &second, &CancelToken::new()).expect("second run");
    assert_eq!(report_a.files.len(), report_b.files.len());
    assert!(report_a.primitive_count > 2);

    for (a, b) in report_a.files.iter().zip(&report_b.files) {
        assert_eq!(a.file_name(), b.file_name());
        let bytes_a = fs::read(a).expect("read first output");
        let bytes_b = fs::read(b).expect("read second output");
        assert_eq!(bytes_a, bytes_b, "{} differs between runs", a.display());
    }
}

#[test]
fn test_merge_and_per_shape_dose_attribution() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let shapes = [
        (square_dbu(0.0, 0.0, 10.0), Some(3.0)),
        (square_dbu(5.0, 5.0, 10.0), Some(4.0)),
    ];
    let layout = layout_with(&shapes);

    let separate_dir = job_dir(root.path(), "separate");
    run(&layout, &small_field_config(), &separate_dir, &CancelToken::new())
        .expect("Failed to run per-shape");
    let separate = fs::read_to_string(separate_dir.join("field_1.ccc")).expect("read ccc");
    let separate_lines: Vec<&str> = separate.lines().filter(|l| l.ends_with(");3")).collect();
    assert_eq!(separate_lines.len(), 2, "one rectangle per shape");
    assert!(separate_lines[0].ends_with(",3.0);3"));
    assert!(separate_lines[1].ends_with(",4.0);3"));

    let merged_dir = job_dir(root.path(), "merged");
    let config = JobConfig {
        merge: true,
        dose: 1.5,
        ..small_field_config()
    };
    run(&layout, &config, &merged_dir, &CancelToken::new()).expect("Failed to run merged");
    let merged = fs::read_to_string(merged_dir.join("field_1.ccc")).expect("read ccc");
    let merged_lines: Vec<&str> = merged.lines().filter(|l| l.ends_with(");3")).collect();
    assert_eq!(merged_lines.len(), 3, "union decomposes into three bands");
    assert!(merged_lines.iter().all(|l| l.ends_with(",1.5);3")));
}

#[test]
fn test_instance_dose_is_used() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let dir = job_dir(root.path(), "inst");

    let mut layout = Layout::new("chip", 0.001);
    let layer = layout.add_layer(1, 0);
    let mut leaf = Cell::new("LEAF");
    leaf.add_polygon(&layer, square_dbu(0.0, 0.0, 10.0), None);
    layout.add_cell(leaf);
    let mut top = Cell::new("TOP");
    top.add_instance("LEAF", kurbo::Affine::translate((20_000.0, 0.0)), Some(7.0));
    layout.add_cell(top);
    layout.set_top_cell("TOP");

    run(&layout, &small_field_config(), &dir, &CancelToken::new()).expect("Failed to run");
    let ccc = fs::read_to_string(dir.join("field_1.ccc")).expect("read ccc");
    assert!(ccc.contains("DWSL(70000,40000,80000,50000,4,7.0);3"));
}

#[test]
fn test_explicit_field_layer() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let dir = job_dir(root.path(), "own");

    let mut layout = layout_with(&[
        (square_dbu(10.0, 10.0, 10.0), None),
        // inside the triangle only
        (square_dbu(160.0, 10.0, 10.0), None),
    ]);
    let fields = layout.add_layer(63, 0);
    if let Some(top) = layout.cell_mut("TOP") {
        top.add_polygon(&fields, square_dbu(0.0, 0.0, 100.0), None);
        top.add_polygon(&fields, vec![(150_000, 0), (250_000, 0), (150_000, 100_000)], None);
    }

    let config = JobConfig {
        field_layer: Some("63/0".to_string()),
        field: FieldSpec::new(100.0, 10_000, (0.0, 0.0)),
        ..JobConfig::default()
    };
    let report = run(&layout, &config, &dir, &CancelToken::new()).expect("Failed to run");

    assert_eq!(report.input_polygons, 2);
    assert_eq!(report.field_count, 1);
    assert_eq!(report.primitive_count, 1);
    let reasons: Vec<RejectionReason> = report.rejections.iter().map(|r| r.reason).collect();
    assert_eq!(
        reasons,
        vec![RejectionReason::NotARectangle, RejectionReason::OutsideFields]
    );

    let con = fs::read_to_string(dir.join("own.con")).expect("read con");
    assert!(con.contains("PCfield_1;\n0.05,0.05;\n"));
    let ccc = fs::read_to_string(dir.join("field_1.ccc")).expect("read ccc");
    assert!(ccc.contains("DWSL(1000,8000,2000,9000,1,1.0);3"));
}

#[test]
fn test_registration_marks_are_written() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let dir = job_dir(root.path(), "marks");
    let layout = layout_with(&[(square_dbu(0.0, 0.0, 10.0), None)]);
    let config = JobConfig {
        marks: Some(RegistrationMarks(vec![(500.0, 2500.0), (1500.0, -500.0)])),
        ..small_field_config()
    };
    run(&layout, &config, &dir, &CancelToken::new()).expect("Failed to run");
    let con = fs::read_to_string(dir.join("marks.con")).expect("read con");
    assert_eq!(con.lines().nth(2), Some("R2 1.5,-0.5; 0.5,2.5;"));
}

#[test]
fn test_xenos_job() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let dir = job_dir(root.path(), "wafer");
    let layout = layout_with(&[
        (square_dbu(-5.0, -5.0, 10.0), Some(2.0)),
        (vec![(20_000, 0), (40_000, 0), (30_000, 10_000)], None),
    ]);
    let config = JobConfig {
        format: ExposureFormat::Xenos,
        field: FieldSpec::new(100.0, XENOS_DOTS, (0.0, 0.0)),
        pitch: 2,
        beam_current: 0.25,
        ..JobConfig::default()
    };

    let report = run(&layout, &config, &dir, &CancelToken::new()).expect("Failed to run");
    assert_eq!(report.primitive_count, 2);
    assert_eq!(report.files, vec![dir.join("wafer.ctl"), dir.join("wafer.pat")]);

    let ctl = fs::read_to_string(dir.join("wafer.ctl")).expect("read ctl");
    assert_eq!(
        ctl,
        "; wafer.ctl\nORIGIN 0.0,0.0\nCURRENT 0.25\nFIELD 100.0,50000\nSOURCE chip\n\
         STAGE 0.0,0.0\nDRAW wafer.pat,field_1\nEND\n"
    );

    let pat = fs::read_to_string(dir.join("wafer.pat")).expect("read pat");
    assert_eq!(
        pat,
        "; wafer.pat\nFIELD field_1 0.0,0.0\n\
         DOSE 2.0\nPITCH 2\nRECT 22500,22500,27500,27500\n\
         DOSE 1.0\nPITCH 2\nXPOLY 3,40000,20000,35000,25000,45000,25000\nEND\n"
    );
}

#[test]
fn test_stale_files_are_replaced() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let dir = job_dir(root.path(), "job");
    for name in ["field_7.ccc", "field_7.cbc", "old.CON", "notes.txt", "keep.pat"] {
        fs::write(dir.join(name), b"stale").expect("Failed to seed file");
    }

    let layout = layout_with(&[(square_dbu(0.0, 0.0, 10.0), None)]);
    run(&layout, &small_field_config(), &dir, &CancelToken::new()).expect("Failed to run");

    let mut names: Vec<String> = fs::read_dir(&dir)
        .expect("read dir")
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["field_1.cbc", "field_1.ccc", "job.con", "keep.pat", "notes.txt"]
    );
}

#[test]
fn test_layout_file_round_trip_through_pipeline() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let dir = job_dir(root.path(), "json");
    let path = root.path().join("design.json");
    fs::write(
        &path,
        r#"{
            "dbu": 0.001,
            "top_cell": "TOP",
            "layers": [{ "layer": 1, "datatype": 0 }],
            "cells": [{
                "name": "TOP",
                "shapes": [{ "layer": 1, "datatype": 0,
                             "points": [[0, 0], [10000, 0], [10000, 10000], [0, 10000]],
                             "dose": 2.5 }]
            }]
        }"#,
    )
    .expect("Failed to write layout");

    let layout = Layout::load_from_path(&path).expect("Failed to load layout");
    assert_eq!(layout.source_name(), "design");
    let report = run(&layout, &small_field_config(), &dir, &CancelToken::new())
        .expect("Failed to run");
    assert_eq!(report.primitive_count, 1);
    assert_eq!(report.summary(), "There were 1 polygons. Now there are 1 primitives in 1 fields.");
}
